// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared HTTP pipeline: response caching, in-flight de-duplication,
//! per-URL rate limiting and retry with exponential backoff.
//!
//! Every request goes through the same stages:
//!
//! 1. Fresh cache hit (unless `skip_cache` / `force_refresh`)
//! 2. Join an identical in-flight request younger than the dedup timeout
//! 3. Rate limit: serve stale cache when limited, else wait for a slot
//! 4. Send with retries on network failure, 5xx and 429
//! 5. Store the successful body in the cache unless cancelled or rejected
//!    by the caller's `cache_if` predicate

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use tollgate_config::model::{ApiConfig, RequestConfig};

use crate::cache::ResponseCache;
use crate::error::RequestError;
use crate::rate_limit::SlidingWindowLimiter;
use crate::request::{Fetched, Origin, RequestKey, RequestOptions, RequestSpec};
use crate::retry::{backoff_delay, parse_retry_after};

/// Length of the rate-limit window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

type SharedResponse = Shared<BoxFuture<'static, Result<Fetched<Value>, RequestError>>>;

/// Tunables for the [`RequestExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_requests_per_minute: usize,
    pub dedup_timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub max_backoff: Duration,
    pub default_cache_ttl: Duration,
    pub request_timeout: Duration,
}

impl ExecutorSettings {
    pub fn from_config(api: &ApiConfig, request: &RequestConfig) -> Self {
        Self {
            max_requests_per_minute: request.max_requests_per_minute,
            dedup_timeout: Duration::from_millis(request.dedup_timeout_ms),
            retries: request.retries,
            retry_delay: Duration::from_millis(request.retry_delay_ms),
            max_backoff: Duration::from_millis(request.max_backoff_ms),
            default_cache_ttl: Duration::from_millis(request.default_cache_ttl_ms),
            request_timeout: api.request_timeout(),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default(), &RequestConfig::default())
    }
}

struct InFlight {
    started: Instant,
    future: SharedResponse,
}

struct Inner {
    client: reqwest::Client,
    settings: ExecutorSettings,
    cache: ResponseCache,
    limiter: SlidingWindowLimiter,
    in_flight: DashMap<RequestKey, InFlight>,
}

/// Process-wide HTTP pipeline. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct RequestExecutor {
    inner: Arc<Inner>,
}

impl RequestExecutor {
    pub fn new(settings: ExecutorSettings) -> Result<Self, RequestError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| RequestError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: reqwest::Client, settings: ExecutorSettings) -> Self {
        let limiter = SlidingWindowLimiter::new(RATE_WINDOW, settings.max_requests_per_minute);
        Self {
            inner: Arc::new(Inner {
                client,
                settings,
                cache: ResponseCache::new(),
                limiter,
                in_flight: DashMap::new(),
            }),
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.inner.settings
    }

    /// Executes `spec` and decodes the JSON body into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        spec: RequestSpec,
        options: RequestOptions,
    ) -> Result<Fetched<T>, RequestError> {
        let fetched = self.request_value(spec, options).await?;
        let origin = fetched.origin;
        let data = serde_json::from_value(fetched.data)
            .map_err(|e| RequestError::Decode(e.to_string()))?;
        Ok(Fetched { data, origin })
    }

    /// Executes `spec` and returns the raw JSON body.
    pub async fn request_value(
        &self,
        spec: RequestSpec,
        options: RequestOptions,
    ) -> Result<Fetched<Value>, RequestError> {
        let cancel = options.cancel.clone().unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(RequestError::Cancelled);
        }

        let key = spec.key();
        if !options.skip_cache && !options.force_refresh {
            if let Some(data) = self.inner.cache.get_fresh(&key) {
                debug!(url = %spec.url, "response cache hit");
                metrics::counter!("tollgate_http_cache_hits_total").increment(1);
                return Ok(Fetched {
                    data,
                    origin: Origin::Cache,
                });
            }
        }

        let shared = self.shared_request(spec, key.clone(), options);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RequestError::Cancelled),
            result = shared.clone() => result,
        };

        self.inner
            .in_flight
            .remove_if(&key, |_, entry| entry.future.ptr_eq(&shared));
        result
    }

    /// Returns an existing in-flight future for `key` or registers a new one.
    fn shared_request(
        &self,
        spec: RequestSpec,
        key: RequestKey,
        options: RequestOptions,
    ) -> SharedResponse {
        let dedup_timeout = self.inner.settings.dedup_timeout;
        match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(entry)
                if !options.force_refresh && entry.get().started.elapsed() < dedup_timeout =>
            {
                debug!(url = %spec.url, "joining in-flight request");
                metrics::counter!("tollgate_http_dedup_joins_total").increment(1);
                entry.get().future.clone()
            }
            Entry::Occupied(mut entry) => {
                let future = self.clone().run(spec, key, options).boxed().shared();
                entry.insert(InFlight {
                    started: Instant::now(),
                    future: future.clone(),
                });
                future
            }
            Entry::Vacant(entry) => {
                let future = self.clone().run(spec, key, options).boxed().shared();
                entry.insert(InFlight {
                    started: Instant::now(),
                    future: future.clone(),
                });
                future
            }
        }
    }

    async fn run(
        self,
        spec: RequestSpec,
        key: RequestKey,
        options: RequestOptions,
    ) -> Result<Fetched<Value>, RequestError> {
        let settings = &self.inner.settings;
        let cancel = options.cancel.clone().unwrap_or_default();

        loop {
            match self.inner.limiter.try_acquire(&spec.url) {
                Ok(()) => break,
                Err(wait) => {
                    metrics::counter!("tollgate_http_rate_limited_total").increment(1);
                    if !options.skip_cache {
                        if let Some(data) = self.inner.cache.get_any(&key) {
                            warn!(url = %spec.url, "rate limited, serving stale response");
                            return Ok(Fetched {
                                data,
                                origin: Origin::StaleCache,
                            });
                        }
                    }
                    debug!(url = %spec.url, wait_ms = wait.as_millis() as u64, "rate limited, delaying");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        let retries = options.retries.unwrap_or(settings.retries);
        let base_delay = options.retry_delay.unwrap_or(settings.retry_delay);
        let mut attempt = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                outcome = self.send_once(&spec) => outcome,
            };

            match outcome {
                Ok(data) => {
                    if cancel.is_cancelled() {
                        return Err(RequestError::Cancelled);
                    }
                    if options.should_cache(&data) {
                        let ttl = options.cache_duration.unwrap_or(settings.default_cache_ttl);
                        self.inner.cache.insert(key, data.clone(), ttl);
                    }
                    return Ok(Fetched {
                        data,
                        origin: Origin::Network,
                    });
                }
                Err(err) if err.is_retryable() && attempt < retries => {
                    let delay =
                        backoff_delay(base_delay, attempt, settings.max_backoff, err.retry_after());
                    warn!(
                        url = %spec.url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying request"
                    );
                    metrics::counter!("tollgate_http_retries_total").increment(1);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(&self, spec: &RequestSpec) -> Result<Value, RequestError> {
        let url = reqwest::Url::parse_with_params(&spec.url, &spec.params)
            .map_err(|e| RequestError::InvalidUrl(format!("{}: {e}", spec.url)))?;

        let mut builder = self.inner.client.request(spec.method.clone(), url);
        if let Some(body) = &spec.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        debug!(url = %spec.url, status = %status, "response received");

        if status.is_success() {
            let bytes = response.bytes().await?;
            return serde_json::from_slice(&bytes).map_err(|e| RequestError::Decode(e.to_string()));
        }

        let retry_after = if status.as_u16() == 429 {
            response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
        } else {
            None
        };
        let message = response.text().await.unwrap_or_default();
        Err(RequestError::Status {
            status: status.as_u16(),
            message,
            retry_after,
        })
    }

    /// Drops every pending de-duplication entry. Running requests finish for
    /// their current awaiters, but no new caller can join them.
    pub fn clear_pending(&self) {
        self.inner.in_flight.clear();
    }

    /// Drops every cached response.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    pub fn cached_count(&self) -> usize {
        self.inner.cache.len()
    }
}
