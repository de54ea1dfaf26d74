// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request descriptions, per-call options and typed cache keys.

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// A request to be executed by the [`RequestExecutor`](crate::RequestExecutor).
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            params: Vec::new(),
            body: Some(body),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Cache and de-duplication key: method, URL, params and body.
    pub fn key(&self) -> RequestKey {
        RequestKey {
            method: self.method.as_str().to_string(),
            url: self.url.clone(),
            params: self
                .params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&"),
            body: self
                .body
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_default(),
        }
    }
}

/// Identity of a request for caching and de-duplication purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: String,
    url: String,
    params: String,
    body: String,
}

impl RequestKey {
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Per-call knobs. Unset fields fall back to the executor's settings.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// How long a successful response may be served from cache.
    pub cache_duration: Option<Duration>,
    /// Neither read nor write the response cache.
    pub skip_cache: bool,
    /// Retries after the first attempt.
    pub retries: Option<u32>,
    /// Base delay for exponential backoff.
    pub retry_delay: Option<Duration>,
    /// Ignore cached and in-flight results, but store the fresh response.
    pub force_refresh: bool,
    /// Aborts the request; a cancelled request never writes the cache.
    pub cancel: Option<CancellationToken>,
    /// Only bodies this accepts are cached. `None` caches every 2xx body.
    pub cache_if: Option<fn(&Value) -> bool>,
}

impl RequestOptions {
    pub fn cache_for(mut self, duration: Duration) -> Self {
        self.cache_duration = Some(duration);
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn cache_if(mut self, accept: fn(&Value) -> bool) -> Self {
        self.cache_if = Some(accept);
        self
    }

    /// Whether a successful body may be written to the response cache.
    pub fn should_cache(&self, body: &Value) -> bool {
        !self.skip_cache && self.cache_if.is_none_or(|accept| accept(body))
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Network,
    Cache,
    /// An expired cache entry served because the URL is rate limited.
    StaleCache,
}

/// A response together with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub origin: Origin,
}

impl<T> Fetched<T> {
    pub fn is_stale(&self) -> bool {
        self.origin == Origin::StaleCache
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            origin: self.origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_covers_method_params_and_body() {
        let a = RequestSpec::get("http://x/a").param("userId", "u1");
        let b = RequestSpec::get("http://x/a").param("userId", "u2");
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key(), RequestSpec::get("http://x/a").param("userId", "u1").key());

        let post1 = RequestSpec::post("http://x/a", serde_json::json!({"code": "A"}));
        let post2 = RequestSpec::post("http://x/a", serde_json::json!({"code": "B"}));
        assert_ne!(post1.key(), post2.key());
        assert_ne!(RequestSpec::get("http://x/a").key(), post1.key());
    }

    #[test]
    fn cache_predicate_filters_bodies() {
        fn ok_only(body: &Value) -> bool {
            body.get("ok") == Some(&Value::Bool(true))
        }
        let ok = serde_json::json!({"ok": true});
        let failed = serde_json::json!({"ok": false});

        assert!(RequestOptions::default().should_cache(&failed));
        let filtered = RequestOptions::default().cache_if(ok_only);
        assert!(filtered.should_cache(&ok));
        assert!(!filtered.should_cache(&failed));
        assert!(!filtered.skip_cache().should_cache(&ok));
    }
}
