// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP implementation of [`RemoteEntitlementSource`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tollgate_core::{
    ContentBundle, ContentId, Identity, RedemptionRecord, RemoteAccess, RemoteEntitlementSource,
    TollgateError,
};

use crate::executor::RequestExecutor;
use crate::request::{RequestOptions, RequestSpec};

/// Backend response envelope: `{success, data, message?}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> Envelope<T> {
    fn into_data(self, what: &str) -> Result<T, TollgateError> {
        if !self.success {
            return Err(TollgateError::Remote {
                message: self
                    .message
                    .unwrap_or_else(|| format!("{what} was rejected by the server")),
            });
        }
        self.data.ok_or_else(|| TollgateError::Remote {
            message: format!("{what} response has no data"),
        })
    }
}

/// A rejected envelope is a 2xx answer but must not be served from cache.
fn envelope_succeeded(body: &serde_json::Value) -> bool {
    body.get("success").and_then(serde_json::Value::as_bool) == Some(true)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedeemedCode {
    #[serde(default)]
    code: Option<String>,
    #[serde(alias = "contentId")]
    question_set_id: ContentId,
    #[serde(default)]
    redeemed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    expiry_date: Option<DateTime<Utc>>,
}

/// Remote entitlement checks through the shared [`RequestExecutor`].
#[derive(Clone)]
pub struct HttpEntitlementSource {
    executor: RequestExecutor,
    base_url: String,
    check_ttl: Duration,
}

impl HttpEntitlementSource {
    /// `check_ttl` bounds how long a check result is served from the response
    /// cache, limiting load from repeated UI checks.
    pub fn new(executor: RequestExecutor, base_url: impl Into<String>, check_ttl: Duration) -> Self {
        Self {
            executor,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            check_ttl,
        }
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        spec: RequestSpec,
        options: RequestOptions,
        what: &str,
    ) -> Result<T, TollgateError> {
        let fetched = self
            .executor
            .request::<Envelope<T>>(spec, options.cache_if(envelope_succeeded))
            .await
            .map_err(TollgateError::from)?;
        if fetched.is_stale() {
            debug!(what, "using stale response for rate-limited request");
        }
        fetched.data.into_data(what)
    }
}

#[async_trait]
impl RemoteEntitlementSource for HttpEntitlementSource {
    async fn check_access(
        &self,
        identity: &Identity,
        content_id: &ContentId,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<RemoteAccess, TollgateError> {
        let path = format!("/purchases/check/{}", content_id.as_sent());
        let spec = RequestSpec::get(self.url(&path)).param("userId", identity.as_str());
        let options = RequestOptions::default()
            .cache_for(self.check_ttl)
            .force_refresh(force_refresh)
            .cancel_with(cancel.clone());
        metrics::counter!("tollgate_remote_checks_total").increment(1);
        self.fetch(spec, options, "access check").await
    }

    async fn list_content(
        &self,
        identity: &Identity,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentBundle>, TollgateError> {
        let spec = RequestSpec::get(self.url("/question-sets"))
            .param("userId", identity.as_str())
            .param("_t", Utc::now().timestamp_millis().to_string());
        let options = RequestOptions::default()
            .skip_cache()
            .cancel_with(cancel.clone());
        self.fetch(spec, options, "content list").await
    }

    async fn redeem_code(
        &self,
        identity: &Identity,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<RedemptionRecord, TollgateError> {
        let body = serde_json::json!({ "code": code, "userId": identity.as_str() });
        let spec = RequestSpec::post(self.url("/redeem-codes/redeem"), body);
        // A redemption is not idempotent: never replay it.
        let options = RequestOptions::default()
            .skip_cache()
            .retries(0)
            .cancel_with(cancel.clone());
        let redeemed: RedeemedCode = self.fetch(spec, options, "code redemption").await?;
        Ok(RedemptionRecord {
            code: redeemed.code.unwrap_or_else(|| code.to_string()),
            content_id: redeemed.question_set_id,
            redeemed_at: redeemed.redeemed_at.unwrap_or_else(Utc::now),
            expiry_date: redeemed.expiry_date,
        })
    }

    fn clear_pending(&self) {
        self.executor.clear_pending();
    }
}
