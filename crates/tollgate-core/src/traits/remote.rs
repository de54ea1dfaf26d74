// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authoritative backend entitlement source.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TollgateError;
use crate::types::{ContentBundle, ContentId, Identity, RedemptionRecord, RemoteAccess};

/// The backend system of record for purchases and redemptions.
///
/// Results are ground truth: a caller that explicitly asks the remote source
/// lets its answer override any cached or pushed signal.
#[async_trait]
pub trait RemoteEntitlementSource: Send + Sync {
    /// Checks whether `identity` may access `content_id`.
    ///
    /// `force_refresh` bypasses any short-lived response cache.
    async fn check_access(
        &self,
        identity: &Identity,
        content_id: &ContentId,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<RemoteAccess, TollgateError>;

    /// Lists content bundles, optionally annotated with access for `identity`.
    async fn list_content(
        &self,
        identity: &Identity,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentBundle>, TollgateError>;

    /// Redeems an access code for `identity`.
    async fn redeem_code(
        &self,
        identity: &Identity,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<RedemptionRecord, TollgateError>;

    /// Drops any pending de-duplicated requests. Called on identity switch.
    fn clear_pending(&self) {}
}
