// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local entitlement cache trait.

use async_trait::async_trait;

use crate::error::TollgateError;
use crate::types::{ContentId, EntitlementKey, EntitlementRecord, Identity, RedemptionRecord};

/// Per-identity persistent store of entitlement records and redeemed codes.
///
/// Every operation is addressed by identity: there is no way to read a record
/// without naming the namespace it lives in. Unreadable entries are reported
/// as misses, never as errors.
#[async_trait]
pub trait EntitlementCache: Send + Sync {
    /// Returns the cached record for `key`, or `None` on a miss.
    async fn get(&self, key: &EntitlementKey) -> Result<Option<EntitlementRecord>, TollgateError>;

    /// Inserts or overwrites the record for `key`.
    async fn set(&self, key: &EntitlementKey, record: &EntitlementRecord)
        -> Result<(), TollgateError>;

    /// Removes a single record.
    async fn invalidate(&self, key: &EntitlementKey) -> Result<(), TollgateError>;

    /// Removes every record and redemption belonging to `identity`.
    async fn clear_namespace(&self, identity: &Identity) -> Result<(), TollgateError>;

    /// Content ids that currently have a record under `identity`.
    async fn content_ids(&self, identity: &Identity) -> Result<Vec<ContentId>, TollgateError>;

    /// Redemptions persisted for `identity`.
    async fn redemptions(&self, identity: &Identity)
        -> Result<Vec<RedemptionRecord>, TollgateError>;

    /// Persists a redemption for `identity`, replacing any earlier one for the same code.
    async fn add_redemption(
        &self,
        identity: &Identity,
        redemption: &RedemptionRecord,
    ) -> Result<(), TollgateError>;
}
