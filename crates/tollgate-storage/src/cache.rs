// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of [`EntitlementCache`].
//!
//! Records are stored as JSON in the `entitlements` table, keyed by
//! `(identity_id, content_id)`. Every statement binds the identity column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use tracing::{debug, warn};

use tollgate_core::{
    ContentId, EntitlementCache, EntitlementKey, EntitlementRecord, Identity, RedemptionRecord,
    TollgateError,
};

use crate::database::{Database, map_tr_err};

pub struct SqliteEntitlementCache {
    db: Database,
}

impl SqliteEntitlementCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// Raw redemption row; timestamps are parsed outside the connection thread.
struct RedemptionRow {
    code: String,
    content_id: String,
    redeemed_at: String,
    expiry_date: Option<String>,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl RedemptionRow {
    fn into_record(self) -> Option<RedemptionRecord> {
        let redeemed_at = parse_timestamp(&self.redeemed_at)?;
        let expiry_date = match self.expiry_date {
            Some(raw) => Some(parse_timestamp(&raw)?),
            None => None,
        };
        Some(RedemptionRecord {
            code: self.code,
            content_id: ContentId::new(self.content_id),
            redeemed_at,
            expiry_date,
        })
    }
}

#[async_trait]
impl EntitlementCache for SqliteEntitlementCache {
    async fn get(&self, key: &EntitlementKey) -> Result<Option<EntitlementRecord>, TollgateError> {
        let identity = key.identity.as_str().to_string();
        let content_id = key.content_id.as_str().to_string();
        let raw: Option<String> = self
            .db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT record FROM entitlements WHERE identity_id = ?1 AND content_id = ?2",
                    params![identity, content_id],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str::<EntitlementRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(
                    identity = %key.identity,
                    content_id = %key.content_id,
                    error = %e,
                    "corrupt cached entitlement, treating as miss"
                );
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &EntitlementKey, record: &EntitlementRecord) -> Result<(), TollgateError> {
        let identity = key.identity.as_str().to_string();
        let content_id = key.content_id.as_str().to_string();
        let json = serde_json::to_string(record).map_err(TollgateError::storage)?;
        let cached_at = record.cached_at.to_rfc3339();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO entitlements (identity_id, content_id, record, cached_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![identity, content_id, json, cached_at],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn invalidate(&self, key: &EntitlementKey) -> Result<(), TollgateError> {
        let identity = key.identity.as_str().to_string();
        let content_id = key.content_id.as_str().to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM entitlements WHERE identity_id = ?1 AND content_id = ?2",
                    params![identity, content_id],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn clear_namespace(&self, identity: &Identity) -> Result<(), TollgateError> {
        let id = identity.as_str().to_string();
        let removed = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed = tx.execute("DELETE FROM entitlements WHERE identity_id = ?1", params![id])?;
                tx.execute("DELETE FROM redemptions WHERE identity_id = ?1", params![id])?;
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(map_tr_err)?;
        debug!(identity = %identity, removed, "cleared entitlement namespace");
        Ok(())
    }

    async fn content_ids(&self, identity: &Identity) -> Result<Vec<ContentId>, TollgateError> {
        let id = identity.as_str().to_string();
        let ids: Vec<String> = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT content_id FROM entitlements WHERE identity_id = ?1 ORDER BY content_id",
                )?;
                let rows = stmt.query_map(params![id], |row| row.get(0))?;
                rows.collect::<Result<Vec<String>, _>>()
            })
            .await
            .map_err(map_tr_err)?;
        Ok(ids.into_iter().map(ContentId::new).collect())
    }

    async fn redemptions(&self, identity: &Identity) -> Result<Vec<RedemptionRecord>, TollgateError> {
        let id = identity.as_str().to_string();
        let rows: Vec<RedemptionRow> = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT code, content_id, redeemed_at, expiry_date FROM redemptions \
                     WHERE identity_id = ?1 ORDER BY redeemed_at",
                )?;
                let rows = stmt.query_map(params![id], |row| {
                    Ok(RedemptionRow {
                        code: row.get(0)?,
                        content_id: row.get(1)?,
                        redeemed_at: row.get(2)?,
                        expiry_date: row.get(3)?,
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(map_tr_err)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let code = row.code.clone();
            match row.into_record() {
                Some(record) => records.push(record),
                None => warn!(identity = %identity, code, "corrupt redemption row skipped"),
            }
        }
        Ok(records)
    }

    async fn add_redemption(
        &self,
        identity: &Identity,
        record: &RedemptionRecord,
    ) -> Result<(), TollgateError> {
        let id = identity.as_str().to_string();
        let code = record.code.clone();
        let content_id = record.content_id.as_str().to_string();
        let redeemed_at = record.redeemed_at.to_rfc3339();
        let expiry_date = record.expiry_date.map(|e| e.to_rfc3339());
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO redemptions \
                     (identity_id, code, content_id, redeemed_at, expiry_date) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, code, content_id, redeemed_at, expiry_date],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}
