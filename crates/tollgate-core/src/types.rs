// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entitlement data model shared by every Tollgate crate.
//!
//! Identifiers are normalized when they are constructed so that every
//! comparison further down the pipeline is strict equality.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::TollgateError;

/// Milliseconds in one day, used for remaining-day arithmetic.
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Opaque account identifier. Root namespace for all cached records of one account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Creates an identity, rejecting empty or whitespace-only ids.
    pub fn new(id: impl Into<String>) -> Result<Self, TollgateError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(TollgateError::Unauthenticated);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = TollgateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::new(value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

/// Content bundle identifier.
///
/// Equality, ordering and hashing use the canonical form (trimmed,
/// ASCII-lowercase). The trimmed original spelling is kept for requests, so
/// a backend with case-sensitive ids still receives the id it issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ContentId {
    canonical: String,
    original: String,
}

impl ContentId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let original = raw.as_ref().trim().to_string();
        Self {
            canonical: original.to_ascii_lowercase(),
            original,
        }
    }

    /// Canonical form, used for every comparison and storage key.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// The id as it was given, used in request paths.
    pub fn as_sent(&self) -> &str {
        &self.original
    }
}

impl PartialEq for ContentId {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for ContentId {}

impl Hash for ContentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for ContentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ContentId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl From<String> for ContentId {
    fn from(value: String) -> Self {
        ContentId::new(value)
    }
}

impl From<&str> for ContentId {
    fn from(value: &str) -> Self {
        ContentId::new(value)
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.original
    }
}

/// Typed cache key: one entitlement record per `(identity, content)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntitlementKey {
    pub identity: Identity,
    pub content_id: ContentId,
}

impl EntitlementKey {
    pub fn new(identity: Identity, content_id: ContentId) -> Self {
        Self {
            identity,
            content_id,
        }
    }
}

/// How access to a content bundle was acquired.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccessType {
    Trial,
    Purchased,
    Redeemed,
    Expired,
}

/// Days left until `expiry`, rounded up to the next whole day.
///
/// A value of zero or less means the entitlement has lapsed.
pub fn remaining_days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (expiry - now).num_milliseconds();
    (millis + MILLIS_PER_DAY - 1).div_euclid(MILLIS_PER_DAY)
}

/// Absolute expiry for a relative day count observed at `now`.
///
/// Lets a "N days left" answer keep counting down after it is cached.
/// `None` when the count overflows the calendar.
pub fn expiry_after_days(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    chrono::Duration::try_days(days).and_then(|span| now.checked_add_signed(span))
}

/// A cached entitlement determination for one identity and content bundle.
///
/// `remaining_days <= 0` always implies `access_type == Expired` and
/// `has_access == false`; every constructor and [`EntitlementRecord::as_of`]
/// re-applies that rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementRecord {
    pub content_id: ContentId,
    pub has_access: bool,
    pub remaining_days: Option<i64>,
    pub access_type: AccessType,
    pub cached_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl EntitlementRecord {
    pub fn new(
        content_id: ContentId,
        has_access: bool,
        remaining_days: Option<i64>,
        access_type: AccessType,
        cached_at: DateTime<Utc>,
    ) -> Self {
        Self {
            content_id,
            has_access,
            remaining_days,
            access_type,
            cached_at,
            expires_at: None,
        }
        .enforce_expiry()
    }

    /// Attaches an absolute expiry; remaining days are derived from it on every read.
    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        if let Some(expiry) = expires_at {
            self.remaining_days = Some(remaining_days_until(expiry, self.cached_at));
        }
        self.enforce_expiry()
    }

    /// The record as it stands at `now`: remaining days recomputed from the
    /// absolute expiry (if known) and the expiry invariant re-applied.
    pub fn as_of(&self, now: DateTime<Utc>) -> Self {
        let mut record = self.clone();
        if let Some(expiry) = record.expires_at {
            record.remaining_days = Some(remaining_days_until(expiry, now));
        }
        record.enforce_expiry()
    }

    /// Age of the record relative to `now`. Records from the future count as brand new.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.cached_at).max(chrono::Duration::zero())
    }

    /// True when the record is younger than `threshold`.
    pub fn is_fresh(&self, now: DateTime<Utc>, threshold: std::time::Duration) -> bool {
        match chrono::Duration::from_std(threshold) {
            Ok(threshold) => self.age(now) < threshold,
            Err(_) => true,
        }
    }

    /// A fresh, positive record can be trusted without asking the backend.
    pub fn is_trusted(&self, now: DateTime<Utc>, threshold: std::time::Duration) -> bool {
        self.is_fresh(now, threshold) && self.as_of(now).has_access
    }

    fn enforce_expiry(mut self) -> Self {
        if self.remaining_days.is_some_and(|days| days <= 0) {
            self.has_access = false;
            self.access_type = AccessType::Expired;
        }
        self
    }
}

/// Server-side purchase status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PurchaseStatus {
    Active,
    Completed,
    Pending,
    Cancelled,
    Refunded,
    Expired,
    #[serde(other)]
    Unknown,
}

impl PurchaseStatus {
    /// Statuses that grant access while the purchase has not expired.
    pub fn is_valid(self) -> bool {
        matches!(self, PurchaseStatus::Active | PurchaseStatus::Completed)
    }
}

/// Authoritative purchase record as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub id: String,
    pub user_id: String,
    #[serde(alias = "questionSetId")]
    pub content_id: ContentId,
    pub purchase_date: DateTime<Utc>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    pub status: PurchaseStatus,
    #[serde(default)]
    pub payment_method: Option<String>,
}

impl PurchaseRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == PurchaseStatus::Expired || self.expiry_date.is_some_and(|e| e <= now)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status.is_valid() && !self.is_expired_at(now)
    }
}

/// Authoritative redemption record for a code that unlocked a content bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRecord {
    pub code: String,
    #[serde(alias = "questionSetId")]
    pub content_id: ContentId,
    pub redeemed_at: DateTime<Utc>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
}

impl RedemptionRecord {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_none_or(|e| e > now)
    }
}

/// A content bundle as listed by the backend, optionally pre-annotated with access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBundle {
    #[serde(alias = "_id")]
    pub id: ContentId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub has_access: Option<bool>,
    #[serde(default)]
    pub remaining_days: Option<i64>,
}

/// Result of an authoritative backend access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAccess {
    pub has_access: bool,
    #[serde(default)]
    pub remaining_days: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn identity_rejects_blank() {
        assert!(matches!(Identity::new("  "), Err(TollgateError::Unauthenticated)));
        assert_eq!(Identity::new(" u1 ").unwrap().as_str(), "u1");
    }

    #[test]
    fn content_id_is_canonical() {
        assert_eq!(ContentId::new("  QS-Alpha "), ContentId::new("qs-alpha"));
        let parsed: ContentId = serde_json::from_str("\"ABC\"").unwrap();
        assert_eq!(parsed.as_str(), "abc");
    }

    #[test]
    fn content_id_keeps_original_spelling_for_requests() {
        let id = ContentId::new(" QS-Alpha ");
        assert_eq!(id.as_sent(), "QS-Alpha");
        assert_eq!(id.to_string(), "qs-alpha");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"QS-Alpha\"");

        let mut set = std::collections::HashSet::new();
        set.insert(id);
        assert!(set.contains(&ContentId::new("qs-alpha")));
    }

    #[test]
    fn remaining_days_rounds_up() {
        let now = t0();
        assert_eq!(remaining_days_until(now + Duration::days(30), now), 30);
        assert_eq!(remaining_days_until(now + Duration::hours(1), now), 1);
        assert_eq!(remaining_days_until(now + Duration::days(2) + Duration::seconds(1), now), 3);
        assert_eq!(remaining_days_until(now, now), 0);
        assert_eq!(remaining_days_until(now - Duration::hours(1), now), 0);
        assert_eq!(remaining_days_until(now - Duration::days(1), now), -1);
    }

    #[test]
    fn day_counts_become_absolute_expiries() {
        let now = t0();
        let expiry = expiry_after_days(now, 12).unwrap();
        assert_eq!(remaining_days_until(expiry, now), 12);
        assert_eq!(remaining_days_until(expiry, now + Duration::days(3)), 9);
        assert_eq!(expiry_after_days(now, i64::MAX), None);

        let record = EntitlementRecord::new(ContentId::new("q1"), true, Some(1), AccessType::Purchased, now)
            .with_expiry(expiry_after_days(now, 1));
        let later = record.as_of(now + Duration::days(2));
        assert!(!later.has_access);
        assert_eq!(later.access_type, AccessType::Expired);
    }

    #[test]
    fn non_positive_remaining_days_forces_expired() {
        let record = EntitlementRecord::new(
            ContentId::new("q1"),
            true,
            Some(0),
            AccessType::Purchased,
            t0(),
        );
        assert!(!record.has_access);
        assert_eq!(record.access_type, AccessType::Expired);
    }

    #[test]
    fn as_of_recomputes_from_expiry() {
        let record = EntitlementRecord::new(
            ContentId::new("q1"),
            true,
            None,
            AccessType::Purchased,
            t0(),
        )
        .with_expiry(Some(t0() + Duration::days(3)));
        assert_eq!(record.remaining_days, Some(3));

        let later = record.as_of(t0() + Duration::days(1));
        assert_eq!(later.remaining_days, Some(2));
        assert!(later.has_access);

        let lapsed = record.as_of(t0() + Duration::days(4));
        assert!(!lapsed.has_access);
        assert_eq!(lapsed.access_type, AccessType::Expired);
    }

    #[test]
    fn freshness_threshold() {
        let record = EntitlementRecord::new(
            ContentId::new("q1"),
            true,
            None,
            AccessType::Purchased,
            t0(),
        );
        let threshold = std::time::Duration::from_secs(30 * 60);
        assert!(record.is_trusted(t0() + Duration::minutes(29), threshold));
        assert!(!record.is_trusted(t0() + Duration::minutes(30), threshold));
    }

    #[test]
    fn purchase_status_unknown_values_are_tolerated() {
        let json = r#"{
            "id": "p1", "userId": "u1", "questionSetId": "Q1",
            "purchaseDate": "2026-01-01T00:00:00Z",
            "expiryDate": "2026-02-01T00:00:00Z",
            "status": "on_hold"
        }"#;
        let purchase: PurchaseRecord = serde_json::from_str(json).unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Unknown);
        assert_eq!(purchase.content_id.as_str(), "q1");
        assert!(!purchase.is_valid_at(t0()));
    }

    #[test]
    fn purchase_validity_respects_expiry() {
        let purchase = PurchaseRecord {
            id: "p1".into(),
            user_id: "u1".into(),
            content_id: ContentId::new("q1"),
            purchase_date: t0(),
            expiry_date: Some(t0() + Duration::days(10)),
            status: PurchaseStatus::Completed,
            payment_method: Some("card".into()),
        };
        assert!(purchase.is_valid_at(t0() + Duration::days(9)));
        assert!(!purchase.is_valid_at(t0() + Duration::days(10)));
        assert!(purchase.is_expired_at(t0() + Duration::days(11)));
    }

    #[test]
    fn access_type_display_and_parse() {
        use std::str::FromStr;
        for variant in [
            AccessType::Trial,
            AccessType::Purchased,
            AccessType::Redeemed,
            AccessType::Expired,
        ] {
            let parsed = AccessType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(parsed, variant);
        }
    }

    proptest::proptest! {
        #[test]
        fn invariant_holds_for_any_remaining_days(days in -400i64..400, has_access: bool) {
            let record = EntitlementRecord::new(
                ContentId::new("q"),
                has_access,
                Some(days),
                AccessType::Redeemed,
                t0(),
            );
            if days <= 0 {
                proptest::prop_assert!(!record.has_access);
                proptest::prop_assert_eq!(record.access_type, AccessType::Expired);
            } else {
                proptest::prop_assert_eq!(record.has_access, has_access);
            }
        }
    }
}
