// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access classification, per-content resolution state and change notifications.

use chrono::{DateTime, Utc};

use tollgate_core::{AccessType, ContentId, EntitlementRecord};

/// What is known about an entitlement when classifying it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessEvidence {
    pub remaining_days: Option<i64>,
    pub redeemed: bool,
    pub purchased: bool,
}

/// Lapsed beats everything, then redemption, then purchase; otherwise trial.
pub fn determine_access_type(evidence: AccessEvidence) -> AccessType {
    if evidence.remaining_days.is_some_and(|days| days <= 0) {
        AccessType::Expired
    } else if evidence.redeemed {
        AccessType::Redeemed
    } else if evidence.purchased {
        AccessType::Purchased
    } else {
        AccessType::Trial
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Never resolved, or the last resolution has gone stale.
    Unknown,
    /// A remote check is in flight.
    Checking,
    Resolved,
    /// The remote source could not answer; the result is the last known value or `false`.
    Degraded,
}

/// Where an [`AccessChange`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    Resolution,
    Push,
    Purchase,
    Redemption,
}

/// Observer notification for a new entitlement determination.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessChange {
    pub content_id: ContentId,
    pub has_access: bool,
    pub remaining_days: Option<i64>,
    pub access_type: AccessType,
    pub source: ChangeSource,
}

impl AccessChange {
    pub(crate) fn from_record(record: &EntitlementRecord, source: ChangeSource) -> Self {
        Self {
            content_id: record.content_id.clone(),
            has_access: record.has_access,
            remaining_days: record.remaining_days,
            access_type: record.access_type,
            source,
        }
    }
}

/// State plus the moment it was entered.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StateEntry {
    pub state: ResolutionState,
    pub since: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_wins_over_everything() {
        let evidence = AccessEvidence {
            remaining_days: Some(0),
            redeemed: true,
            purchased: true,
        };
        assert_eq!(determine_access_type(evidence), AccessType::Expired);
        assert_eq!(
            determine_access_type(AccessEvidence {
                remaining_days: Some(-3),
                ..AccessEvidence::default()
            }),
            AccessType::Expired
        );
    }

    #[test]
    fn redemption_beats_purchase() {
        let evidence = AccessEvidence {
            remaining_days: Some(30),
            redeemed: true,
            purchased: true,
        };
        assert_eq!(determine_access_type(evidence), AccessType::Redeemed);
    }

    #[test]
    fn purchase_then_trial() {
        assert_eq!(
            determine_access_type(AccessEvidence {
                purchased: true,
                ..AccessEvidence::default()
            }),
            AccessType::Purchased
        );
        assert_eq!(determine_access_type(AccessEvidence::default()), AccessType::Trial);
    }
}
