// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory stand-in for the entitlement backend.
//!
//! `MockBackend` is the shared server-side truth behind [`MockRemoteSource`]
//! and [`PushHub`]: grants per identity, redeemable codes and the content
//! catalog. Every device in a test talks to the same backend.
//!
//! [`MockRemoteSource`]: crate::MockRemoteSource
//! [`PushHub`]: crate::PushHub

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use tollgate_core::types::remaining_days_until;
use tollgate_core::{
    AccessUpdate, Clock, ContentBundle, ContentId, Identity, RedemptionRecord, RemoteAccess,
    TollgateError,
};

/// One backend grant. `expires_at: None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grant {
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct RedeemCode {
    content_id: ContentId,
    days: i64,
    redeemed_by: Option<Identity>,
}

#[derive(Default)]
struct State {
    grants: HashMap<Identity, BTreeMap<ContentId, Grant>>,
    codes: HashMap<String, RedeemCode>,
    catalog: Vec<ContentBundle>,
}

pub struct MockBackend {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl MockBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Grants `identity` access to `content_id` until `expires_at`.
    pub fn grant(&self, identity: &Identity, content_id: &ContentId, expires_at: Option<DateTime<Utc>>) {
        self.state()
            .grants
            .entry(identity.clone())
            .or_default()
            .insert(content_id.clone(), Grant { expires_at });
    }

    /// Grants access for `days` days from now.
    pub fn grant_days(&self, identity: &Identity, content_id: &ContentId, days: i64) {
        let expiry = self.now() + Duration::days(days);
        self.grant(identity, content_id, Some(expiry));
    }

    pub fn revoke(&self, identity: &Identity, content_id: &ContentId) {
        if let Some(grants) = self.state().grants.get_mut(identity) {
            grants.remove(content_id);
        }
    }

    /// Registers a one-time code unlocking `content_id` for `days` days.
    pub fn add_code(&self, code: &str, content_id: &ContentId, days: i64) {
        self.state().codes.insert(
            code.to_string(),
            RedeemCode {
                content_id: content_id.clone(),
                days,
                redeemed_by: None,
            },
        );
    }

    pub fn add_bundle(&self, id: &str, is_paid: bool) {
        self.state().catalog.push(ContentBundle {
            id: ContentId::new(id),
            title: id.to_string(),
            is_paid,
            has_access: None,
            remaining_days: None,
        });
    }

    /// Authoritative access answer for `(identity, content_id)`.
    pub fn access(&self, identity: &Identity, content_id: &ContentId) -> RemoteAccess {
        let now = self.now();
        let grant = self
            .state()
            .grants
            .get(identity)
            .and_then(|grants| grants.get(content_id).copied());
        match grant {
            None => RemoteAccess {
                has_access: false,
                remaining_days: None,
            },
            Some(Grant { expires_at: None }) => RemoteAccess {
                has_access: true,
                remaining_days: None,
            },
            Some(Grant {
                expires_at: Some(expiry),
            }) => {
                let days = remaining_days_until(expiry, now);
                RemoteAccess {
                    has_access: days > 0,
                    remaining_days: Some(days),
                }
            }
        }
    }

    /// Every grant of `identity` as a push update, in content id order.
    pub fn updates_for(&self, identity: &Identity) -> Vec<AccessUpdate> {
        let grants: Vec<(ContentId, Grant)> = self
            .state()
            .grants
            .get(identity)
            .map(|g| g.iter().map(|(id, grant)| (id.clone(), *grant)).collect())
            .unwrap_or_default();
        grants
            .into_iter()
            .map(|(content_id, grant)| self.update(identity, &content_id, grant.expires_at))
            .collect()
    }

    /// Push update describing the current answer for one content id.
    pub fn update_for(&self, identity: &Identity, content_id: &ContentId) -> AccessUpdate {
        let expires_at = self
            .state()
            .grants
            .get(identity)
            .and_then(|g| g.get(content_id))
            .and_then(|grant| grant.expires_at);
        self.update(identity, content_id, expires_at)
    }

    fn update(
        &self,
        identity: &Identity,
        content_id: &ContentId,
        expiry_date: Option<DateTime<Utc>>,
    ) -> AccessUpdate {
        let access = self.access(identity, content_id);
        AccessUpdate {
            content_id: content_id.clone(),
            has_access: access.has_access,
            expiry_date,
            remaining_days: access.remaining_days,
        }
    }

    /// Catalog annotated with `identity`'s access to paid bundles.
    pub fn catalog_for(&self, identity: &Identity) -> Vec<ContentBundle> {
        let catalog = self.state().catalog.clone();
        catalog
            .into_iter()
            .map(|mut bundle| {
                if bundle.is_paid {
                    let access = self.access(identity, &bundle.id);
                    bundle.has_access = Some(access.has_access);
                    bundle.remaining_days = access.remaining_days;
                }
                bundle
            })
            .collect()
    }

    /// Redeems `code` for `identity`, turning it into a grant.
    pub fn redeem(&self, identity: &Identity, code: &str) -> Result<RedemptionRecord, TollgateError> {
        let now = self.now();
        let (content_id, expiry) = {
            let mut state = self.state();
            let entry = state.codes.get_mut(code).ok_or_else(|| TollgateError::Remote {
                message: format!("invalid redeem code `{code}`"),
            })?;
            if entry.redeemed_by.is_some() {
                return Err(TollgateError::Remote {
                    message: format!("code `{code}` has already been redeemed"),
                });
            }
            entry.redeemed_by = Some(identity.clone());
            (entry.content_id.clone(), now + Duration::days(entry.days))
        };
        self.grant(identity, &content_id, Some(expiry));
        Ok(RedemptionRecord {
            code: code.to_string(),
            content_id,
            redeemed_at: now,
            expiry_date: Some(expiry),
        })
    }
}

#[cfg(test)]
mod tests {
    use tollgate_core::ManualClock;

    use super::*;

    fn backend() -> MockBackend {
        MockBackend::new(Arc::new(ManualClock::new(Utc::now())))
    }

    #[test]
    fn grants_are_per_identity() {
        let backend = backend();
        let a = Identity::new("a").unwrap();
        let b = Identity::new("b").unwrap();
        let q1 = ContentId::new("q1");
        backend.grant_days(&a, &q1, 30);

        assert_eq!(
            backend.access(&a, &q1),
            RemoteAccess {
                has_access: true,
                remaining_days: Some(30)
            }
        );
        assert!(!backend.access(&b, &q1).has_access);
    }

    #[test]
    fn codes_redeem_once() {
        let backend = backend();
        let a = Identity::new("a").unwrap();
        backend.add_code("ABC123", &ContentId::new("Q1"), 30);

        let record = backend.redeem(&a, "ABC123").unwrap();
        assert_eq!(record.content_id.as_str(), "q1");
        assert_eq!(backend.access(&a, &record.content_id).remaining_days, Some(30));
        assert!(backend.redeem(&a, "ABC123").is_err());
        assert!(backend.redeem(&a, "NOPE").is_err());
    }
}
