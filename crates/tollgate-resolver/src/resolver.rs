// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entitlement resolution for one identity.
//!
//! [`EntitlementResolver::has_access`] walks the evidence in a fixed order and
//! stops at the first definitive answer:
//!
//! 1. Free content in the loaded catalog (no I/O)
//! 2. Fresh positive cache record
//! 3. Session purchase list (expired matches are recorded as expired)
//! 4. Session and persisted redemptions
//! 5. Remote source, broadcasting positive answers to sibling sessions
//! 6. Otherwise no access
//!
//! Every cache write is skipped once the identity's cancellation token fires,
//! so a switched-away identity can never write into the cache.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tollgate_core::types::{expiry_after_days, remaining_days_until};
use tollgate_core::{
    AccessType, ClientEvent, Clock, ContentBundle, ContentId, EntitlementCache, EntitlementKey,
    EntitlementRecord, Identity, PurchaseRecord, RedemptionRecord, RemoteAccess,
    RemoteEntitlementSource, TollgateError, UpdateChannel,
};

use crate::access::{
    AccessChange, AccessEvidence, ChangeSource, ResolutionState, StateEntry, determine_access_type,
};
use crate::coalesce::Coalescer;
use crate::listener::ListenerGuard;
use crate::settings::ResolverSettings;

const CHANGE_BUFFER: usize = 128;

/// The collaborators a resolver is built on.
#[derive(Clone)]
pub struct Collaborators {
    pub cache: Arc<dyn EntitlementCache>,
    pub remote: Arc<dyn RemoteEntitlementSource>,
    pub channel: Arc<dyn UpdateChannel>,
    pub clock: Arc<dyn Clock>,
}

/// Outcome of matching the session purchase list.
enum PurchaseMatch {
    Valid(PurchaseRecord),
    Expired,
    None,
}

pub(crate) struct Inner {
    identity: Identity,
    deps: Collaborators,
    settings: ResolverSettings,
    cancel: CancellationToken,
    /// Catalog entries: content id -> is paid.
    catalog: DashMap<ContentId, bool>,
    purchases: RwLock<Vec<PurchaseRecord>>,
    redemptions: RwLock<Vec<RedemptionRecord>>,
    interest: DashSet<ContentId>,
    states: DashMap<ContentId, StateEntry>,
    coalescer: Coalescer,
    changes: broadcast::Sender<AccessChange>,
    pub(crate) listener: Mutex<Option<ListenerGuard>>,
}

/// Resolves entitlements for one identity. Cheap to clone.
#[derive(Clone)]
pub struct EntitlementResolver {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for EntitlementResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementResolver").finish_non_exhaustive()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn expired_record(content_id: &ContentId, now: DateTime<Utc>) -> EntitlementRecord {
    EntitlementRecord::new(content_id.clone(), false, Some(0), AccessType::Expired, now)
}

impl EntitlementResolver {
    pub fn new(
        identity: Identity,
        deps: Collaborators,
        settings: ResolverSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            inner: Arc::new(Inner {
                identity,
                deps,
                settings,
                cancel,
                catalog: DashMap::new(),
                purchases: RwLock::new(Vec::new()),
                redemptions: RwLock::new(Vec::new()),
                interest: DashSet::new(),
                states: DashMap::new(),
                coalescer: Coalescer::new(settings.debounce),
                changes,
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.inner.settings
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Observer stream of entitlement changes for this identity.
    pub fn subscribe(&self) -> broadcast::Receiver<AccessChange> {
        self.inner.changes.subscribe()
    }

    /// Cancels all in-flight work and stops the push listener.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.coalescer.clear();
        self.stop_listener();
    }

    pub(crate) fn subscribe_channel(&self) -> broadcast::Receiver<tollgate_core::ChannelEvent> {
        self.inner.deps.channel.subscribe()
    }

    fn ensure_live(&self) -> Result<(), TollgateError> {
        if self.is_cancelled() {
            Err(TollgateError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.deps.clock.now()
    }

    fn key(&self, content_id: &ContentId) -> EntitlementKey {
        EntitlementKey::new(self.inner.identity.clone(), content_id.clone())
    }

    // --- catalog and session state ---

    /// Replaces the known catalog. Unpaid bundles resolve without any I/O.
    pub fn load_catalog(&self, bundles: &[ContentBundle]) {
        self.inner.catalog.clear();
        for bundle in bundles {
            self.inner.catalog.insert(bundle.id.clone(), bundle.is_paid);
        }
        debug!(identity = %self.inner.identity, bundles = bundles.len(), "catalog loaded");
    }

    pub fn is_free(&self, content_id: &ContentId) -> bool {
        self.inner
            .catalog
            .get(content_id)
            .is_some_and(|is_paid| !*is_paid)
    }

    /// Replaces the session purchase list.
    pub fn set_purchases(&self, purchases: Vec<PurchaseRecord>) {
        for purchase in &purchases {
            self.inner.coalescer.invalidate(&purchase.content_id);
        }
        *write(&self.inner.purchases) = purchases;
    }

    pub fn purchases(&self) -> Vec<PurchaseRecord> {
        read(&self.inner.purchases).clone()
    }

    /// Content ids this session has resolved or received pushes for.
    pub fn content_of_interest(&self) -> Vec<ContentId> {
        let ids: BTreeSet<ContentId> = self.inner.interest.iter().map(|id| id.key().clone()).collect();
        ids.into_iter().collect()
    }

    fn match_purchase(&self, content_id: &ContentId, now: DateTime<Utc>) -> PurchaseMatch {
        let purchases = read(&self.inner.purchases);
        let mut expired = false;
        for purchase in purchases.iter().filter(|p| &p.content_id == content_id) {
            if purchase.is_valid_at(now) {
                return PurchaseMatch::Valid(purchase.clone());
            }
            if purchase.is_expired_at(now) {
                expired = true;
            }
        }
        if expired {
            PurchaseMatch::Expired
        } else {
            PurchaseMatch::None
        }
    }

    async fn valid_redemption(
        &self,
        content_id: &ContentId,
        now: DateTime<Utc>,
    ) -> Option<RedemptionRecord> {
        let session = read(&self.inner.redemptions)
            .iter()
            .find(|r| &r.content_id == content_id && r.is_valid_at(now))
            .cloned();
        if session.is_some() {
            return session;
        }
        match self.inner.deps.cache.redemptions(&self.inner.identity).await {
            Ok(persisted) => persisted
                .into_iter()
                .find(|r| &r.content_id == content_id && r.is_valid_at(now)),
            Err(e) => {
                warn!(identity = %self.inner.identity, error = %e, "failed to read persisted redemptions");
                None
            }
        }
    }

    // --- state ---

    fn set_state(&self, content_id: &ContentId, state: ResolutionState) {
        self.inner.states.insert(
            content_id.clone(),
            StateEntry {
                state,
                since: self.now(),
            },
        );
    }

    /// Current resolution state; `Resolved` reverts to `Unknown` once stale.
    pub fn resolution_state(&self, content_id: &ContentId) -> ResolutionState {
        if self.is_free(content_id) {
            return ResolutionState::Resolved;
        }
        let Some(entry) = self.inner.states.get(content_id).map(|e| *e) else {
            return ResolutionState::Unknown;
        };
        let stale = chrono::Duration::from_std(self.inner.settings.staleness_threshold)
            .is_ok_and(|ttl| self.now() - entry.since >= ttl);
        if entry.state == ResolutionState::Resolved && stale {
            ResolutionState::Unknown
        } else {
            entry.state
        }
    }

    // --- cache access ---

    async fn read_cached(&self, content_id: &ContentId, now: DateTime<Utc>) -> Option<EntitlementRecord> {
        match self.inner.deps.cache.get(&self.key(content_id)).await {
            Ok(record) => record.map(|r| r.as_of(now)),
            Err(e) => {
                warn!(content_id = %content_id, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Cached record for `content_id` as it stands now.
    pub async fn entitlement(&self, content_id: &ContentId) -> Option<EntitlementRecord> {
        self.read_cached(content_id, self.now()).await
    }

    async fn store(&self, record: &EntitlementRecord) -> Result<(), TollgateError> {
        self.ensure_live()?;
        self.inner.interest.insert(record.content_id.clone());
        self.inner
            .deps
            .cache
            .set(&self.key(&record.content_id), record)
            .await
    }

    /// Writes `record`, logging instead of failing; returns whether it landed.
    async fn store_logged(&self, record: &EntitlementRecord) -> bool {
        match self.store(record).await {
            Ok(()) => true,
            Err(TollgateError::Cancelled) => {
                debug!(content_id = %record.content_id, "identity cancelled, cache write skipped");
                false
            }
            Err(e) => {
                warn!(content_id = %record.content_id, error = %e, "cache write failed");
                false
            }
        }
    }

    fn notify(&self, record: &EntitlementRecord, source: ChangeSource) {
        let _ = self
            .inner
            .changes
            .send(AccessChange::from_record(record, source));
    }

    async fn emit(&self, event: ClientEvent) {
        let name = event.name();
        if let Err(e) = self.inner.deps.channel.emit(event).await {
            warn!(event = name, error = %e, "failed to emit channel event");
        }
    }

    /// Tells sibling sessions about a positive determination.
    async fn announce(&self, record: &EntitlementRecord) {
        if record.has_access {
            self.emit(ClientEvent::CheckAccess {
                user_id: self.inner.identity.clone(),
                content_id: record.content_id.clone(),
            })
            .await;
        }
    }

    // --- records ---

    fn purchase_record(&self, purchase: &PurchaseRecord, now: DateTime<Utc>) -> EntitlementRecord {
        let content_id = purchase.content_id.clone();
        if purchase.is_valid_at(now) {
            let remaining = purchase.expiry_date.map(|e| remaining_days_until(e, now));
            let access_type = determine_access_type(AccessEvidence {
                remaining_days: remaining,
                redeemed: false,
                purchased: true,
            });
            EntitlementRecord::new(content_id, true, remaining, access_type, now)
                .with_expiry(purchase.expiry_date)
        } else {
            expired_record(&content_id, now)
        }
    }

    fn redemption_record(&self, redemption: &RedemptionRecord, now: DateTime<Utc>) -> EntitlementRecord {
        let remaining = redemption.expiry_date.map(|e| remaining_days_until(e, now));
        let access_type = determine_access_type(AccessEvidence {
            remaining_days: remaining,
            redeemed: true,
            purchased: false,
        });
        EntitlementRecord::new(
            redemption.content_id.clone(),
            redemption.is_valid_at(now),
            remaining,
            access_type,
            now,
        )
        .with_expiry(redemption.expiry_date)
    }

    fn remote_record(
        &self,
        content_id: &ContentId,
        access: RemoteAccess,
        redeemed: bool,
        now: DateTime<Utc>,
    ) -> EntitlementRecord {
        let access_type = determine_access_type(AccessEvidence {
            remaining_days: access.remaining_days,
            redeemed: redeemed && access.has_access,
            purchased: access.has_access,
        });
        let expiry = access
            .remaining_days
            .filter(|_| access.has_access)
            .and_then(|days| expiry_after_days(now, days));
        EntitlementRecord::new(
            content_id.clone(),
            access.has_access,
            access.remaining_days,
            access_type,
            now,
        )
        .with_expiry(expiry)
    }

    // --- resolution ---

    /// Whether the identity may access `content_id` right now.
    ///
    /// Never fails: network trouble degrades to the last cached value or `false`.
    pub async fn has_access(&self, content_id: &ContentId) -> bool {
        if self.is_free(content_id) {
            debug!(content_id = %content_id, "free content");
            return true;
        }
        if self.is_cancelled() {
            return false;
        }
        self.inner.interest.insert(content_id.clone());

        let this = self.clone();
        let id = content_id.clone();
        let shared = self
            .inner
            .coalescer
            .join_or_start(content_id, self.now(), move || {
                async move { this.resolve_bounded(id, false).await }.boxed()
            });
        shared.await
    }

    /// Re-verifies `content_id` against the remote source, skipping local evidence.
    pub async fn refresh(&self, content_id: &ContentId) -> bool {
        if self.is_free(content_id) {
            return true;
        }
        if self.is_cancelled() {
            return false;
        }
        self.inner.interest.insert(content_id.clone());
        self.inner.coalescer.invalidate(content_id);
        self.clone().resolve_bounded(content_id.clone(), true).await
    }

    /// Days left on the entitlement; `None` when unlimited, free or unknown.
    pub async fn remaining_days(&self, content_id: &ContentId) -> Option<i64> {
        if self.is_free(content_id) {
            return None;
        }
        self.has_access(content_id).await;
        self.entitlement(content_id)
            .await
            .and_then(|record| record.remaining_days)
            .map(|days| days.max(0))
    }

    async fn resolve_bounded(self, content_id: ContentId, force: bool) -> bool {
        let limit = self.inner.settings.resolution_timeout;
        match tokio::time::timeout(limit, self.resolve(&content_id, force)).await {
            Ok(has_access) => has_access,
            Err(_) => {
                warn!(
                    content_id = %content_id,
                    timeout_ms = limit.as_millis() as u64,
                    "resolution timed out, degrading"
                );
                let now = self.now();
                let known_expired = matches!(self.match_purchase(&content_id, now), PurchaseMatch::Expired);
                let cached = self.read_cached(&content_id, now).await;
                self.degrade(&content_id, cached.as_ref(), known_expired)
            }
        }
    }

    fn degrade(&self, content_id: &ContentId, cached: Option<&EntitlementRecord>, known_expired: bool) -> bool {
        metrics::counter!("tollgate_degraded_resolutions_total").increment(1);
        self.set_state(content_id, ResolutionState::Degraded);
        if known_expired {
            return false;
        }
        cached.is_some_and(|record| record.has_access)
    }

    async fn resolve(&self, content_id: &ContentId, force: bool) -> bool {
        metrics::counter!("tollgate_resolutions_total").increment(1);
        let now = self.now();
        let threshold = self.inner.settings.staleness_threshold;
        let cached = self.read_cached(content_id, now).await;
        let mut known_expired = false;

        if !force {
            // A lapsed purchase outranks a positive record cached before it lapsed.
            let purchase = self.match_purchase(content_id, now);
            let lapsed = matches!(purchase, PurchaseMatch::Expired);
            if !lapsed && cached.as_ref().is_some_and(|r| r.is_trusted(now, threshold)) {
                metrics::counter!("tollgate_cache_hits_total").increment(1);
                debug!(content_id = %content_id, "trusted cache hit");
                self.set_state(content_id, ResolutionState::Resolved);
                return true;
            }
            metrics::counter!("tollgate_cache_misses_total").increment(1);

            match purchase {
                PurchaseMatch::Valid(purchase) => {
                    let record = self.purchase_record(&purchase, now);
                    if self.store_logged(&record).await {
                        self.notify(&record, ChangeSource::Resolution);
                    }
                    self.set_state(content_id, ResolutionState::Resolved);
                    return record.has_access;
                }
                PurchaseMatch::Expired => {
                    debug!(content_id = %content_id, "matching purchase has expired");
                    let record = expired_record(content_id, now);
                    if self.store_logged(&record).await {
                        self.notify(&record, ChangeSource::Resolution);
                    }
                    known_expired = true;
                }
                PurchaseMatch::None => {}
            }

            if let Some(redemption) = self.valid_redemption(content_id, now).await {
                let record = self.redemption_record(&redemption, now);
                if self.store_logged(&record).await {
                    self.notify(&record, ChangeSource::Resolution);
                }
                self.set_state(content_id, ResolutionState::Resolved);
                return record.has_access;
            }
        }

        if self.is_cancelled() {
            return false;
        }
        self.set_state(content_id, ResolutionState::Checking);
        let remote = self
            .inner
            .deps
            .remote
            .check_access(&self.inner.identity, content_id, force, &self.inner.cancel)
            .await;

        match remote {
            Ok(access) => {
                if self.is_cancelled() {
                    return false;
                }
                let record = if known_expired && !access.has_access {
                    expired_record(content_id, now)
                } else {
                    self.remote_record(content_id, access, false, now)
                };
                let changed = cached
                    .as_ref()
                    .is_none_or(|c| c.has_access != record.has_access || c.remaining_days != record.remaining_days);
                if self.store_logged(&record).await && changed {
                    self.notify(&record, ChangeSource::Resolution);
                }
                self.set_state(content_id, ResolutionState::Resolved);
                self.announce(&record).await;
                record.has_access
            }
            Err(e) if e.is_cancelled() => false,
            Err(e) => {
                warn!(content_id = %content_id, error = %e, "remote check failed, degrading");
                self.degrade(content_id, cached.as_ref(), known_expired)
            }
        }
    }

    // --- mutations ---

    /// Records a completed purchase and issues a resync before returning.
    pub async fn apply_purchase(&self, purchase: PurchaseRecord) -> Result<EntitlementRecord, TollgateError> {
        self.ensure_live()?;
        let content_id = purchase.content_id.clone();
        {
            let mut purchases = write(&self.inner.purchases);
            purchases.retain(|p| p.id != purchase.id);
            purchases.push(purchase.clone());
        }
        self.inner.coalescer.invalidate(&content_id);

        let record = self.purchase_record(&purchase, self.now());
        self.store(&record).await?;
        self.set_state(&content_id, ResolutionState::Resolved);
        self.notify(&record, ChangeSource::Purchase);
        info!(identity = %self.inner.identity, content_id = %content_id, "purchase applied");
        self.announce(&record).await;

        self.resync(true).await?;
        Ok(record)
    }

    /// Records a code redemption and issues a resync before returning.
    pub async fn apply_redemption(
        &self,
        redemption: RedemptionRecord,
    ) -> Result<EntitlementRecord, TollgateError> {
        self.ensure_live()?;
        let content_id = redemption.content_id.clone();
        {
            let mut redemptions = write(&self.inner.redemptions);
            redemptions.retain(|r| r.code != redemption.code);
            redemptions.push(redemption.clone());
        }
        self.inner
            .deps
            .cache
            .add_redemption(&self.inner.identity, &redemption)
            .await?;
        self.inner.coalescer.invalidate(&content_id);

        let record = self.redemption_record(&redemption, self.now());
        self.store(&record).await?;
        self.set_state(&content_id, ResolutionState::Resolved);
        self.notify(&record, ChangeSource::Redemption);
        info!(
            identity = %self.inner.identity,
            content_id = %content_id,
            code = %redemption.code,
            "redemption applied"
        );
        self.announce(&record).await;

        self.resync(true).await?;
        Ok(record)
    }

    /// Asks the server to push the current state of every content id of interest.
    pub async fn resync(&self, force_refresh: bool) -> Result<(), TollgateError> {
        self.ensure_live()?;
        let mut ids: BTreeSet<ContentId> = self.inner.interest.iter().map(|id| id.key().clone()).collect();
        match self.inner.deps.cache.content_ids(&self.inner.identity).await {
            Ok(cached) => ids.extend(cached),
            Err(e) => warn!(error = %e, "failed to list cached content ids"),
        }
        ids.retain(|id| !self.is_free(id));
        if force_refresh {
            self.inner.coalescer.clear();
        }

        self.emit(ClientEvent::SyncAccessRights {
            user_id: self.inner.identity.clone(),
            force_refresh,
        })
        .await;
        if !ids.is_empty() {
            self.emit(ClientEvent::CheckAccessBatch {
                user_id: self.inner.identity.clone(),
                content_ids: ids.iter().cloned().collect(),
            })
            .await;
        }
        metrics::counter!("tollgate_resyncs_total").increment(1);
        debug!(identity = %self.inner.identity, content = ids.len(), force_refresh, "resync issued");
        Ok(())
    }

    /// Loads the content list from the remote source and applies any access
    /// annotations it carries.
    pub async fn refresh_catalog(&self) -> Result<Vec<ContentBundle>, TollgateError> {
        self.ensure_live()?;
        let bundles = self
            .inner
            .deps
            .remote
            .list_content(&self.inner.identity, &self.inner.cancel)
            .await?;
        self.load_catalog(&bundles);

        let now = self.now();
        for bundle in bundles.iter().filter(|b| b.is_paid) {
            let Some(has_access) = bundle.has_access else {
                continue;
            };
            let cached = self.read_cached(&bundle.id, now).await;
            if cached.is_some_and(|c| c.has_access == has_access) {
                continue;
            }
            let access = RemoteAccess {
                has_access,
                remaining_days: bundle.remaining_days,
            };
            let record = self.remote_record(&bundle.id, access, false, now);
            self.store(&record).await?;
            self.inner.coalescer.invalidate(&bundle.id);
            self.notify(&record, ChangeSource::Resolution);
        }
        Ok(bundles)
    }

    /// Applies one pushed access update through the cache.
    ///
    /// A negative push against a fresh positive record is suspect: it is
    /// settled by a forced remote check. If that check fails the cache is
    /// kept and the state drops to `Unknown` so the next read re-verifies.
    pub(crate) async fn apply_update(
        &self,
        content_id: ContentId,
        has_access: bool,
        expiry_date: Option<DateTime<Utc>>,
        remaining_days: Option<i64>,
    ) {
        if self.is_cancelled() {
            return;
        }
        metrics::counter!("tollgate_push_updates_total").increment(1);
        self.inner.interest.insert(content_id.clone());
        self.inner.coalescer.invalidate(&content_id);

        let now = self.now();
        let cached = self.read_cached(&content_id, now).await;
        let redeemed = self.valid_redemption(&content_id, now).await.is_some();

        if !has_access
            && cached
                .as_ref()
                .is_some_and(|c| c.is_trusted(now, self.inner.settings.staleness_threshold))
        {
            debug!(content_id = %content_id, "negative push conflicts with fresh record, re-checking");
            let recheck = self
                .inner
                .deps
                .remote
                .check_access(&self.inner.identity, &content_id, true, &self.inner.cancel)
                .await;
            match recheck {
                Ok(access) => {
                    let record = self.remote_record(&content_id, access, redeemed, now);
                    if self.store_logged(&record).await {
                        self.set_state(&content_id, ResolutionState::Resolved);
                        self.notify(&record, ChangeSource::Push);
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    warn!(content_id = %content_id, error = %e, "conflict re-check failed, keeping cache");
                    self.set_state(&content_id, ResolutionState::Unknown);
                }
            }
            return;
        }

        let expiry_date = expiry_date.or_else(|| {
            remaining_days
                .filter(|_| has_access)
                .and_then(|days| expiry_after_days(now, days))
        });
        let remaining = expiry_date
            .map(|e| remaining_days_until(e, now))
            .or(remaining_days);
        let access_type = determine_access_type(AccessEvidence {
            remaining_days: remaining,
            redeemed: redeemed && has_access,
            purchased: has_access,
        });
        let record = EntitlementRecord::new(content_id.clone(), has_access, remaining, access_type, now)
            .with_expiry(expiry_date);
        if self.store_logged(&record).await {
            self.set_state(&content_id, ResolutionState::Resolved);
            self.notify(&record, ChangeSource::Push);
        }
    }
}
