// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock remote entitlement source for deterministic testing.
//!
//! `MockRemoteSource` answers from a shared [`MockBackend`] and records every
//! call so tests can assert on network usage. Latency and failures can be
//! injected per instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tollgate_core::{
    ContentBundle, ContentId, Identity, RedemptionRecord, RemoteAccess, RemoteEntitlementSource,
    TollgateError,
};

use crate::backend::MockBackend;

/// A recorded `check_access` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckCall {
    pub identity: Identity,
    pub content_id: ContentId,
    pub force_refresh: bool,
}

#[derive(Default)]
struct Behaviour {
    delay: Option<Duration>,
    failure: Option<String>,
}

pub struct MockRemoteSource {
    backend: Arc<MockBackend>,
    behaviour: Mutex<Behaviour>,
    checks: Mutex<Vec<CheckCall>>,
    list_calls: AtomicUsize,
    redeem_calls: AtomicUsize,
    clear_pending_calls: AtomicUsize,
}

impl MockRemoteSource {
    pub fn new(backend: Arc<MockBackend>) -> Self {
        Self {
            backend,
            behaviour: Mutex::new(Behaviour::default()),
            checks: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            redeem_calls: AtomicUsize::new(0),
            clear_pending_calls: AtomicUsize::new(0),
        }
    }

    fn behaviour(&self) -> std::sync::MutexGuard<'_, Behaviour> {
        self.behaviour.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delays every call by `delay` (tokio time, so paused clocks apply).
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.behaviour().delay = delay;
    }

    /// Makes every call fail with an HTTP 503 carrying `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        self.behaviour().failure = Some(message.into());
    }

    pub fn recover(&self) {
        self.behaviour().failure = None;
    }

    pub fn backend(&self) -> &Arc<MockBackend> {
        &self.backend
    }

    pub fn check_calls(&self) -> Vec<CheckCall> {
        self.checks.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn check_count(&self) -> usize {
        self.checks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Number of checks made for one content id.
    pub fn checks_for(&self, content_id: &ContentId) -> usize {
        self.check_calls()
            .iter()
            .filter(|c| &c.content_id == content_id)
            .count()
    }

    /// Check counts grouped by identity.
    pub fn checks_by_identity(&self) -> HashMap<Identity, usize> {
        let mut counts = HashMap::new();
        for call in self.check_calls() {
            *counts.entry(call.identity).or_insert(0) += 1;
        }
        counts
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn redeem_count(&self) -> usize {
        self.redeem_calls.load(Ordering::SeqCst)
    }

    pub fn clear_pending_count(&self) -> usize {
        self.clear_pending_calls.load(Ordering::SeqCst)
    }

    /// Total calls of every kind that would have hit the network.
    pub fn network_calls(&self) -> usize {
        self.check_count() + self.list_count() + self.redeem_count()
    }

    pub fn reset_counts(&self) {
        self.checks.lock().unwrap_or_else(|p| p.into_inner()).clear();
        self.list_calls.store(0, Ordering::SeqCst);
        self.redeem_calls.store(0, Ordering::SeqCst);
        self.clear_pending_calls.store(0, Ordering::SeqCst);
    }

    /// Applies the configured latency and failure, honouring cancellation.
    async fn simulate(&self, cancel: &CancellationToken) -> Result<(), TollgateError> {
        let (delay, failure) = {
            let behaviour = self.behaviour();
            (behaviour.delay, behaviour.failure.clone())
        };
        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TollgateError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(TollgateError::Cancelled);
        }
        match failure {
            Some(message) => Err(TollgateError::Http {
                message,
                status: Some(503),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteEntitlementSource for MockRemoteSource {
    async fn check_access(
        &self,
        identity: &Identity,
        content_id: &ContentId,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<RemoteAccess, TollgateError> {
        self.checks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(CheckCall {
                identity: identity.clone(),
                content_id: content_id.clone(),
                force_refresh,
            });
        self.simulate(cancel).await?;
        Ok(self.backend.access(identity, content_id))
    }

    async fn list_content(
        &self,
        identity: &Identity,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContentBundle>, TollgateError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate(cancel).await?;
        Ok(self.backend.catalog_for(identity))
    }

    async fn redeem_code(
        &self,
        identity: &Identity,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<RedemptionRecord, TollgateError> {
        self.redeem_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate(cancel).await?;
        self.backend.redeem(identity, code)
    }

    fn clear_pending(&self) {
        self.clear_pending_calls.fetch_add(1, Ordering::SeqCst);
    }
}
