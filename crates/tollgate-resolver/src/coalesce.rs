// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Debounce for identical resolutions.
//!
//! A resolution started for a content id is shared with every caller asking
//! for the same id within the debounce window, including callers arriving
//! after it finished. Mutations drop the entry so the next caller resolves
//! afresh.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use tollgate_core::ContentId;

pub(crate) type SharedAccess = Shared<BoxFuture<'static, bool>>;

struct Pending {
    started: DateTime<Utc>,
    future: SharedAccess,
}

pub(crate) struct Coalescer {
    window: chrono::Duration,
    entries: DashMap<ContentId, Pending>,
}

impl Coalescer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
            entries: DashMap::new(),
        }
    }

    /// Joins the live entry for `id`, or starts `start()` and registers it.
    pub(crate) fn join_or_start<F>(&self, id: &ContentId, now: DateTime<Utc>, start: F) -> SharedAccess
    where
        F: FnOnce() -> BoxFuture<'static, bool>,
    {
        match self.entries.entry(id.clone()) {
            Entry::Occupied(entry) if now - entry.get().started < self.window => {
                debug!(content_id = %id, "coalescing resolution");
                entry.get().future.clone()
            }
            Entry::Occupied(mut entry) => {
                let future = start().shared();
                entry.insert(Pending {
                    started: now,
                    future: future.clone(),
                });
                future
            }
            Entry::Vacant(entry) => {
                let future = start().shared();
                entry.insert(Pending {
                    started: now,
                    future: future.clone(),
                });
                future
            }
        }
    }

    pub(crate) fn invalidate(&self, id: &ContentId) {
        self.entries.remove(id);
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(calls: Arc<AtomicUsize>) -> impl FnOnce() -> BoxFuture<'static, bool> {
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                true
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn shares_within_window_and_restarts_after() {
        let coalescer = Coalescer::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let id = ContentId::new("q1");
        let t0 = Utc::now();

        assert!(coalescer.join_or_start(&id, t0, counting(calls.clone())).await);
        assert!(
            coalescer
                .join_or_start(&id, t0 + chrono::Duration::seconds(4), counting(calls.clone()))
                .await
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        coalescer
            .join_or_start(&id, t0 + chrono::Duration::seconds(6), counting(calls.clone()))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_resolution() {
        let coalescer = Coalescer::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let id = ContentId::new("q1");
        let now = Utc::now();

        coalescer.join_or_start(&id, now, counting(calls.clone())).await;
        coalescer.invalidate(&id);
        coalescer.join_or_start(&id, now, counting(calls.clone())).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
