// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push listener: one channel subscription per resolver.
//!
//! The listener task only holds a weak reference to the resolver, and the
//! resolver owns the task's [`ListenerGuard`]; dropping the last resolver
//! handle aborts the task and releases the subscription.

use std::sync::{Arc, Weak};

use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tollgate_core::{ChannelEvent, ServerEvent};

use crate::resolver::{EntitlementResolver, Inner};

/// Aborts the listener task when dropped.
pub(crate) struct ListenerGuard {
    task: JoinHandle<()>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl EntitlementResolver {
    /// Starts applying channel pushes to this resolver. Calling it again is a no-op.
    pub fn start_listener(&self) {
        let mut slot = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return;
        }
        let events = self.subscribe_channel();
        let task = tokio::spawn(listen(Arc::downgrade(&self.inner), events));
        *slot = Some(ListenerGuard { task });
        debug!(identity = %self.identity(), "push listener started");
    }

    pub fn stop_listener(&self) {
        let guard = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(guard);
    }

    pub fn is_listening(&self) -> bool {
        self.inner
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|guard| !guard.task.is_finished())
    }

    /// Applies one server push.
    pub async fn apply_push(&self, event: ServerEvent) {
        match event {
            ServerEvent::AccessUpdate(update) => {
                self.apply_update(
                    update.content_id,
                    update.has_access,
                    update.expiry_date,
                    update.remaining_days,
                )
                .await;
            }
            ServerEvent::BatchAccessUpdate { updates } => {
                for update in updates {
                    self.apply_update(
                        update.content_id,
                        update.has_access,
                        update.expiry_date,
                        update.remaining_days,
                    )
                    .await;
                }
            }
            ServerEvent::PurchaseSuccess {
                content_id,
                expiry_date,
            } => {
                self.apply_update(content_id, true, expiry_date, None).await;
            }
        }
    }
}

async fn listen(resolver: Weak<Inner>, mut events: Receiver<ChannelEvent>) {
    loop {
        let event = events.recv().await;
        let Some(inner) = resolver.upgrade() else {
            break;
        };
        let resolver = EntitlementResolver { inner };
        if resolver.is_cancelled() {
            break;
        }

        match event {
            Ok(ChannelEvent::Push(push)) => resolver.apply_push(push).await,
            Ok(ChannelEvent::Reconnected) => {
                debug!(identity = %resolver.identity(), "channel reconnected, resyncing");
                if let Err(e) = resolver.resync(false).await {
                    debug!(error = %e, "resync after reconnect skipped");
                }
            }
            Ok(ChannelEvent::Disconnected) => {
                debug!(identity = %resolver.identity(), "channel disconnected");
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "push listener lagged, resyncing");
                if let Err(e) = resolver.resync(false).await {
                    debug!(error = %e, "resync after lag skipped");
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}
