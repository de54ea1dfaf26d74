// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process push server and channel for multi-session tests.
//!
//! [`PushHub`] plays the real-time server: every [`HubChannel`] is one
//! device's connection. Client events are answered from the shared
//! [`MockBackend`] the same way the real server answers them:
//!
//! - `questionSet:checkAccess` fans an access update out to every session of the user
//! - `questionSet:checkAccessBatch` answers the requesting session with a batch update
//! - `user:syncAccessRights` answers the requesting session with all of the user's grants
//!
//! Emitted events are captured for assertions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::broadcast;
use tracing::debug;

use tollgate_core::{
    ChannelEvent, ClientEvent, Identity, ServerEvent, TollgateError, UpdateChannel,
};

use crate::backend::MockBackend;

const EVENT_BUFFER: usize = 256;

struct Endpoint {
    id: usize,
    identity: Option<Identity>,
    events: broadcast::Sender<ChannelEvent>,
}

pub struct PushHub {
    backend: Arc<MockBackend>,
    endpoints: Mutex<Vec<Endpoint>>,
    next_id: AtomicUsize,
}

impl PushHub {
    pub fn new(backend: Arc<MockBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            endpoints: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        })
    }

    fn endpoints(&self) -> std::sync::MutexGuard<'_, Vec<Endpoint>> {
        self.endpoints.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens a new device connection.
    pub fn channel(self: &Arc<Self>) -> Arc<HubChannel> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        self.endpoints().push(Endpoint {
            id,
            identity: None,
            events: events.clone(),
        });
        Arc::new(HubChannel {
            id,
            hub: Arc::clone(self),
            events,
            identity: Mutex::new(None),
            online: AtomicBool::new(true),
            emitted: Mutex::new(Vec::new()),
            deferred: Mutex::new(Vec::new()),
        })
    }

    fn bind(&self, id: usize, identity: Option<Identity>) {
        if let Some(endpoint) = self.endpoints().iter_mut().find(|e| e.id == id) {
            endpoint.identity = identity;
        }
    }

    fn release(&self, id: usize) {
        self.endpoints().retain(|e| e.id != id);
    }

    fn senders_for(&self, identity: &Identity) -> Vec<broadcast::Sender<ChannelEvent>> {
        self.endpoints()
            .iter()
            .filter(|e| e.identity.as_ref() == Some(identity))
            .map(|e| e.events.clone())
            .collect()
    }

    fn sender(&self, id: usize) -> Option<broadcast::Sender<ChannelEvent>> {
        self.endpoints()
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.events.clone())
    }

    /// Number of connections currently authenticated as `identity`.
    pub fn sessions_of(&self, identity: &Identity) -> usize {
        self.senders_for(identity).len()
    }

    /// Pushes `event` to every session of `identity`; returns how many received it.
    pub fn push(&self, identity: &Identity, event: ServerEvent) -> usize {
        let senders = self.senders_for(identity);
        for sender in &senders {
            let _ = sender.send(ChannelEvent::Push(event.clone()));
        }
        senders.len()
    }

    /// Pushes every grant of `identity` as one batch update.
    pub fn push_grants(&self, identity: &Identity) -> usize {
        let updates = self.backend.updates_for(identity);
        self.push(identity, ServerEvent::BatchAccessUpdate { updates })
    }

    fn handle(&self, from: usize, identity: &Identity, event: &ClientEvent) {
        match event {
            ClientEvent::CheckAccess { user_id, content_id } if user_id == identity => {
                let update = self.backend.update_for(identity, content_id);
                let delivered = self.push(identity, ServerEvent::AccessUpdate(update));
                debug!(identity = %identity, content_id = %content_id, delivered, "hub fanned out access update");
            }
            ClientEvent::CheckAccessBatch { user_id, content_ids } if user_id == identity => {
                let updates = content_ids
                    .iter()
                    .map(|id| self.backend.update_for(identity, id))
                    .collect();
                self.reply(from, ServerEvent::BatchAccessUpdate { updates });
            }
            ClientEvent::SyncAccessRights { user_id, .. } if user_id == identity => {
                let updates = self.backend.updates_for(identity);
                self.reply(from, ServerEvent::BatchAccessUpdate { updates });
            }
            other => debug!(event = other.name(), "hub ignored event for another user"),
        }
    }

    fn reply(&self, to: usize, event: ServerEvent) {
        if let Some(sender) = self.sender(to) {
            let _ = sender.send(ChannelEvent::Push(event));
        }
    }
}

/// One device's connection to a [`PushHub`].
pub struct HubChannel {
    id: usize,
    hub: Arc<PushHub>,
    events: broadcast::Sender<ChannelEvent>,
    identity: Mutex<Option<Identity>>,
    online: AtomicBool,
    emitted: Mutex<Vec<ClientEvent>>,
    /// Events emitted while offline, delivered on reconnect.
    deferred: Mutex<Vec<ClientEvent>>,
}

impl HubChannel {
    pub fn identity(&self) -> Option<Identity> {
        self.identity.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Every client event emitted on this channel, in order.
    pub fn emitted(&self) -> Vec<ClientEvent> {
        self.emitted.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn clear_emitted(&self) {
        self.emitted.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    /// Number of `user:syncAccessRights` events emitted for `identity`.
    pub fn sync_count(&self, identity: &Identity) -> usize {
        self.emitted()
            .iter()
            .filter(|e| matches!(e, ClientEvent::SyncAccessRights { user_id, .. } if user_id == identity))
            .count()
    }

    /// Number of live subscriptions on this channel.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Simulates a dropped connection.
    pub fn drop_connection(&self) {
        self.online.store(false, Ordering::SeqCst);
        self.hub.bind(self.id, None);
        let _ = self.events.send(ChannelEvent::Disconnected);
    }

    /// Simulates a successful reconnect: re-authenticates, publishes
    /// `Reconnected` and delivers events emitted while offline.
    pub fn restore_connection(&self) {
        self.online.store(true, Ordering::SeqCst);
        let identity = self.identity();
        self.hub.bind(self.id, identity.clone());
        let _ = self.events.send(ChannelEvent::Reconnected);

        let deferred = std::mem::take(&mut *self.deferred.lock().unwrap_or_else(|p| p.into_inner()));
        if let Some(identity) = identity {
            for event in &deferred {
                self.hub.handle(self.id, &identity, event);
            }
        }
    }
}

#[async_trait]
impl UpdateChannel for HubChannel {
    async fn authenticate(
        &self,
        identity: &Identity,
        _credential: &SecretString,
    ) -> Result<(), TollgateError> {
        *self.identity.lock().unwrap_or_else(|p| p.into_inner()) = Some(identity.clone());
        if self.online.load(Ordering::SeqCst) {
            self.hub.bind(self.id, Some(identity.clone()));
            let _ = self.events.send(ChannelEvent::Reconnected);
        }
        Ok(())
    }

    async fn emit(&self, event: ClientEvent) -> Result<(), TollgateError> {
        let identity = self.identity().ok_or_else(|| TollgateError::Channel {
            message: "channel is not authenticated".to_string(),
            source: None,
        })?;
        self.emitted
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event.clone());
        if self.online.load(Ordering::SeqCst) {
            self.hub.handle(self.id, &identity, &event);
        } else {
            self.deferred
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(event);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    async fn disconnect(&self) -> Result<(), TollgateError> {
        *self.identity.lock().unwrap_or_else(|p| p.into_inner()) = None;
        self.hub.bind(self.id, None);
        let _ = self.events.send(ChannelEvent::Disconnected);
        Ok(())
    }
}

impl Drop for HubChannel {
    fn drop(&mut self) {
        self.hub.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tollgate_core::{ContentId, ManualClock};

    use super::*;

    fn hub() -> (Arc<MockBackend>, Arc<PushHub>) {
        let backend = Arc::new(MockBackend::new(Arc::new(ManualClock::new(Utc::now()))));
        let hub = PushHub::new(backend.clone());
        (backend, hub)
    }

    #[tokio::test]
    async fn check_access_fans_out_to_sibling_sessions() {
        let (backend, hub) = hub();
        let user = Identity::new("u1").unwrap();
        let q1 = ContentId::new("q1");
        backend.grant_days(&user, &q1, 30);

        let phone = hub.channel();
        let laptop = hub.channel();
        let token = SecretString::from("tok");
        phone.authenticate(&user, &token).await.unwrap();
        laptop.authenticate(&user, &token).await.unwrap();
        let mut laptop_events = laptop.subscribe();

        phone
            .emit(ClientEvent::CheckAccess {
                user_id: user.clone(),
                content_id: q1.clone(),
            })
            .await
            .unwrap();

        match laptop_events.recv().await.unwrap() {
            ChannelEvent::Push(ServerEvent::AccessUpdate(update)) => {
                assert_eq!(update.content_id, q1);
                assert!(update.has_access);
                assert_eq!(update.remaining_days, Some(30));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(phone.emitted().len(), 1);
    }

    #[tokio::test]
    async fn sync_replies_only_to_requester() {
        let (backend, hub) = hub();
        let user = Identity::new("u1").unwrap();
        backend.grant(&user, &ContentId::new("q1"), None);

        let phone = hub.channel();
        let laptop = hub.channel();
        let token = SecretString::from("tok");
        phone.authenticate(&user, &token).await.unwrap();
        laptop.authenticate(&user, &token).await.unwrap();
        let mut phone_events = phone.subscribe();
        let mut laptop_events = laptop.subscribe();

        phone
            .emit(ClientEvent::SyncAccessRights {
                user_id: user.clone(),
                force_refresh: true,
            })
            .await
            .unwrap();

        assert!(matches!(
            phone_events.recv().await.unwrap(),
            ChannelEvent::Push(ServerEvent::BatchAccessUpdate { .. })
        ));
        assert!(laptop_events.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_events_are_delivered_on_restore() {
        let (backend, hub) = hub();
        let user = Identity::new("u1").unwrap();
        backend.grant(&user, &ContentId::new("q1"), None);
        let channel = hub.channel();
        channel.authenticate(&user, &SecretString::from("t")).await.unwrap();
        let mut events = channel.subscribe();

        channel.drop_connection();
        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Disconnected);
        assert_eq!(hub.sessions_of(&user), 0);

        channel
            .emit(ClientEvent::SyncAccessRights {
                user_id: user.clone(),
                force_refresh: false,
            })
            .await
            .unwrap();
        channel.restore_connection();

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Reconnected);
        assert!(matches!(
            events.recv().await.unwrap(),
            ChannelEvent::Push(ServerEvent::BatchAccessUpdate { .. })
        ));
    }

    #[tokio::test]
    async fn emit_requires_authentication() {
        let (_backend, hub) = hub();
        let channel = hub.channel();
        let err = channel
            .emit(ClientEvent::SyncAccessRights {
                user_id: Identity::new("u1").unwrap(),
                force_refresh: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::Channel { .. }));
    }
}
