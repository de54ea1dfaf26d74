// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel used when `realtime.enabled = false`.

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::broadcast;
use tracing::trace;

use tollgate_core::{ChannelEvent, ClientEvent, Identity, TollgateError, UpdateChannel};

/// Accepts every event and never delivers a push.
pub struct OfflineChannel {
    events: broadcast::Sender<ChannelEvent>,
}

impl OfflineChannel {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1);
        Self { events }
    }
}

impl Default for OfflineChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpdateChannel for OfflineChannel {
    async fn authenticate(&self, _identity: &Identity, _credential: &SecretString) -> Result<(), TollgateError> {
        Ok(())
    }

    async fn emit(&self, event: ClientEvent) -> Result<(), TollgateError> {
        trace!(event = event.name(), "realtime disabled, dropping client event");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    async fn disconnect(&self) -> Result<(), TollgateError> {
        Ok(())
    }
}
