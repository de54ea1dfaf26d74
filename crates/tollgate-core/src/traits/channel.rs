// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time update channel trait.

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::broadcast;

use crate::error::TollgateError;
use crate::events::{ChannelEvent, ClientEvent};
use crate::types::Identity;

/// Bidirectional push channel shared by every session of an identity.
#[async_trait]
pub trait UpdateChannel: Send + Sync {
    /// Authenticates `identity` on the channel. Implementations remember the
    /// identity and re-authenticate it on every reconnect.
    async fn authenticate(
        &self,
        identity: &Identity,
        credential: &SecretString,
    ) -> Result<(), TollgateError>;

    /// Sends a client event to the server.
    async fn emit(&self, event: ClientEvent) -> Result<(), TollgateError>;

    /// Subscribes to pushes and connection lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;

    /// Forgets the authenticated identity and closes the connection.
    async fn disconnect(&self) -> Result<(), TollgateError>;
}
