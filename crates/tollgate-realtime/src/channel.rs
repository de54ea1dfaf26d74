// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket implementation of [`UpdateChannel`].
//!
//! One background task owns the socket for the authenticated identity. It:
//! 1. Connects, sends the `authenticate` frame, publishes `Reconnected`
//! 2. Forwards queued client events and decodes server pushes
//! 3. On any socket failure publishes `Disconnected` and reconnects with
//!    exponential backoff
//!
//! Client events emitted while the socket is down stay queued and are sent
//! after the next successful authentication.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tollgate_config::model::RealtimeConfig;
use tollgate_core::{ChannelEvent, ClientEvent, Identity, TollgateError, UpdateChannel};

use crate::frame::{authenticate_frame, decode_server_frame, encode_client_event};

const EVENT_BUFFER: usize = 256;

/// Delay schedule between reconnect attempts.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl ReconnectPolicy {
    fn next(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

struct Connection {
    identity: Identity,
    outgoing: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

pub struct WsUpdateChannel {
    url: String,
    policy: ReconnectPolicy,
    events: broadcast::Sender<ChannelEvent>,
    connection: Mutex<Option<Connection>>,
}

impl WsUpdateChannel {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            url: url.into(),
            policy,
            events,
            connection: Mutex::new(None),
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(
            config.url.clone(),
            ReconnectPolicy {
                initial: Duration::from_millis(config.reconnect_delay_ms),
                max: Duration::from_millis(config.max_reconnect_delay_ms),
            },
        )
    }

    /// Identity the socket is currently bound to, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.lock().as_ref().map(|c| c.identity.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Connection>> {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_connection(&self) -> Option<Connection> {
        self.lock().take()
    }
}

#[async_trait]
impl UpdateChannel for WsUpdateChannel {
    async fn authenticate(
        &self,
        identity: &Identity,
        credential: &SecretString,
    ) -> Result<(), TollgateError> {
        if let Some(previous) = self.take_connection() {
            previous.shutdown.cancel();
            let _ = previous.task.await;
        }

        let auth = authenticate_frame(identity, credential.expose_secret())?;
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_socket(
            self.url.clone(),
            auth,
            self.policy,
            outgoing_rx,
            self.events.clone(),
            shutdown.clone(),
        ));

        info!(identity = %identity, url = %self.url, "realtime channel bound to identity");
        *self.lock() = Some(Connection {
            identity: identity.clone(),
            outgoing,
            shutdown,
            task,
        });
        Ok(())
    }

    async fn emit(&self, event: ClientEvent) -> Result<(), TollgateError> {
        let frame = encode_client_event(&event)?;
        let guard = self.lock();
        let connection = guard.as_ref().ok_or_else(|| TollgateError::Channel {
            message: "channel is not authenticated".to_string(),
            source: None,
        })?;
        connection
            .outgoing
            .send(frame)
            .map_err(|_| TollgateError::Channel {
                message: "connection task has stopped".to_string(),
                source: None,
            })?;
        debug!(event = event.name(), "queued client event");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    async fn disconnect(&self) -> Result<(), TollgateError> {
        if let Some(connection) = self.take_connection() {
            connection.shutdown.cancel();
            let _ = connection.task.await;
            info!(identity = %connection.identity, "realtime channel disconnected");
        }
        Ok(())
    }
}

impl Drop for WsUpdateChannel {
    fn drop(&mut self) {
        if let Some(connection) = self.take_connection() {
            connection.shutdown.cancel();
        }
    }
}

/// Why a connected session ended.
enum SessionEnd {
    Shutdown,
    Lost,
}

async fn run_socket(
    url: String,
    auth: String,
    policy: ReconnectPolicy,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    events: broadcast::Sender<ChannelEvent>,
    shutdown: CancellationToken,
) {
    let mut delay = policy.initial;

    loop {
        let connected = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((socket, _response)) => {
                let (mut sink, mut stream) = socket.split();
                if let Err(e) = sink.send(Message::Text(auth.clone().into())).await {
                    warn!(error = %e, "failed to authenticate realtime channel");
                } else {
                    info!(url = %url, "realtime channel connected");
                    delay = policy.initial;
                    let _ = events.send(ChannelEvent::Reconnected);

                    let end = loop {
                        tokio::select! {
                            biased;
                            _ = shutdown.cancelled() => {
                                let _ = sink.send(Message::Close(None)).await;
                                break SessionEnd::Shutdown;
                            }
                            frame = outgoing.recv() => match frame {
                                Some(text) => {
                                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                                        warn!(error = %e, "failed to send client event");
                                        break SessionEnd::Lost;
                                    }
                                }
                                None => break SessionEnd::Shutdown,
                            },
                            incoming = stream.next() => match incoming {
                                Some(Ok(Message::Text(text))) => handle_text(text.as_str(), &events),
                                Some(Ok(Message::Close(_))) | None => {
                                    debug!("server closed realtime channel");
                                    break SessionEnd::Lost;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    debug!(error = %e, "realtime channel error");
                                    break SessionEnd::Lost;
                                }
                            },
                        }
                    };

                    let _ = events.send(ChannelEvent::Disconnected);
                    if matches!(end, SessionEnd::Shutdown) {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "realtime channel connect failed, retrying"
                );
            }
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = policy.next(delay);
    }
}

fn handle_text(text: &str, events: &broadcast::Sender<ChannelEvent>) {
    match decode_server_frame(text) {
        Ok(Some(event)) => {
            debug!(?event, "server push received");
            let _ = events.send(ChannelEvent::Push(event));
        }
        Ok(None) => debug!("ignoring unhandled server event"),
        Err(e) => warn!(error = %e, "dropping malformed server frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_doubles_up_to_cap() {
        let policy = ReconnectPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(350),
        };
        let mut delay = policy.initial;
        let mut seen = vec![delay];
        for _ in 0..3 {
            delay = policy.next(delay);
            seen.push(delay);
        }
        assert_eq!(
            seen,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(350),
                Duration::from_millis(350),
            ]
        );
    }

    #[tokio::test]
    async fn emit_without_authentication_fails() {
        let channel = WsUpdateChannel::new("ws://127.0.0.1:9/ws", ReconnectPolicy::default());
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
