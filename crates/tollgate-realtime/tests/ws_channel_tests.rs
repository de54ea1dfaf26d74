// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket channel against a local tungstenite server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use tollgate_core::{ChannelEvent, ClientEvent, ContentId, Identity, ServerEvent, UpdateChannel};
use tollgate_realtime::{ReconnectPolicy, WsUpdateChannel};

const WAIT: Duration = Duration::from_secs(5);

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        initial: Duration::from_millis(20),
        max: Duration::from_millis(100),
    }
}

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let msg = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn next_event(rx: &mut broadcast::Receiver<ChannelEvent>) -> ChannelEvent {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn authenticates_forwards_events_and_receives_pushes() {
    let (listener, url) = listen().await;
    let channel = WsUpdateChannel::new(url, fast_policy());
    let mut events = channel.subscribe();
    let user = Identity::new("u1").unwrap();

    channel
        .authenticate(&user, &SecretString::from("secret-token"))
        .await
        .unwrap();
    let mut server = accept(&listener).await;

    let auth = next_json(&mut server).await;
    assert_eq!(
        auth,
        json!({"event": "authenticate", "data": {"userId": "u1", "token": "secret-token"}})
    );
    assert_eq!(next_event(&mut events).await, ChannelEvent::Reconnected);

    channel
        .emit(ClientEvent::CheckAccess {
            user_id: user.clone(),
            content_id: ContentId::new("Q1"),
        })
        .await
        .unwrap();
    let emitted = next_json(&mut server).await;
    assert_eq!(emitted["event"], "questionSet:checkAccess");
    // Frames carry the id as issued; equality elsewhere stays case-insensitive.
    assert_eq!(emitted["data"]["questionSetId"], "Q1");

    server
        .send(Message::Text(
            json!({
                "event": "questionSet:accessUpdate",
                "data": {"questionSetId": "q1", "hasAccess": true, "remainingDays": 30}
            })
            .to_string()
            .into(),
        ))
        .await
        .unwrap();
    match next_event(&mut events).await {
        ChannelEvent::Push(ServerEvent::AccessUpdate(update)) => {
            assert_eq!(update.content_id, ContentId::new("q1"));
            assert_eq!(update.remaining_days, Some(30));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    channel.disconnect().await.unwrap();
    assert_eq!(next_event(&mut events).await, ChannelEvent::Disconnected);
    assert!(channel.identity().is_none());
}

#[tokio::test]
async fn reconnects_and_reauthenticates_after_drop() {
    let (listener, url) = listen().await;
    let channel = WsUpdateChannel::new(url, fast_policy());
    let mut events = channel.subscribe();
    let user = Identity::new("u1").unwrap();

    channel
        .authenticate(&user, &SecretString::from("tok"))
        .await
        .unwrap();
    let mut first = accept(&listener).await;
    assert_eq!(next_json(&mut first).await["event"], "authenticate");
    assert_eq!(next_event(&mut events).await, ChannelEvent::Reconnected);

    drop(first);
    assert_eq!(next_event(&mut events).await, ChannelEvent::Disconnected);

    let mut second = accept(&listener).await;
    let auth = next_json(&mut second).await;
    assert_eq!(auth["data"]["userId"], "u1");
    assert_eq!(next_event(&mut events).await, ChannelEvent::Reconnected);

    channel.disconnect().await.unwrap();
}

#[tokio::test]
async fn events_emitted_while_offline_are_delivered_after_connect() {
    let (listener, url) = listen().await;
    let channel = WsUpdateChannel::new(url, fast_policy());
    let user = Identity::new("u2").unwrap();

    channel
        .authenticate(&user, &SecretString::from("tok"))
        .await
        .unwrap();
    channel
        .emit(ClientEvent::SyncAccessRights {
            user_id: user.clone(),
            force_refresh: true,
        })
        .await
        .unwrap();

    let mut server = accept(&listener).await;
    assert_eq!(next_json(&mut server).await["event"], "authenticate");
    let sync = next_json(&mut server).await;
    assert_eq!(sync["event"], "user:syncAccessRights");
    assert_eq!(sync["data"]["forceRefresh"], true);

    channel.disconnect().await.unwrap();
}
