// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON text frames: `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

use tollgate_core::{ClientEvent, Identity, ServerEvent, TollgateError};

/// Server events this client understands.
const KNOWN_SERVER_EVENTS: &[&str] = &[
    "questionSet:accessUpdate",
    "questionSet:batchAccessUpdate",
    "purchase:success",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateData<'a> {
    user_id: &'a str,
    token: &'a str,
}

#[derive(Serialize)]
struct OutgoingFrame<'a, T> {
    event: &'a str,
    data: T,
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
}

fn encode_error(err: serde_json::Error) -> TollgateError {
    TollgateError::Channel {
        message: "failed to encode frame".to_string(),
        source: Some(Box::new(err)),
    }
}

/// Frame sent after every (re)connect to bind the socket to an identity.
pub fn authenticate_frame(identity: &Identity, token: &str) -> Result<String, TollgateError> {
    serde_json::to_string(&OutgoingFrame {
        event: "authenticate",
        data: AuthenticateData {
            user_id: identity.as_str(),
            token,
        },
    })
    .map_err(encode_error)
}

pub fn encode_client_event(event: &ClientEvent) -> Result<String, TollgateError> {
    serde_json::to_string(event).map_err(encode_error)
}

/// Decodes a server frame.
///
/// Returns `Ok(None)` for well-formed frames carrying an event this client
/// does not handle (acknowledgements, errors, future additions).
pub fn decode_server_frame(text: &str) -> Result<Option<ServerEvent>, TollgateError> {
    let raw: RawFrame = serde_json::from_str(text).map_err(|e| TollgateError::Channel {
        message: "malformed frame".to_string(),
        source: Some(Box::new(e)),
    })?;
    if !KNOWN_SERVER_EVENTS.contains(&raw.event.as_str()) {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| TollgateError::Channel {
            message: format!("invalid `{}` payload", raw.event),
            source: Some(Box::new(e)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tollgate_core::ContentId;

    #[test]
    fn authenticate_frame_shape() {
        let frame = authenticate_frame(&Identity::new("u1").unwrap(), "tok").unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"event": "authenticate", "data": {"userId": "u1", "token": "tok"}})
        );
    }

    #[test]
    fn decodes_access_update() {
        let event = decode_server_frame(
            r#"{"event":"questionSet:accessUpdate","data":{"questionSetId":"Q1","hasAccess":true,"remainingDays":30}}"#,
        )
        .unwrap()
        .unwrap();
        match event {
            ServerEvent::AccessUpdate(update) => {
                assert_eq!(update.content_id, ContentId::new("q1"));
                assert!(update.has_access);
                assert_eq!(update.remaining_days, Some(30));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn ignores_unhandled_events() {
        assert!(
            decode_server_frame(r#"{"event":"authenticated","data":{"ok":true}}"#)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn rejects_garbage_and_bad_payloads() {
        assert!(decode_server_frame("not json").is_err());
        assert!(decode_server_frame(r#"{"event":"purchase:success","data":{"nope":1}}"#).is_err());
    }
}
