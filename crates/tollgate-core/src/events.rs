// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time channel event vocabulary.
//!
//! Frames on the wire are JSON objects of the form
//! `{"event": "<name>", "data": {...}}`. Client events flow to the server,
//! server events are pushed to every session of an identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ContentId, Identity};

/// Client -> server events (authentication is handled by the channel itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "questionSet:checkAccess", rename_all = "camelCase")]
    CheckAccess {
        user_id: Identity,
        #[serde(rename = "questionSetId")]
        content_id: ContentId,
    },

    #[serde(rename = "questionSet:checkAccessBatch", rename_all = "camelCase")]
    CheckAccessBatch {
        user_id: Identity,
        #[serde(rename = "questionSetIds")]
        content_ids: Vec<ContentId>,
    },

    #[serde(rename = "user:syncAccessRights", rename_all = "camelCase")]
    SyncAccessRights { user_id: Identity, force_refresh: bool },
}

impl ClientEvent {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::CheckAccess { .. } => "questionSet:checkAccess",
            ClientEvent::CheckAccessBatch { .. } => "questionSet:checkAccessBatch",
            ClientEvent::SyncAccessRights { .. } => "user:syncAccessRights",
        }
    }
}

/// One access change pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessUpdate {
    #[serde(rename = "questionSetId", alias = "contentId")]
    pub content_id: ContentId,
    pub has_access: bool,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remaining_days: Option<i64>,
}

/// Server -> client push events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "questionSet:accessUpdate")]
    AccessUpdate(AccessUpdate),

    #[serde(rename = "questionSet:batchAccessUpdate")]
    BatchAccessUpdate { updates: Vec<AccessUpdate> },

    #[serde(rename = "purchase:success", rename_all = "camelCase")]
    PurchaseSuccess {
        #[serde(rename = "questionSetId", alias = "contentId")]
        content_id: ContentId,
        #[serde(default)]
        expiry_date: Option<DateTime<Utc>>,
    },
}

/// Events delivered to local subscribers of an update channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A decoded server push.
    Push(ServerEvent),
    /// The connection was re-established and re-authenticated.
    Reconnected,
    /// The connection dropped; pushes may be missed until `Reconnected`.
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_wire_format() {
        let event = ClientEvent::CheckAccessBatch {
            user_id: Identity::new("u1").unwrap(),
            content_ids: vec![ContentId::new("q1"), ContentId::new("q2")],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "questionSet:checkAccessBatch",
                "data": {"userId": "u1", "questionSetIds": ["q1", "q2"]}
            })
        );
    }

    #[test]
    fn sync_event_wire_format() {
        let event = ClientEvent::SyncAccessRights {
            user_id: Identity::new("u1").unwrap(),
            force_refresh: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "user:syncAccessRights");
        assert_eq!(json["data"]["forceRefresh"], true);
        assert_eq!(event.name(), "user:syncAccessRights");
    }

    #[test]
    fn server_events_parse() {
        let single = r#"{"event":"questionSet:accessUpdate","data":{"questionSetId":"Q1","hasAccess":true,"expiryDate":"2026-03-01T00:00:00Z"}}"#;
        match serde_json::from_str::<ServerEvent>(single).unwrap() {
            ServerEvent::AccessUpdate(update) => {
                assert_eq!(update.content_id.as_str(), "q1");
                assert!(update.has_access);
                assert!(update.expiry_date.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let batch = r#"{"event":"questionSet:batchAccessUpdate","data":{"updates":[{"questionSetId":"a","hasAccess":false},{"questionSetId":"b","hasAccess":true,"remainingDays":4}]}}"#;
        match serde_json::from_str::<ServerEvent>(batch).unwrap() {
            ServerEvent::BatchAccessUpdate { updates } => {
                assert_eq!(updates.len(), 2);
                assert_eq!(updates[1].remaining_days, Some(4));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let purchase = r#"{"event":"purchase:success","data":{"questionSetId":"Q9"}}"#;
        assert!(matches!(
            serde_json::from_str::<ServerEvent>(purchase).unwrap(),
            ServerEvent::PurchaseSuccess { expiry_date: None, .. }
        ));
    }

    #[test]
    fn unknown_server_event_is_rejected() {
        let frame = r#"{"event":"chat:message","data":{}}"#;
        assert!(serde_json::from_str::<ServerEvent>(frame).is_err());
    }
}
