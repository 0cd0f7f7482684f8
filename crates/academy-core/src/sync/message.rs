//! Remote wire formats
//!
//! REST rows for get-by-id / upsert-by-id, and the realtime channel frames
//! used to subscribe to update events for the shared document.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snapshot::Snapshot;

/// Realtime protocol version sent in the socket URL
pub const REALTIME_VSN: &str = "1.0.0";

/// Topic used for socket-level frames such as heartbeats
pub const PHOENIX_TOPIC: &str = "phoenix";

/// A row of the remote state table as returned by get-by-id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRow {
    pub id: String,
    #[serde(default)]
    pub data: Value,
}

/// Body of an upsert-by-id request
#[derive(Debug, Serialize)]
pub struct UpsertRow<'a> {
    pub id: &'a str,
    pub data: &'a Snapshot,
}

/// Inbound update event for the shared document
///
/// Only `data` is consumed; `id` is checked against the fixed key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub id: String,
    #[serde(default)]
    pub data: Value,
}

/// Frames sent to the realtime socket
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum ClientFrame {
    /// Join a channel
    #[serde(rename = "phx_join")]
    Join {
        topic: String,
        payload: JoinPayload,
        #[serde(rename = "ref")]
        reference: String,
        join_ref: String,
    },

    /// Keep-alive
    #[serde(rename = "heartbeat")]
    Heartbeat {
        topic: String,
        payload: serde_json::Map<String, Value>,
        #[serde(rename = "ref")]
        reference: String,
    },
}

/// Join request payload
#[derive(Debug, Clone, Serialize)]
pub struct JoinPayload {
    pub config: ChannelConfig,
    pub access_token: String,
}

/// Channel configuration requesting row change events
#[derive(Debug, Clone, Serialize)]
pub struct ChannelConfig {
    pub broadcast: BroadcastConfig,
    pub presence: PresenceConfig,
    pub postgres_changes: Vec<ChangeFilter>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BroadcastConfig {
    #[serde(rename = "self")]
    pub echo_self: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PresenceConfig {
    pub key: String,
}

/// Row change filter: one table, one row
#[derive(Debug, Clone, Serialize)]
pub struct ChangeFilter {
    pub event: String,
    pub schema: String,
    pub table: String,
    pub filter: String,
}

/// Frames received from the realtime socket
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event")]
pub enum ServerFrame {
    /// Reply to a join or heartbeat
    #[serde(rename = "phx_reply")]
    Reply { topic: String, payload: ReplyPayload },

    /// Row change event
    #[serde(rename = "postgres_changes")]
    Changes { topic: String, payload: ChangesPayload },

    /// Channel error
    #[serde(rename = "phx_error")]
    Error {
        topic: String,
        #[serde(default)]
        payload: Value,
    },

    /// Channel closed by the server
    #[serde(rename = "phx_close")]
    Close { topic: String },

    /// Presence, system and other frames we don't act on
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyPayload {
    pub status: String,
    #[serde(default)]
    pub response: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangesPayload {
    pub data: ChangeData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeData {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub record: Option<Value>,
}

impl ClientFrame {
    /// Join the channel for row changes of `table` filtered to `document_key`
    pub fn join(table: &str, document_key: &str, access_token: &str, reference: u64) -> Self {
        ClientFrame::Join {
            topic: channel_topic(table),
            payload: JoinPayload {
                config: ChannelConfig {
                    broadcast: BroadcastConfig::default(),
                    presence: PresenceConfig::default(),
                    postgres_changes: vec![ChangeFilter {
                        event: "*".to_string(),
                        schema: "public".to_string(),
                        table: table.to_string(),
                        filter: format!("id=eq.{}", document_key),
                    }],
                },
                access_token: access_token.to_string(),
            },
            reference: reference.to_string(),
            join_ref: reference.to_string(),
        }
    }

    /// Socket heartbeat
    pub fn heartbeat(reference: u64) -> Self {
        ClientFrame::Heartbeat {
            topic: PHOENIX_TOPIC.to_string(),
            payload: serde_json::Map::new(),
            reference: reference.to_string(),
        }
    }

    /// Encode to JSON text
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerFrame {
    /// Decode from JSON text
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl ChangesPayload {
    /// Extract the change notification carried by this event
    ///
    /// Deletes carry no record and yield `None`.
    pub fn notification(&self) -> Option<Result<ChangeNotification, serde_json::Error>> {
        let record = self.data.record.clone()?;
        Some(serde_json::from_value(record))
    }
}

/// Channel topic for a table
pub fn channel_topic(table: &str) -> String {
    format!("realtime:{}", table)
}
