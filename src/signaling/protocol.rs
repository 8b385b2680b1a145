//! Signaling wire protocol
//!
//! JSON message types exchanged with the broadcast-control server over the
//! persistent websocket. Every client request resolves to a single
//! [`ResponseEnvelope`]; server pushes arrive as [`ServerEvent`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Credentials attached to the handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Stable per-installation client id
    pub client_id: String,
    pub alias: String,
    pub user_id: String,
    pub token: String,
}

/// Uniform response envelope for every request and acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ResponseEnvelope {
    pub fn ok(payload: Option<Value>) -> Self {
        Self {
            success: true,
            code: None,
            msg: None,
            payload,
        }
    }

    pub fn fail(code: Option<i64>, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            msg: Some(msg.into()),
            payload: None,
        }
    }
}

/// Media kind of a published track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Logical track offered in a readiness confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDescriptor {
    /// classId of the backing device
    pub track_id: String,
    pub kind: MediaKind,
}

/// Messages sent by the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Handshake {
        #[serde(flatten)]
        credentials: Credentials,
    },
    Request {
        id: u64,
        name: String,
        payload: Value,
    },
    /// Acknowledgement for a server event that requested one
    #[serde(rename_all = "camelCase")]
    EventAck {
        ack_id: u64,
        #[serde(flatten)]
        envelope: ResponseEnvelope,
    },
}

/// Messages received from the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    HandshakeAck {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
    },
    Response {
        id: u64,
        #[serde(flatten)]
        envelope: ResponseEnvelope,
    },
    #[serde(rename_all = "camelCase")]
    Event {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack_id: Option<u64>,
        #[serde(flatten)]
        event: ServerEvent,
    },
}

/// Server-initiated instructions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    RequestStartBroadcast {
        track_ids: Vec<String>,
        /// Transport parameters for the media layer, treated as opaque
        transport: Value,
        router_rtp_capabilities: Value,
    },
    RequestStopBroadcast,
    #[serde(rename_all = "camelCase")]
    ReplayRequest {
        track_id: String,
        start_time: f64,
        end_time: f64,
    },
    #[serde(rename_all = "camelCase")]
    StopReplayRequest { track_id: String },
}
