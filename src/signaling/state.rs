//! Signaling connection state
//!
//! Defines the connection state machine observed by the rest of the runtime.

use serde::{Deserialize, Serialize};

/// Current state of the signaling connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection, no retry in flight
    Disconnected,
    /// Connection attempt or automatic reconnect in flight
    Connecting,
    /// Handshake confirmed, requests may be issued
    Connected,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Events emitted by the signaling session
///
/// Fan-out uses a broadcast channel; the receiver returned by
/// [`subscribe`](super::SignalingSession::subscribe) is the subscription
/// handle, and dropping it is the only way to stop receiving events.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Connection state transition
    StateChanged(ConnectionState),
    /// Automatic reconnect attempt number (1-based within a cycle)
    ReconnectAttempt(u32),
    /// A reconnect attempt failed; retry continues
    ReconnectError(String),
    /// The transport dropped; media producers bound to it are now invalid
    /// and must be released by the consumer.
    TransportLost,
    /// Server-pushed event, with the ack id to answer through
    /// [`ack_event`](super::SignalingSession::ack_event) when present
    Server {
        ack_id: Option<u64>,
        event: super::protocol::ServerEvent,
    },
}
