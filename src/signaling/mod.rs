//! Signaling subsystem
//!
//! This module maintains the session with the broadcast-control server:
//! - ConnectionState machine observed by the rest of the runtime
//! - SignalingSession with automatic reconnect and request correlation
//! - Wire protocol types for the request/response/event contract

pub mod protocol;
pub mod session;
pub mod state;

pub use protocol::{
    ClientMessage, Credentials, MediaKind, ResponseEnvelope, ServerEvent, ServerMessage,
    TrackDescriptor,
};
pub use session::{SignalingError, SignalingResult, SignalingSession};
pub use state::{ConnectionState, SessionEvent};
