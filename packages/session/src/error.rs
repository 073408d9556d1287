//! Error types of the session core.
//!
//! None of these are fatal to the hosting process. Transport errors feed the
//! reconnect policy, protocol errors are logged and dropped, adapter errors are
//! surfaced once to the user.

use thiserror::Error;

/// Session store and lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("not in a room")]
    NotInRoom,

    #[error("room id must not be empty")]
    RoomIdEmpty,

    #[error("room id is too long ({0} characters)")]
    RoomIdTooLong(usize),

    #[error("room id contains invalid character '{0}'")]
    RoomIdInvalidCharacter(char),

    #[error("only the host can do this")]
    NotHost,

    #[error("the session has stopped")]
    Stopped,
}

/// Peer transport errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The requested local identity is already taken
    #[error("peer id '{0}' is unavailable")]
    IdUnavailable(String),

    /// The remote identity is not registered
    #[error("peer '{0}' is unavailable")]
    PeerUnavailable(String),

    #[error("no open connection to '{0}'")]
    NotConnected(String),

    #[error("transport is closed")]
    Closed,

    #[error("network error: {0}")]
    Network(String),
}

/// Inbound payload problems. Always logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload has no type discriminator")]
    MissingType,

    #[error("unknown command type '{0}'")]
    UnknownType(String),

    #[error("malformed '{kind}' command: {reason}")]
    Malformed { kind: String, reason: String },

    #[error("failed to encode command: {0}")]
    Encode(String),
}

/// Video control adapter errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The environment refused to start playback without a user gesture
    #[error("autoplay was blocked")]
    AutoplayBlocked,

    #[error("no media element available")]
    NoMedia,

    #[error("player bridge is gone")]
    BridgeClosed,
}
