//! Error taxonomy for the Filament channel.
//!
//! The variants split along recovery boundaries:
//!
//! - [`FilamentError::Transport`] is fatal to the listen/connect attempt and
//!   surfaced to the caller.
//! - [`FilamentError::MalformedFrame`] and [`FilamentError::UnknownAckId`]
//!   are logged and dropped by the dispatch path; they never cross a
//!   connection boundary.
//! - [`FilamentError::ConnectionClosed`] and [`FilamentError::SendQueueFull`]
//!   are emit-side failures on a dead or backed-up channel.
//!
//! A heartbeat expiry is not an error value: the liveness loops report it as
//! [`HeartbeatResult::TimedOut`](crate::heartbeat::HeartbeatResult) and the
//! channel closes with reason `"ping timeout"`.

use thiserror::Error;

/// All failures the channel core can report.
#[derive(Debug, Error)]
pub enum FilamentError {
    /// Listen, connect, or handshake failure. Fatal to that attempt.
    #[error("transport error: {0}")]
    Transport(String),

    /// An incoming frame could not be parsed. Dropped, never propagated.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// An ack frame referenced a correlation id with no pending entry.
    #[error("unknown ack id {0}")]
    UnknownAckId(u64),

    /// Emit was attempted on a connection that is closing or closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// The bounded outbound queue rejected the frame.
    #[error("send queue full")]
    SendQueueFull,
}

impl FilamentError {
    /// Wrap an arbitrary transport-layer error.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}
