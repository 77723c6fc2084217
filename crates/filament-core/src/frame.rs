//! Logical wire frames.
//!
//! Frames are JSON objects tagged by a `type` field. Everything below the
//! frame (WebSocket framing, masking, TLS) belongs to the transport crates;
//! everything above it (handler dispatch, ack correlation) belongs to
//! [`crate::channel`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FilamentError;
use crate::ids::ConnectionId;

/// One logical frame on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    /// Handshake, sent by the accepting side once the transport is up.
    ///
    /// Carries the assigned connection id and the heartbeat parameters the
    /// initiating side must adopt.
    #[serde(rename_all = "camelCase")]
    Connect {
        /// Identity assigned to this connection.
        connection_id: ConnectionId,
        /// Time between pings, in milliseconds.
        ping_interval_ms: u64,
        /// Time to wait for liveness after a ping, in milliseconds.
        ping_timeout_ms: u64,
    },

    /// A named event with an ordered argument list.
    #[serde(rename_all = "camelCase")]
    Event {
        /// Event name.
        name: String,
        /// Arguments, delivered to handlers in this order.
        args: Vec<Value>,
        /// Correlation id when the sender expects an acknowledgment.
        #[serde(skip_serializing_if = "Option::is_none")]
        ack_id: Option<u64>,
    },

    /// Acknowledgment of a previously sent event.
    #[serde(rename_all = "camelCase")]
    Ack {
        /// Correlation id of the event being acknowledged.
        ack_id: u64,
        /// Arguments passed to the waiting callback, in order.
        args: Vec<Value>,
    },

    /// Liveness probe.
    Ping,

    /// Answer to a liveness probe.
    Pong,

    /// Graceful close announcement.
    #[serde(rename_all = "camelCase")]
    Disconnect {
        /// Human-readable reason the peer should report.
        reason: String,
    },
}

impl Frame {
    /// Build an event frame without an ack id.
    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Event {
            name: name.into(),
            args,
            ack_id: None,
        }
    }

    /// Build an event frame expecting an acknowledgment.
    pub fn event_with_ack(name: impl Into<String>, args: Vec<Value>, ack_id: u64) -> Self {
        Self::Event {
            name: name.into(),
            args,
            ack_id: Some(ack_id),
        }
    }

    /// Parse a frame from its JSON text form.
    pub fn parse(text: &str) -> Result<Self, FilamentError> {
        serde_json::from_str(text).map_err(|e| FilamentError::MalformedFrame(e.to_string()))
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, FilamentError> {
        serde_json::to_string(self).map_err(FilamentError::transport)
    }
}
