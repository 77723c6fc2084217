//! Upward-facing notifications.
//!
//! The embedder receives lifecycle and traffic notifications on a bounded
//! mpsc channel. Delivery is best-effort: a slow consumer drops
//! notifications rather than blocking the dispatch path.

use serde_json::Value;

use crate::ids::ConnectionId;

/// Default depth of the notification queue.
pub const NOTIFY_QUEUE_DEPTH: usize = 1024;

/// One observable transition or traffic item on a connection.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// A connection completed its handshake.
    Connected {
        /// Identity of the new connection.
        connection_id: ConnectionId,
    },
    /// A connection closed. Delivered exactly once per connection.
    Disconnected {
        /// Identity of the closed connection.
        connection_id: ConnectionId,
        /// Human-readable reason, e.g. `"transport close"`.
        reason: String,
    },
    /// An event frame arrived.
    Event {
        /// Connection the event arrived on.
        connection_id: ConnectionId,
        /// Event name.
        name: String,
        /// Arguments in wire order.
        args: Vec<Value>,
    },
    /// An ack frame arrived.
    Ack {
        /// Connection the ack arrived on.
        connection_id: ConnectionId,
        /// Correlation id being acknowledged.
        ack_id: u64,
        /// Ack arguments in wire order.
        args: Vec<Value>,
    },
}

impl Notification {
    /// The connection this notification belongs to.
    pub fn connection_id(&self) -> &ConnectionId {
        match self {
            Self::Connected { connection_id }
            | Self::Disconnected { connection_id, .. }
            | Self::Event { connection_id, .. }
            | Self::Ack { connection_id, .. } => connection_id,
        }
    }
}
