//! Acknowledgment correlation.
//!
//! Each `emit_with_ack` stores its callback in a [`PendingAcks`] table keyed
//! by a generated correlation id. The matching `ack` frame removes and
//! invokes the callback. Closing the connection clears the table without
//! invoking anything: a callback runs iff the peer actually acked.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::connection::Connection;
use crate::error::FilamentError;
use crate::frame::Frame;

/// Callback waiting for an acknowledgment.
pub type AckCallback = Box<dyn FnOnce(Vec<Value>) + Send>;

/// Correlation-id table of callbacks awaiting acks.
///
/// Ids are monotonically increasing and unique for the lifetime of the
/// owning connection.
pub struct PendingAcks {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<u64, AckCallback>>,
}

impl PendingAcks {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            waiting: Mutex::new(HashMap::new()),
        }
    }

    /// Store a callback and return its fresh correlation id.
    pub fn add(&self, callback: AckCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.waiting.lock().insert(id, callback);
        id
    }

    /// Remove a pending entry without invoking it.
    pub fn remove(&self, ack_id: u64) -> bool {
        self.waiting.lock().remove(&ack_id).is_some()
    }

    /// Resolve a pending entry: remove it and invoke the callback with the
    /// peer's arguments.
    pub fn resolve(&self, ack_id: u64, args: Vec<Value>) -> Result<(), FilamentError> {
        let callback = self
            .waiting
            .lock()
            .remove(&ack_id)
            .ok_or(FilamentError::UnknownAckId(ack_id))?;
        // Invoke outside the lock; the callback may emit again.
        callback(args);
        Ok(())
    }

    /// Drop every pending entry without invoking it. Returns how many were
    /// discarded.
    pub fn clear(&self) -> usize {
        let mut waiting = self.waiting.lock();
        let count = waiting.len();
        waiting.clear();
        count
    }

    /// Number of callbacks currently waiting.
    pub fn len(&self) -> usize {
        self.waiting.lock().len()
    }

    /// Whether no callbacks are waiting.
    pub fn is_empty(&self) -> bool {
        self.waiting.lock().is_empty()
    }
}

impl Default for PendingAcks {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle given to event handlers for events that expect an acknowledgment.
///
/// Cloneable so every handler registered for the event name can see it, but
/// only the first `respond` call transmits; later calls are no-ops. Dropping
/// all clones without responding simply leaves the peer's callback pending
/// until its connection closes.
#[derive(Clone)]
pub struct AckResponder {
    ack_id: u64,
    connection: Arc<Connection>,
    responded: Arc<AtomicBool>,
}

impl AckResponder {
    /// Create a responder for the given correlation id.
    pub fn new(ack_id: u64, connection: Arc<Connection>) -> Self {
        Self {
            ack_id,
            connection,
            responded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Correlation id this responder answers.
    pub fn ack_id(&self) -> u64 {
        self.ack_id
    }

    /// Send the ack frame with the given arguments.
    ///
    /// Returns `true` if this call transmitted the ack. Returns `false` if
    /// an earlier call already responded or the outbound queue rejected the
    /// frame.
    pub fn respond(&self, args: Vec<Value>) -> bool {
        if self.responded.swap(true, Ordering::AcqRel) {
            warn!(ack_id = self.ack_id, "duplicate ack response ignored");
            return false;
        }
        self.connection.send(Frame::Ack {
            ack_id: self.ack_id,
            args,
        })
    }
}
