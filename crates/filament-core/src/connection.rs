//! Per-connection identity, state machine, and outbound queue.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
// tokio's Instant so the heartbeat deadline follows the test clock.
use tokio::time::Instant;

use crate::config::HeartbeatConfig;
use crate::frame::Frame;
use crate::ids::ConnectionId;

/// Lifecycle state of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Transport is up, handshake not yet complete.
    Connecting = 0,
    /// Handshake complete; events may flow.
    Open = 1,
    /// Close initiated; no new events accepted.
    Closing = 2,
    /// Fully closed.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// One logical bidirectional connection.
///
/// Owns the identity, the state machine, the liveness clock, and the send
/// half of the bounded outbound frame queue. The receive half is drained by
/// the transport's writer task.
pub struct Connection {
    /// Unique connection id, assigned by the accepting side.
    pub id: ConnectionId,
    state: AtomicU8,
    tx: mpsc::Sender<Frame>,
    /// When any traffic was last received from the peer.
    last_activity: Mutex<Instant>,
    dropped_frames: AtomicU64,
    heartbeat: HeartbeatConfig,
}

impl Connection {
    /// Create a new connection in the `Connecting` state.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Frame>, heartbeat: HeartbeatConfig) -> Self {
        Self {
            id,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            tx,
            last_activity: Mutex::new(Instant::now()),
            dropped_frames: AtomicU64::new(0),
            heartbeat,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether events may currently flow.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Transition `Connecting → Open`.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn set_open(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Begin closing. Returns `true` only for the first caller, which makes
    /// close-side effects (ack cancellation, the `disconnected`
    /// notification) exactly-once.
    pub fn begin_close(&self) -> bool {
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current >= ConnectionState::Closing as u8 {
                return false;
            }
            if self
                .state
                .compare_exchange(
                    current,
                    ConnectionState::Closing as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Complete the transition to `Closed`.
    pub fn finish_close(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Enqueue a frame for transmission.
    ///
    /// Returns `false` if the queue is full or the writer is gone, and
    /// increments the dropped-frame counter.
    pub fn send(&self, frame: Frame) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total frames dropped on the outbound queue.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Record liveness (any traffic from the peer counts).
    pub fn mark_alive(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Duration since the last traffic from the peer (or establishment).
    pub fn last_activity_elapsed(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Negotiated heartbeat parameters.
    pub fn heartbeat(&self) -> &HeartbeatConfig {
        &self.heartbeat
    }
}
