//! Liveness loops.
//!
//! The accepting side runs [`run_heartbeat`]: every interval it checks
//! whether the peer has been heard from within `interval + timeout` and, if
//! the connection is still live, sends a `ping` frame. The connecting side
//! runs [`run_watchdog`], which applies the same deadline check but sends
//! nothing; it relies on answering the peer's pings to prove its own
//! liveness.
//!
//! Any inbound frame refreshes the activity clock, so a chatty peer never
//! needs a ping exchange to stay alive.

use std::sync::Arc;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::frame::Frame;

/// Why a liveness loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The peer went silent past the deadline.
    TimedOut,
    /// The loop was cancelled (connection shut down for another reason).
    Cancelled,
}

/// Active pinger loop. Runs until cancellation or a liveness failure.
pub async fn run_heartbeat(
    connection: Arc<Connection>,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = interval(connection.heartbeat().interval());
    // First tick fires immediately; skip it so the first ping lands one
    // interval after establishment.
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {
                if expired(&connection) {
                    return HeartbeatResult::TimedOut;
                }
                if !connection.send(Frame::Ping) {
                    debug!(connection_id = %connection.id, "ping not enqueued");
                }
            }
        }
    }
}

/// Passive watchdog loop. Same deadline as [`run_heartbeat`] but never
/// sends pings of its own.
pub async fn run_watchdog(
    connection: Arc<Connection>,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = interval(connection.heartbeat().interval());
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            _ = ticker.tick() => {
                if expired(&connection) {
                    return HeartbeatResult::TimedOut;
                }
            }
        }
    }
}

fn expired(connection: &Connection) -> bool {
    let elapsed = connection.last_activity_elapsed();
    if elapsed > connection.heartbeat().deadline() {
        warn!(
            connection_id = %connection.id,
            elapsed_ms = elapsed.as_millis() as u64,
            "peer silent past heartbeat deadline"
        );
        metrics::counter!("filament_heartbeat_timeouts_total").increment(1);
        true
    } else {
        false
    }
}
