//! Heartbeat configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Liveness probe timing for one connection.
///
/// The accepting side sends a `ping` frame every `heartbeat_interval_ms`.
/// Either side considers the peer dead once no traffic has arrived for
/// `heartbeat_interval_ms + heartbeat_timeout_ms` and closes the connection
/// with reason `"ping timeout"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Time between pings, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Time to wait for liveness after a ping, in milliseconds.
    pub heartbeat_timeout_ms: u64,
}

impl HeartbeatConfig {
    /// Ping interval as a [`Duration`].
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Liveness timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Full window after which a silent peer is considered dead.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.interval() + self.timeout()
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 25_000,
            heartbeat_timeout_ms: 20_000,
        }
    }
}
