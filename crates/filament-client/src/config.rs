//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the Filament client.
///
/// Heartbeat timing is not configured here; the client adopts whatever the
/// server advertises in the `connect` handshake.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// How long to wait for the server's handshake, in milliseconds.
    pub handshake_timeout_ms: u64,
    /// Depth of the outbound frame queue.
    pub send_queue_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 5_000,
            send_queue_depth: 256,
        }
    }
}

impl ClientConfig {
    /// Handshake timeout as a [`Duration`].
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.handshake_timeout_ms, 5_000);
        assert_eq!(cfg.send_queue_depth, 256);
        assert_eq!(cfg.handshake_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ClientConfig {
            handshake_timeout_ms: 100,
            send_queue_depth: 8,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.handshake_timeout_ms, 100);
        assert_eq!(back.send_queue_depth, 8);
    }
}
