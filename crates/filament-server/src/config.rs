//! Server configuration.

use filament_core::HeartbeatConfig;
use serde::{Deserialize, Serialize};

/// Configuration for the Filament server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent connections; further upgrades are refused.
    pub max_connections: usize,
    /// Depth of each connection's outbound frame queue.
    pub send_queue_depth: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Heartbeat timing advertised to every client in the handshake.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 64,
            send_queue_depth: 256,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl ServerConfig {
    /// The `host:port` string to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
