//! Registry of live connections.

use std::collections::HashMap;
use std::sync::Arc;

use filament_core::{ConnectionId, EventChannel, Frame, reason};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// All currently connected clients, indexed by connection id.
pub struct ConnectionRegistry {
    channels: RwLock<HashMap<ConnectionId, Arc<EventChannel>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Add a channel.
    pub async fn add(&self, channel: Arc<EventChannel>) {
        let id = channel.connection().id.clone();
        let mut channels = self.channels.write().await;
        let _ = channels.insert(id, channel);
    }

    /// Remove a channel by connection id.
    pub async fn remove(&self, id: &ConnectionId) {
        let mut channels = self.channels.write().await;
        let _ = channels.remove(id);
    }

    /// Look up a channel by connection id.
    pub async fn get(&self, id: &ConnectionId) -> Option<Arc<EventChannel>> {
        self.channels.read().await.get(id).cloned()
    }

    /// Number of live connections.
    pub async fn count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Emit an event to one connection.
    ///
    /// Returns `false` if the connection is unknown or the emit failed.
    pub async fn emit_to(&self, id: &ConnectionId, name: &str, args: Vec<Value>) -> bool {
        let Some(channel) = self.get(id).await else {
            debug!(connection_id = %id, "emit to unknown connection");
            return false;
        };
        if let Err(err) = channel.emit(name, args) {
            warn!(connection_id = %id, name, %err, "emit failed");
            return false;
        }
        true
    }

    /// Disconnect one client: announce the close on the wire, then close the
    /// channel with reason `"server namespace disconnect"`.
    ///
    /// Returns `false` if the connection is unknown.
    pub async fn disconnect(&self, id: &ConnectionId) -> bool {
        let Some(channel) = self.get(id).await else {
            return false;
        };
        let _ = channel.connection().send(Frame::Disconnect {
            reason: reason::SERVER_DISCONNECT.into(),
        });
        let _ = channel.close(reason::SERVER_DISCONNECT);
        true
    }

    /// Disconnect every client. Used during shutdown.
    pub async fn disconnect_all(&self) {
        let channels: Vec<_> = self.channels.read().await.values().cloned().collect();
        for channel in channels {
            let _ = channel.connection().send(Frame::Disconnect {
                reason: reason::SERVER_DISCONNECT.into(),
            });
            let _ = channel.close(reason::SERVER_DISCONNECT);
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
