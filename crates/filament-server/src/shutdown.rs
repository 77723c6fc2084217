//! Shutdown sequencing for a running server.
//!
//! Every session watches a child of the coordinator's `CancellationToken`,
//! and the accept loop watches the token itself. A graceful stop announces
//! the close to every connected client before anything is cancelled, so
//! clients observe reason `"server namespace disconnect"` instead of a bare
//! transport drop.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::ConnectionRegistry;

/// Default wait for the accept loop to drain after cancellation.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the shutdown sequence: announce, cancel, drain.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A clone of the cancellation token for tasks to watch.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown to every watcher without announcing to clients.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Graceful stop.
    ///
    /// Sends a `disconnect` frame with reason `"server namespace disconnect"`
    /// to every client in `registry` and closes their channels, then cancels
    /// the token and waits up to `timeout` for the accept loop (`server`) to
    /// drain. A loop still running after the timeout is left to the runtime.
    pub async fn shutdown_gracefully(
        &self,
        registry: &ConnectionRegistry,
        server: Option<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        let clients = registry.count().await;
        registry.disconnect_all().await;
        info!(clients, "close announced, stopping");

        self.token.cancel();

        if let Some(server) = server {
            if tokio::time::timeout(timeout, server).await.is_err() {
                warn!("accept loop still draining after {timeout:?}");
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
