//! `FilamentServer` — Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use filament_core::notify::NOTIFY_QUEUE_DEPTH;
use filament_core::{ConnectionId, EventChannel, FilamentError, Notification};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::registry::ConnectionRegistry;
use crate::session::run_session;
use crate::shutdown::ShutdownCoordinator;

/// Callback run for each accepted connection, before any frame is
/// dispatched. Register event handlers here.
pub type ConnectionCallback = dyn Fn(&Arc<EventChannel>) + Send + Sync;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Sink for lifecycle and traffic notifications.
    pub notify_tx: mpsc::Sender<Notification>,
    /// Per-connection setup callback.
    pub on_connection: Option<Arc<ConnectionCallback>>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
}

/// The Filament server.
pub struct FilamentServer {
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    on_connection: Option<Arc<ConnectionCallback>>,
    notify_tx: mpsc::Sender<Notification>,
    notify_rx: Option<mpsc::Receiver<Notification>>,
    start_time: Instant,
}

impl FilamentServer {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_QUEUE_DEPTH);
        Self {
            config: Arc::new(config),
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            on_connection: None,
            notify_tx,
            notify_rx: Some(notify_rx),
            start_time: Instant::now(),
        }
    }

    /// Set the callback run for each accepted connection.
    #[must_use]
    pub fn on_connection(
        mut self,
        callback: impl Fn(&Arc<EventChannel>) + Send + Sync + 'static,
    ) -> Self {
        self.on_connection = Some(Arc::new(callback));
        self
    }

    /// Take the notification receiver. Returns `None` after the first call.
    pub fn notifications(&mut self) -> Option<mpsc::Receiver<Notification>> {
        self.notify_rx.take()
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            config: self.config.clone(),
            registry: self.registry.clone(),
            notify_tx: self.notify_tx.clone(),
            on_connection: self.on_connection.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
    }

    /// Bind and start serving. Consumes the server and returns a handle.
    ///
    /// An unusable address or port surfaces as
    /// [`FilamentError::Transport`].
    pub async fn listen(mut self) -> Result<ServerHandle, FilamentError> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr())
            .await
            .map_err(FilamentError::transport)?;
        let addr = listener.local_addr().map_err(FilamentError::transport)?;

        let notifications = self.notify_rx.take();
        let router = self.router();
        let token = self.shutdown.token();

        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
                .ok();
        });

        info!(%addr, "filament server started");

        Ok(ServerHandle {
            addr,
            registry: self.registry,
            shutdown: self.shutdown,
            notifications,
            server: Some(server),
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    notifications: Option<mpsc::Receiver<Notification>>,
    server: Option<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Take the notification receiver. Returns `None` after the first call.
    pub fn notifications(&mut self) -> Option<mpsc::Receiver<Notification>> {
        self.notifications.take()
    }

    /// Gracefully stop the server: announce the close to every client, then
    /// cancel all tasks and wait for the accept loop to drain.
    pub async fn stop(mut self, timeout: Option<Duration>) {
        self.shutdown
            .shutdown_gracefully(&self.registry, self.server.take(), timeout)
            .await;
    }
}

/// GET /ws — upgrade to a Filament session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    if state.registry.count().await >= state.config.max_connections {
        warn!(
            max_connections = state.config.max_connections,
            "connection refused, at capacity"
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let connection_id = ConnectionId::new();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_session(socket, connection_id, state))
        .into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.registry.count().await;
    Json(health::health_check(state.start_time, connections))
}
