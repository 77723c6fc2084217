//! # filament-server
//!
//! WebSocket server side of the Filament event-messaging channel.
//!
//! The server accepts WebSocket upgrades on `/ws`, assigns each client a
//! connection id, sends the `connect` handshake with the heartbeat timing,
//! and runs one session per client: a single inbound pump (ordered
//! dispatch), an outbound forwarder, and an active pinger.
//!
//! ```no_run
//! use filament_server::{FilamentServer, ServerConfig};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), filament_core::FilamentError> {
//! let server = FilamentServer::new(ServerConfig::default()).on_connection(|channel| {
//!     channel.on_fn("message", |args, _ack| {
//!         println!("message: {args:?}");
//!     });
//!     let _ = channel.emit("message", vec![json!({"id": 1, "channel": "server"})]);
//! });
//! let handle = server.listen().await?;
//! println!("listening on {}", handle.addr());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::ServerConfig;
pub use registry::ConnectionRegistry;
pub use server::{FilamentServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
