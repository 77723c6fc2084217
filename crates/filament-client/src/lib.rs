//! # filament-client
//!
//! WebSocket client side of the Filament event-messaging channel.
//!
//! ```no_run
//! use filament_client::{ClientConfig, FilamentClient};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), filament_core::FilamentError> {
//! let client = FilamentClient::connect_with(
//!     "ws://127.0.0.1:9090/ws",
//!     ClientConfig::default(),
//!     |channel| {
//!         channel.on_fn("message", |args, _ack| {
//!             println!("message: {args:?}");
//!         });
//!     },
//! )
//! .await?;
//!
//! client.emit("message", vec![json!({"id": 1})])?;
//! let _ack_id = client.emit_with_ack("/ackFromClient", vec![json!("a")], |args| {
//!     println!("acked: {args:?}");
//! })?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod config;

pub use client::FilamentClient;
pub use config::ClientConfig;
