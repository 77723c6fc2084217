//! # filament-core
//!
//! Transport-agnostic core of the Filament event-messaging channel.
//!
//! A [`channel::EventChannel`] sits on top of one live connection and moves
//! named events with ordered argument lists in both directions:
//!
//! - **Frames**: the logical wire vocabulary ([`frame::Frame`]) — handshake,
//!   event, ack, ping/pong, disconnect
//! - **Connection**: per-connection identity, state machine, and bounded
//!   outbound queue ([`connection::Connection`])
//! - **Acks**: correlation-id table resolving `emit_with_ack` callbacks
//!   ([`acks::PendingAcks`])
//! - **Heartbeats**: active pinger and passive watchdog loops
//!   ([`heartbeat`])
//! - **Notifications**: the upward-facing lifecycle/event stream
//!   ([`notify::Notification`])
//!
//! The actual transport (WebSocket framing, TLS, HTTP upgrade) lives in the
//! `filament-server` and `filament-client` crates; this crate only speaks
//! [`frame::Frame`] values.

#![deny(unsafe_code)]

pub mod acks;
pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handlers;
pub mod heartbeat;
pub mod ids;
pub mod notify;
pub mod reason;

pub use acks::AckResponder;
pub use channel::EventChannel;
pub use config::HeartbeatConfig;
pub use connection::{Connection, ConnectionState};
pub use error::FilamentError;
pub use frame::Frame;
pub use handlers::EventHandler;
pub use ids::ConnectionId;
pub use notify::Notification;
