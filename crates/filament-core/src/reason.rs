//! Human-readable disconnect reason strings.
//!
//! Every `disconnected` notification carries one of these (or a caller
//! supplied string). The vocabulary matches the wire protocol this library
//! interoperates with.

/// The underlying transport closed or errored.
pub const TRANSPORT_CLOSE: &str = "transport close";

/// The peer stopped responding within the heartbeat window.
pub const PING_TIMEOUT: &str = "ping timeout";

/// The client requested a graceful disconnect.
pub const CLIENT_DISCONNECT: &str = "client namespace disconnect";

/// The server requested a graceful disconnect.
pub const SERVER_DISCONNECT: &str = "server namespace disconnect";
