//! Branded connection identifier.
//!
//! Connections are identified by an opaque newtype over a UUID v7 string
//! (time-ordered), so ids sort roughly by connection time and can never be
//! confused with event names or ack ids in signatures.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of one logical connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a new random id (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<ConnectionId> for String {
    fn from(id: ConnectionId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_time_ordered() {
        let a = ConnectionId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = ConnectionId::new();
        assert!(a.as_str() < b.as_str());
    }

    #[test]
    fn from_str_roundtrip() {
        let id = ConnectionId::from("conn_1");
        assert_eq!(id.as_str(), "conn_1");
        assert_eq!(String::from(id), "conn_1");
    }

    #[test]
    fn display_matches_inner() {
        let id = ConnectionId::from("abc");
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn serde_is_transparent() {
        let id = ConnectionId::from("conn_x");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"conn_x\"");
        let back: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn default_generates_fresh_id() {
        let id = ConnectionId::default();
        assert!(!id.as_str().is_empty());
    }
}
