//! Event handler trait and per-name handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::acks::AckResponder;

/// Trait implemented by every event handler.
///
/// `ack` is `Some` when the sender attached an acknowledgment callback; the
/// handler may call [`AckResponder::respond`] to answer it.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one delivery of the event.
    async fn handle(&self, args: &[Value], ack: Option<AckResponder>);
}

/// Adapter turning a plain closure into an [`EventHandler`].
pub(crate) struct FnHandler<F>(pub F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&[Value], Option<AckResponder>) + Send + Sync,
{
    async fn handle(&self, args: &[Value], ack: Option<AckResponder>) {
        (self.0)(args, ack);
    }
}

/// Registry mapping event names to their handlers.
///
/// Multiple handlers may be registered for one name; they are invoked in
/// registration order. Lookups for unregistered names return an empty list
/// (unhandled events are silently dropped by the channel).
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Append a handler for an event name.
    pub fn register(&self, name: &str, handler: impl EventHandler + 'static) {
        self.register_arc(name, Arc::new(handler));
    }

    /// Append an already-shared handler for an event name.
    pub fn register_arc(&self, name: &str, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .entry(name.to_owned())
            .or_default()
            .push(handler);
    }

    /// Snapshot the handlers for a name, in registration order.
    pub fn get(&self, name: &str) -> Vec<Arc<dyn EventHandler>> {
        self.handlers.read().get(name).cloned().unwrap_or_default()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, args: &[Value], _ack: Option<AckResponder>) {
            self.log
                .lock()
                .push(format!("{}:{}", self.label, args.len()));
        }
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let reg = HandlerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        reg.register(
            "message",
            Recorder {
                label: "first",
                log: log.clone(),
            },
        );
        reg.register(
            "message",
            Recorder {
                label: "second",
                log: log.clone(),
            },
        );

        for handler in reg.get("message") {
            handler.handle(&[json!(1)], None).await;
        }
        assert_eq!(&*log.lock(), &["first:1", "second:1"]);
    }

    #[test]
    fn unregistered_name_yields_empty() {
        let reg = HandlerRegistry::new();
        assert!(reg.get("nothing").is_empty());
    }

    #[test]
    fn registration_is_per_name() {
        let reg = HandlerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        reg.register(
            "a",
            Recorder {
                label: "x",
                log: log.clone(),
            },
        );
        reg.register(
            "a",
            Recorder {
                label: "y",
                log: log.clone(),
            },
        );
        reg.register(
            "b",
            Recorder {
                label: "z",
                log,
            },
        );
        assert_eq!(reg.get("a").len(), 2);
        assert_eq!(reg.get("b").len(), 1);
    }

    #[tokio::test]
    async fn fn_handler_adapts_closures() {
        let reg = HandlerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        reg.register(
            "message",
            FnHandler(move |args: &[Value], _ack| {
                seen2.lock().push(args.to_vec());
            }),
        );

        for handler in reg.get("message") {
            handler.handle(&[json!("hello"), json!("world")], None).await;
        }
        assert_eq!(&*seen.lock(), &[vec![json!("hello"), json!("world")]]);
    }
}
