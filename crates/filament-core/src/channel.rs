//! The event channel: emit, handler dispatch, ack resolution, close.
//!
//! One `EventChannel` is layered on one live [`Connection`]. The transport
//! feeds incoming frames to [`EventChannel::handle_frame`] from a single
//! task, one at a time, which is what preserves per-connection delivery
//! order: a handler finishes before the next frame is dispatched.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::acks::{AckResponder, PendingAcks};
use crate::connection::Connection;
use crate::error::FilamentError;
use crate::frame::Frame;
use crate::handlers::{EventHandler, FnHandler, HandlerRegistry};
use crate::notify::Notification;

/// Bidirectional event channel over one open connection.
pub struct EventChannel {
    connection: Arc<Connection>,
    handlers: HandlerRegistry,
    acks: PendingAcks,
    notify: mpsc::Sender<Notification>,
}

impl EventChannel {
    /// Create a channel over a connection, reporting notifications on `notify`.
    pub fn new(connection: Arc<Connection>, notify: mpsc::Sender<Notification>) -> Self {
        Self {
            connection,
            handlers: HandlerRegistry::new(),
            acks: PendingAcks::new(),
            notify,
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Mark the handshake complete and deliver the `Connected` notification.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn open(&self) -> bool {
        if !self.connection.set_open() {
            return false;
        }
        info!(connection_id = %self.connection.id, "connection open");
        self.deliver(Notification::Connected {
            connection_id: self.connection.id.clone(),
        });
        true
    }

    /// Register a handler for an event name.
    ///
    /// All handlers for a name run in registration order. Events with no
    /// registered handler are dropped silently.
    pub fn on(&self, name: &str, handler: impl EventHandler + 'static) {
        self.handlers.register(name, handler);
    }

    /// Register a plain closure as a handler.
    pub fn on_fn<F>(&self, name: &str, handler: F)
    where
        F: Fn(&[Value], Option<AckResponder>) + Send + Sync + 'static,
    {
        self.handlers.register(name, FnHandler(handler));
    }

    /// Send a named event with ordered arguments. Fire-and-forget.
    pub fn emit(&self, name: &str, args: Vec<Value>) -> Result<(), FilamentError> {
        self.ensure_open()?;
        if self.connection.send(Frame::event(name, args)) {
            Ok(())
        } else {
            Err(FilamentError::SendQueueFull)
        }
    }

    /// Send a named event and register `callback` to receive the peer's ack
    /// arguments. Returns the correlation id.
    ///
    /// The callback runs at most once, iff the peer acks before the
    /// connection closes. Closing the connection discards it silently.
    pub fn emit_with_ack<F>(
        &self,
        name: &str,
        args: Vec<Value>,
        callback: F,
    ) -> Result<u64, FilamentError>
    where
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        self.ensure_open()?;
        let ack_id = self.acks.add(Box::new(callback));
        if self.connection.send(Frame::event_with_ack(name, args, ack_id)) {
            Ok(ack_id)
        } else {
            // The frame never left; forget the callback.
            let _ = self.acks.remove(ack_id);
            Err(FilamentError::SendQueueFull)
        }
    }

    /// Dispatch one incoming frame.
    ///
    /// Must be called from a single task per connection; handler invocation
    /// completes before the caller feeds the next frame.
    pub async fn handle_frame(&self, frame: Frame) {
        self.connection.mark_alive();

        match frame {
            Frame::Ping => {
                if !self.connection.send(Frame::Pong) {
                    warn!(connection_id = %self.connection.id, "failed to enqueue pong");
                }
            }
            Frame::Pong => {}
            Frame::Connect { .. } => {
                warn!(
                    connection_id = %self.connection.id,
                    "unexpected handshake frame after open, dropped"
                );
            }
            Frame::Event { name, args, ack_id } => {
                if !self.connection.is_open() {
                    debug!(
                        connection_id = %self.connection.id,
                        name, "event on closed connection dropped"
                    );
                    return;
                }
                metrics::counter!("filament_events_received_total").increment(1);
                self.deliver(Notification::Event {
                    connection_id: self.connection.id.clone(),
                    name: name.clone(),
                    args: args.clone(),
                });

                let handlers = self.handlers.get(&name);
                if handlers.is_empty() {
                    debug!(connection_id = %self.connection.id, name, "no handlers, event dropped");
                    return;
                }
                let responder =
                    ack_id.map(|id| AckResponder::new(id, self.connection.clone()));
                for handler in handlers {
                    handler.handle(&args, responder.clone()).await;
                }
            }
            Frame::Ack { ack_id, args } => {
                if !self.connection.is_open() {
                    debug!(
                        connection_id = %self.connection.id,
                        ack_id, "ack on closed connection dropped"
                    );
                    return;
                }
                self.deliver(Notification::Ack {
                    connection_id: self.connection.id.clone(),
                    ack_id,
                    args: args.clone(),
                });
                if let Err(err) = self.acks.resolve(ack_id, args) {
                    warn!(connection_id = %self.connection.id, %err, "ack dropped");
                }
            }
            Frame::Disconnect { reason } => {
                let _ = self.close(&reason);
            }
        }
    }

    /// Close the channel with the given reason.
    ///
    /// First close wins: pending acks are cancelled (their callbacks are
    /// never invoked), the state moves to `Closed`, and the `Disconnected`
    /// notification is delivered exactly once. Returns `true` if this call
    /// performed the close.
    pub fn close(&self, reason: &str) -> bool {
        if !self.connection.begin_close() {
            return false;
        }
        let cancelled = self.acks.clear();
        if cancelled > 0 {
            debug!(
                connection_id = %self.connection.id,
                cancelled, "pending acks discarded on close"
            );
        }
        self.connection.finish_close();
        info!(connection_id = %self.connection.id, reason, "connection closed");
        self.deliver(Notification::Disconnected {
            connection_id: self.connection.id.clone(),
            reason: reason.to_owned(),
        });
        true
    }

    /// Number of acks still awaiting a response.
    pub fn pending_acks(&self) -> usize {
        self.acks.len()
    }

    fn ensure_open(&self) -> Result<(), FilamentError> {
        if self.connection.is_open() {
            Ok(())
        } else {
            Err(FilamentError::ConnectionClosed)
        }
    }

    fn deliver(&self, notification: Notification) {
        match self.notify.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                warn!(connection_id = %n.connection_id(), "notification queue full, dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("notification receiver gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeartbeatConfig;
    use crate::notify::NOTIFY_QUEUE_DEPTH;
    use crate::reason;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        channel: EventChannel,
        frames: mpsc::Receiver<Frame>,
        notifications: mpsc::Receiver<Notification>,
    }

    fn make_channel() -> Fixture {
        let (frame_tx, frames) = mpsc::channel(64);
        let (notify_tx, notifications) = mpsc::channel(NOTIFY_QUEUE_DEPTH);
        let connection = Arc::new(Connection::new(
            "conn_1".into(),
            frame_tx,
            HeartbeatConfig::default(),
        ));
        let channel = EventChannel::new(connection, notify_tx);
        assert!(channel.open());
        Fixture {
            channel,
            frames,
            notifications,
        }
    }

    fn drain_connected(fx: &mut Fixture) {
        let n = fx.notifications.try_recv().unwrap();
        assert!(matches!(n, Notification::Connected { .. }));
    }

    // ── emit ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn emit_sends_event_frame() {
        let mut fx = make_channel();
        fx.channel
            .emit("message", vec![json!("hello"), json!("world")])
            .unwrap();
        let frame = fx.frames.recv().await.unwrap();
        assert_eq!(
            frame,
            Frame::event("message", vec![json!("hello"), json!("world")])
        );
    }

    #[tokio::test]
    async fn emit_preserves_order() {
        let mut fx = make_channel();
        for i in 0..5 {
            fx.channel.emit("seq", vec![json!(i)]).unwrap();
        }
        for i in 0..5 {
            let frame = fx.frames.recv().await.unwrap();
            assert_eq!(frame, Frame::event("seq", vec![json!(i)]));
        }
    }

    #[tokio::test]
    async fn emit_on_closed_channel_errors() {
        let fx = make_channel();
        let _ = fx.channel.close(reason::TRANSPORT_CLOSE);
        let err = fx.channel.emit("message", vec![]).unwrap_err();
        assert!(matches!(err, FilamentError::ConnectionClosed));
    }

    #[tokio::test]
    async fn emit_with_full_queue_errors() {
        let (frame_tx, _frames) = mpsc::channel(1);
        let (notify_tx, _n) = mpsc::channel(8);
        let connection = Arc::new(Connection::new(
            "c".into(),
            frame_tx,
            HeartbeatConfig::default(),
        ));
        let channel = EventChannel::new(connection, notify_tx);
        assert!(channel.open());

        channel.emit("a", vec![]).unwrap();
        let err = channel.emit("b", vec![]).unwrap_err();
        assert!(matches!(err, FilamentError::SendQueueFull));
    }

    // ── emit_with_ack ───────────────────────────────────────────────

    #[tokio::test]
    async fn emit_with_ack_attaches_fresh_ids() {
        let mut fx = make_channel();
        let a = fx.channel.emit_with_ack("x", vec![], |_| {}).unwrap();
        let b = fx.channel.emit_with_ack("x", vec![], |_| {}).unwrap();
        assert_ne!(a, b);
        assert_eq!(fx.channel.pending_acks(), 2);

        let frame = fx.frames.recv().await.unwrap();
        assert_eq!(frame, Frame::event_with_ack("x", vec![], a));
    }

    #[tokio::test]
    async fn ack_frame_resolves_callback_once() {
        let mut fx = make_channel();
        drain_connected(&mut fx);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (calls2, seen2) = (calls.clone(), seen.clone());
        let ack_id = fx
            .channel
            .emit_with_ack("/ackFromClient", vec![json!("a1")], move |args| {
                let _ = calls2.fetch_add(1, Ordering::SeqCst);
                *seen2.lock() = args;
            })
            .unwrap();

        let args = vec![json!(1), json!({"text": "resp"}), json!("server")];
        fx.channel
            .handle_frame(Frame::Ack {
                ack_id,
                args: args.clone(),
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(&*seen.lock(), &args);
        assert_eq!(fx.channel.pending_acks(), 0);

        // A duplicate ack is dropped, not re-invoked
        fx.channel
            .handle_frame(Frame::Ack { ack_id, args })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_ack_id_is_dropped_not_fatal() {
        let mut fx = make_channel();
        fx.channel
            .handle_frame(Frame::Ack {
                ack_id: 999,
                args: vec![],
            })
            .await;
        // Channel still usable
        fx.channel.emit("still-alive", vec![]).unwrap();
        let frame = fx.frames.recv().await.unwrap();
        assert_eq!(frame, Frame::event("still-alive", vec![]));
    }

    #[tokio::test]
    async fn close_discards_pending_acks_without_invoking() {
        let fx = make_channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let _ = fx
            .channel
            .emit_with_ack("x", vec![], move |_| {
                let _ = calls2.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(fx.channel.close(reason::TRANSPORT_CLOSE));
        assert_eq!(fx.channel.pending_acks(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    // ── handler dispatch ────────────────────────────────────────────

    #[tokio::test]
    async fn event_invokes_handlers_in_order() {
        let mut fx = make_channel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (log1, log2) = (log.clone(), log.clone());
        fx.channel
            .on_fn("message", move |args, _| log1.lock().push(("first", args.to_vec())));
        fx.channel
            .on_fn("message", move |args, _| log2.lock().push(("second", args.to_vec())));

        fx.channel
            .handle_frame(Frame::event("message", vec![json!({"id": 2})]))
            .await;

        let entries = log.lock().clone();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "first");
        assert_eq!(entries[1].0, "second");
        assert_eq!(entries[0].1[0]["id"], 2);
    }

    #[tokio::test]
    async fn events_dispatch_in_arrival_order() {
        let fx = make_channel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = log.clone();
        fx.channel.on_fn("seq", move |args, _| {
            log2.lock().push(args[0].clone());
        });

        for i in 0..10 {
            fx.channel
                .handle_frame(Frame::event("seq", vec![json!(i)]))
                .await;
        }
        let seen = log.lock().clone();
        assert_eq!(seen, (0..10).map(|i| json!(i)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn unregistered_event_is_silently_dropped() {
        let mut fx = make_channel();
        drain_connected(&mut fx);
        fx.channel
            .handle_frame(Frame::event("nobody-listens", vec![json!(1)]))
            .await;
        // The upward Event notification still fires
        let n = fx.notifications.try_recv().unwrap();
        assert!(matches!(n, Notification::Event { name, .. } if name == "nobody-listens"));
        // And nothing broke
        fx.channel.emit("ok", vec![]).unwrap();
    }

    #[tokio::test]
    async fn handler_responder_sends_ack() {
        let mut fx = make_channel();
        fx.channel.on_fn("/ackFromClient", |_args, ack| {
            let responder = ack.expect("ack id expected");
            let _ = responder.respond(vec![json!(1), json!({"text": "resp"}), json!("server")]);
        });

        fx.channel
            .handle_frame(Frame::event_with_ack(
                "/ackFromClient",
                vec![json!("a1"), json!("a2")],
                42,
            ))
            .await;

        let frame = fx.frames.recv().await.unwrap();
        assert_eq!(
            frame,
            Frame::Ack {
                ack_id: 42,
                args: vec![json!(1), json!({"text": "resp"}), json!("server")],
            }
        );
    }

    #[tokio::test]
    async fn only_first_handler_ack_is_sent() {
        let mut fx = make_channel();
        fx.channel.on_fn("e", |_args, ack| {
            let _ = ack.unwrap().respond(vec![json!("first")]);
        });
        fx.channel.on_fn("e", |_args, ack| {
            let _ = ack.unwrap().respond(vec![json!("second")]);
        });

        fx.channel
            .handle_frame(Frame::event_with_ack("e", vec![], 1))
            .await;

        let frame = fx.frames.recv().await.unwrap();
        assert_eq!(
            frame,
            Frame::Ack {
                ack_id: 1,
                args: vec![json!("first")],
            }
        );
        assert!(fx.frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn event_without_ack_id_gives_no_responder() {
        let fx = make_channel();
        let saw_responder = Arc::new(AtomicUsize::new(0));
        let saw2 = saw_responder.clone();
        fx.channel.on_fn("plain", move |_args, ack| {
            if ack.is_some() {
                let _ = saw2.fetch_add(1, Ordering::SeqCst);
            }
        });
        fx.channel
            .handle_frame(Frame::event("plain", vec![]))
            .await;
        assert_eq!(saw_responder.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn event_on_closed_connection_dropped() {
        let mut fx = make_channel();
        drain_connected(&mut fx);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        fx.channel.on_fn("message", move |_, _| {
            let _ = hits2.fetch_add(1, Ordering::SeqCst);
        });

        let _ = fx.channel.close(reason::TRANSPORT_CLOSE);
        let _ = fx.notifications.try_recv(); // Disconnected

        fx.channel
            .handle_frame(Frame::event("message", vec![json!(1)]))
            .await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(fx.notifications.try_recv().is_err());
    }

    // ── ping / pong ─────────────────────────────────────────────────

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let mut fx = make_channel();
        fx.channel.handle_frame(Frame::Ping).await;
        let frame = fx.frames.recv().await.unwrap();
        assert_eq!(frame, Frame::Pong);
    }

    #[tokio::test]
    async fn inbound_traffic_refreshes_liveness_clock() {
        let fx = make_channel();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let before = fx.channel.connection().last_activity_elapsed();
        fx.channel.handle_frame(Frame::Pong).await;
        assert!(fx.channel.connection().last_activity_elapsed() < before);
    }

    // ── close & notifications ───────────────────────────────────────

    #[tokio::test]
    async fn open_notifies_connected_once() {
        let (frame_tx, _frames) = mpsc::channel(8);
        let (notify_tx, mut notifications) = mpsc::channel(8);
        let connection = Arc::new(Connection::new(
            "c9".into(),
            frame_tx,
            HeartbeatConfig::default(),
        ));
        let channel = EventChannel::new(connection, notify_tx);

        assert!(channel.open());
        assert!(!channel.open());

        let n = notifications.try_recv().unwrap();
        assert_eq!(
            n,
            Notification::Connected {
                connection_id: "c9".into(),
            }
        );
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_notifies_disconnected_exactly_once() {
        let mut fx = make_channel();
        drain_connected(&mut fx);

        assert!(fx.channel.close(reason::PING_TIMEOUT));
        assert!(!fx.channel.close(reason::TRANSPORT_CLOSE));

        let n = fx.notifications.try_recv().unwrap();
        assert_eq!(
            n,
            Notification::Disconnected {
                connection_id: "conn_1".into(),
                reason: reason::PING_TIMEOUT.into(),
            }
        );
        assert!(fx.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_frame_closes_with_carried_reason() {
        let mut fx = make_channel();
        drain_connected(&mut fx);

        fx.channel
            .handle_frame(Frame::Disconnect {
                reason: reason::CLIENT_DISCONNECT.into(),
            })
            .await;

        let n = fx.notifications.try_recv().unwrap();
        assert!(matches!(
            n,
            Notification::Disconnected { reason, .. } if reason == reason::CLIENT_DISCONNECT
        ));
        assert!(!fx.channel.connection().is_open());
    }

    #[tokio::test]
    async fn event_notification_carries_payload() {
        let mut fx = make_channel();
        drain_connected(&mut fx);
        fx.channel
            .handle_frame(Frame::event("message", vec![json!({"id": 2})]))
            .await;
        let n = fx.notifications.try_recv().unwrap();
        match n {
            Notification::Event { name, args, .. } => {
                assert_eq!(name, "message");
                assert_eq!(args[0]["id"], 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
