//! WebSocket client connection.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use filament_core::heartbeat::{HeartbeatResult, run_watchdog};
use filament_core::notify::NOTIFY_QUEUE_DEPTH;
use filament_core::{
    AckResponder, Connection, ConnectionId, ConnectionState, EventChannel, FilamentError, Frame,
    HeartbeatConfig, Notification, reason,
};

use crate::config::ClientConfig;

/// A connected Filament client.
///
/// Created by [`FilamentClient::connect`]. Dropping the client does not
/// announce anything to the server; call [`FilamentClient::disconnect`] for
/// a graceful close.
pub struct FilamentClient {
    channel: Arc<EventChannel>,
    notifications: Option<mpsc::Receiver<Notification>>,
    cancel: CancellationToken,
}

impl FilamentClient {
    /// Connect to a Filament server at `url` (e.g. `ws://127.0.0.1:9090/ws`).
    ///
    /// Completes once the server's handshake has been received; the returned
    /// client carries the server-assigned connection id and the negotiated
    /// heartbeat timing.
    pub async fn connect(url: &str, config: ClientConfig) -> Result<Self, FilamentError> {
        Self::connect_with(url, config, |_| {}).await
    }

    /// Connect and run `setup` on the channel before any inbound frame is
    /// dispatched. Register event handlers in `setup` when the server may
    /// emit immediately after accepting.
    pub async fn connect_with(
        url: &str,
        config: ClientConfig,
        setup: impl FnOnce(&Arc<EventChannel>),
    ) -> Result<Self, FilamentError> {
        let (ws, _response) = connect_async(url).await.map_err(FilamentError::transport)?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        // The first text frame must be the handshake.
        let handshake = tokio::time::timeout(config.handshake_timeout(), async {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => return Some(Frame::parse(text.as_str())),
                    Ok(Message::Close(_)) | Err(_) => return None,
                    Ok(_) => {}
                }
            }
            None
        })
        .await
        .map_err(|_| FilamentError::transport("handshake timed out"))?;

        let (connection_id, heartbeat) = match handshake {
            Some(Ok(Frame::Connect {
                connection_id,
                ping_interval_ms,
                ping_timeout_ms,
            })) => (
                connection_id,
                HeartbeatConfig {
                    heartbeat_interval_ms: ping_interval_ms,
                    heartbeat_timeout_ms: ping_timeout_ms,
                },
            ),
            Some(Ok(other)) => {
                return Err(FilamentError::MalformedFrame(format!(
                    "expected connect handshake, got {other:?}"
                )));
            }
            Some(Err(err)) => return Err(err),
            None => return Err(FilamentError::transport("connection closed during handshake")),
        };

        info!(%connection_id, ?heartbeat, "handshake complete");

        let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(config.send_queue_depth);
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_QUEUE_DEPTH);
        let connection = Arc::new(Connection::new(connection_id, frame_tx, heartbeat));
        let channel = Arc::new(EventChannel::new(connection.clone(), notify_tx));

        let _ = channel.open();
        setup(&channel);

        let cancel = CancellationToken::new();

        // Outbound forwarder. On cancellation it flushes frames already
        // enqueued, so a final disconnect announcement still reaches the
        // server.
        let out_cancel = cancel.clone();
        let _outbound = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    () = out_cancel.cancelled() => match frame_rx.try_recv() {
                        Ok(frame) => frame,
                        Err(_) => break,
                    },
                    frame = frame_rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                let closing = matches!(frame, Frame::Disconnect { .. });
                let json = match frame.to_json() {
                    Ok(json) => json,
                    Err(err) => {
                        warn!(%err, "dropping unserializable frame");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    return;
                }
                if closing {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return;
                }
            }
            let _ = ws_tx.send(Message::Close(None)).await;
        });

        // Passive watchdog; the server does the pinging.
        let wd_channel = channel.clone();
        let wd_cancel = cancel.clone();
        let _watchdog = tokio::spawn(async move {
            if run_watchdog(wd_channel.connection().clone(), wd_cancel.clone()).await
                == HeartbeatResult::TimedOut
            {
                let _ = wd_channel.close(reason::PING_TIMEOUT);
            }
            wd_cancel.cancel();
        });

        // Inbound pump: one frame at a time preserves delivery order.
        let in_channel = channel.clone();
        let in_cancel = cancel.clone();
        let _inbound = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = in_cancel.cancelled() => break,
                    msg = ws_rx.next() => {
                        let Some(Ok(msg)) = msg else { break };
                        match msg {
                            Message::Text(text) => dispatch(&in_channel, text.as_str()).await,
                            Message::Binary(data) => match std::str::from_utf8(&data) {
                                Ok(text) => dispatch(&in_channel, text).await,
                                Err(_) => {
                                    debug!(len = data.len(), "non-UTF8 binary frame dropped");
                                }
                            },
                            Message::Close(_) => break,
                            Message::Ping(_) | Message::Pong(_) => {
                                connection.mark_alive();
                            }
                            Message::Frame(_) => {}
                        }
                        if connection.state() == ConnectionState::Closed {
                            break;
                        }
                    }
                }
            }
            let _ = in_channel.close(reason::TRANSPORT_CLOSE);
            in_cancel.cancel();
        });

        Ok(Self {
            channel,
            notifications: Some(notify_rx),
            cancel,
        })
    }

    /// The server-assigned connection id.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.channel.connection().id
    }

    /// Heartbeat timing negotiated in the handshake.
    pub fn heartbeat(&self) -> &HeartbeatConfig {
        self.channel.connection().heartbeat()
    }

    /// Whether the connection is currently open.
    pub fn is_open(&self) -> bool {
        self.channel.connection().is_open()
    }

    /// The underlying event channel.
    pub fn channel(&self) -> &Arc<EventChannel> {
        &self.channel
    }

    /// Register a plain closure as a handler for an event name.
    pub fn on_fn<F>(&self, name: &str, handler: F)
    where
        F: Fn(&[Value], Option<AckResponder>) + Send + Sync + 'static,
    {
        self.channel.on_fn(name, handler);
    }

    /// Send a named event. Fire-and-forget.
    pub fn emit(&self, name: &str, args: Vec<Value>) -> Result<(), FilamentError> {
        self.channel.emit(name, args)
    }

    /// Send a named event and register a callback for the server's ack.
    pub fn emit_with_ack<F>(
        &self,
        name: &str,
        args: Vec<Value>,
        callback: F,
    ) -> Result<u64, FilamentError>
    where
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        self.channel.emit_with_ack(name, args, callback)
    }

    /// Take the notification receiver. Returns `None` after the first call.
    pub fn notifications(&mut self) -> Option<mpsc::Receiver<Notification>> {
        self.notifications.take()
    }

    /// Gracefully disconnect: announce the close on the wire, then close the
    /// channel with reason `"client namespace disconnect"`.
    pub fn disconnect(&self) {
        let _ = self.channel.connection().send(Frame::Disconnect {
            reason: reason::CLIENT_DISCONNECT.into(),
        });
        let _ = self.channel.close(reason::CLIENT_DISCONNECT);
        self.cancel.cancel();
    }
}

async fn dispatch(channel: &EventChannel, text: &str) {
    match Frame::parse(text) {
        Ok(frame) => channel.handle_frame(frame).await,
        Err(err) => {
            warn!(%err, "malformed frame dropped");
        }
    }
}
