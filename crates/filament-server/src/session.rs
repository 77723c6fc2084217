//! Per-connection session: handshake, frame pump, heartbeat, cleanup.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use filament_core::heartbeat::{HeartbeatResult, run_heartbeat};
use filament_core::{Connection, ConnectionId, ConnectionState, EventChannel, Frame, reason};

use crate::server::AppState;

/// Run one client session from upgrade through disconnect.
///
/// 1. Sends the `connect` handshake with the assigned id and heartbeat timing
/// 2. Opens the channel and registers it
/// 3. Forwards outbound frames and pings on schedule
/// 4. Dispatches inbound frames one at a time, in arrival order
/// 5. Closes with the appropriate reason and cleans up
#[instrument(skip_all, fields(connection_id = %connection_id))]
pub async fn run_session(ws: WebSocket, connection_id: ConnectionId, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(state.config.send_queue_depth);
    let connection = Arc::new(Connection::new(
        connection_id.clone(),
        frame_tx,
        state.config.heartbeat,
    ));
    let channel = Arc::new(EventChannel::new(
        connection.clone(),
        state.notify_tx.clone(),
    ));

    let handshake = Frame::Connect {
        connection_id: connection_id.clone(),
        ping_interval_ms: state.config.heartbeat.heartbeat_interval_ms,
        ping_timeout_ms: state.config.heartbeat.heartbeat_timeout_ms,
    };
    let Ok(json) = handshake.to_json() else {
        warn!("handshake serialization failed");
        return;
    };
    if ws_tx.send(Message::Text(json.into())).await.is_err() {
        info!("client gone before handshake");
        return;
    }

    // Registered before the open notification so observers that saw
    // `Connected` always find the connection.
    state.registry.add(channel.clone()).await;
    let _ = channel.open();

    // Runs before the inbound pump starts, so handlers registered here see
    // every frame the client sends.
    if let Some(on_connection) = &state.on_connection {
        on_connection(&channel);
    }

    let session_start = std::time::Instant::now();
    info!("client connected");
    counter!("filament_connections_total").increment(1);
    gauge!("filament_connections_active").increment(1.0);

    // Sessions end when the server shuts down, the heartbeat expires, or the
    // transport drops.
    let cancel = state.shutdown.token().child_token();

    // Outbound forwarder: drains the frame queue onto the socket. On
    // cancellation it flushes frames already enqueued, so a final disconnect
    // announcement still reaches the client. A disconnect frame is the last
    // thing a session ever sends.
    let outbound_cancel = cancel.clone();
    let mut outbound = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                () = outbound_cancel.cancelled() => match frame_rx.try_recv() {
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

    // Active pinger; a timeout closes the channel with "ping timeout".
    let hb_channel = channel.clone();
    let hb_cancel = cancel.clone();
    let heartbeat = tokio::spawn(async move {
        if run_heartbeat(hb_channel.connection().clone(), hb_cancel.clone()).await
            == HeartbeatResult::TimedOut
        {
            let _ = hb_channel.close(reason::PING_TIMEOUT);
        }
        hb_cancel.cancel();
    });

    // Inbound pump: one frame at a time preserves delivery order.
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => dispatch(&channel, text.as_str()).await,
                    Message::Binary(data) => match std::str::from_utf8(&data) {
                        Ok(text) => dispatch(&channel, text).await,
                        Err(_) => {
                            debug!(len = data.len(), "non-UTF8 binary frame dropped");
                        }
                    },
                    Message::Close(_) => {
                        info!("client sent close frame");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => connection.mark_alive(),
                }
                if connection.state() == ConnectionState::Closed {
                    break;
                }
            }
        }
    }

    // No-op when the close already happened with a more specific reason.
    let _ = channel.close(reason::TRANSPORT_CLOSE);
    cancel.cancel();

    info!("client disconnected");
    counter!("filament_disconnections_total").increment(1);
    counter!("filament_frames_dropped_total").increment(connection.drop_count());
    gauge!("filament_connections_active").decrement(1.0);
    histogram!("filament_connection_duration_seconds")
        .record(session_start.elapsed().as_secs_f64());

    state.registry.remove(&connection_id).await;
    let _ = heartbeat.await;
    // Give the forwarder a moment to flush a final disconnect frame.
    if tokio::time::timeout(std::time::Duration::from_secs(1), &mut outbound)
        .await
        .is_err()
    {
        outbound.abort();
    }
}

/// Parse and dispatch one inbound text payload. Malformed frames are logged
/// and dropped; the connection stays up.
async fn dispatch(channel: &EventChannel, text: &str) {
    match Frame::parse(text) {
        Ok(frame) => channel.handle_frame(frame).await,
        Err(err) => {
            warn!(%err, "malformed frame dropped");
            counter!("filament_malformed_frames_total").increment(1);
        }
    }
}
