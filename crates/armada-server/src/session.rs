//! Edge WebSocket session lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tracing::{debug, info, instrument, warn};

use armada_core::frames::{CoreFrame, EdgeFrame, RegisteredFrame};
use armada_fleet::{DisconnectReason, FleetManager};

/// How long a fresh stream may sit silent before the first `register` frame.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Run an edge session on an upgraded WebSocket.
///
/// 1. Waits for the `register` frame (anything else rejects the stream)
/// 2. Registers with the manager; a rejection is sent back before closing
/// 3. Spawns the writer task draining the connection's outbound queue
/// 4. Runs the read loop, feeding inbound frames to the manager
/// 5. Removes the edge with reason `StreamClosed` on socket close/error
#[instrument(skip_all)]
pub async fn run_edge_session(ws: WebSocket, manager: Arc<FleetManager>) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    // Registration handshake.
    let registration = match await_registration(&mut ws_rx).await {
        Ok(reg) => reg,
        Err(reason) => {
            warn!(reason, "closing stream before registration");
            send_rejection(&mut ws_tx, reason).await;
            return;
        }
    };

    let (conn, mut outbound) = match manager.register(registration).await {
        Ok(pair) => pair,
        Err(err) => {
            send_rejection(&mut ws_tx, &err.to_string()).await;
            return;
        }
    };

    let session_start = std::time::Instant::now();
    counter!("edge_connections_total").increment(1);
    gauge!("edge_connections_active").increment(1.0);

    // Writer task: the only place that writes to the socket.
    let cancel = conn.cancel_token();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(err) => {
                            warn!(error = %err, "dropping unserializable outbound frame");
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
        let _ = ws_tx.close().await;
    });

    // Read loop.
    let read_cancel = conn.cancel_token();
    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = read_cancel.cancelled() => break,
        };
        let Some(Ok(msg)) = msg else { break };

        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            // Binary frames carrying UTF-8 JSON are tolerated.
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s.to_string()),
                Err(_) => {
                    debug!(edge_id = %conn.id, len = data.len(), "ignoring non-UTF8 binary frame");
                    None
                }
            },
            Message::Close(_) => {
                info!(edge_id = %conn.id, "edge sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => None,
        };
        let Some(text) = text else { continue };

        match serde_json::from_str::<EdgeFrame>(&text) {
            Ok(frame) => manager.handle_frame(&conn, frame),
            Err(err) => {
                // Malformed frame: logged and dropped, the stream stays up.
                warn!(edge_id = %conn.id, error = %err, "dropping malformed frame");
                counter!("edge_frames_malformed_total").increment(1);
            }
        }
    }

    gauge!("edge_connections_active").decrement(1.0);
    histogram!("edge_session_duration_seconds").record(session_start.elapsed().as_secs_f64());

    // A replaced connection must not tear down its successor's entry.
    if let Some(current) = manager.get_edge(&conn.id) {
        if Arc::ptr_eq(&current, &conn) {
            manager.remove_edge(&conn.id, DisconnectReason::StreamClosed);
        }
    }
    writer.abort();
}

/// Wait for the first `register` frame, skipping control frames.
async fn await_registration(
    ws_rx: &mut futures::stream::SplitStream<WebSocket>,
) -> Result<armada_core::frames::RegisterFrame, &'static str> {
    let deadline = tokio::time::sleep(REGISTER_TIMEOUT);
    tokio::pin!(deadline);

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = &mut deadline => return Err("registration timed out"),
        };
        let Some(Ok(msg)) = msg else {
            return Err("stream closed before registration");
        };
        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => return Err("first frame must be register"),
            },
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return Err("stream closed before registration"),
        };
        return match serde_json::from_str::<EdgeFrame>(&text) {
            Ok(EdgeFrame::Register(reg)) => Ok(reg),
            Ok(_) => Err("first frame must be register"),
            Err(_) => Err("malformed registration frame"),
        };
    }
}

/// Best-effort rejection before tearing down an unauthenticated stream.
async fn send_rejection(ws_tx: &mut SplitSink<WebSocket, Message>, error: &str) {
    let frame = CoreFrame::Registered(RegisteredFrame {
        success: false,
        edge_id: None,
        heartbeat_interval_secs: None,
        error: Some(error.to_string()),
    });
    if let Ok(json) = serde_json::to_string(&frame) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }
    let _ = ws_tx.close().await;
}
