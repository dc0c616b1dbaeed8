//! Per-connection actors.
//!
//! Each WebSocket is split into reader and writer halves. The writer task
//! owns the sink and forwards frames from an mpsc channel; the reader loop
//! runs in the connection's own task. Cloning the channel sender is how the
//! rest of the system pushes frames to a client.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::registry::PositionSample;
use crate::state::AppState;
use crate::ws::protocol::{AdminEvent, PositionReport};
use crate::ws::{CLOSE_INVALID_PAYLOAD, OBSERVER_QUEUE_CAPACITY};

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents connection leaks from abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the ingestion actor for an authenticated tracked-user connection.
///
/// Streaming loop: each text frame is parsed as a position report, stamped
/// with server time, recorded in the registry, queued for durable append,
/// and broadcast to all current admins, in that order, so per-identity
/// arrival order is preserved end to end. A malformed report is fatal to
/// the connection.
pub async fn run_user_connection(socket: WebSocket, state: AppState, identity: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Register this session; a reconnect silently replaces the old entry.
    state.registry.register(&identity, tx.clone());

    tracing::info!(identity = %identity, "Ingestion actor started");

    // Writer task: forwards mpsc messages to the WebSocket sink.
    let writer_handle = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        let mut rx = rx;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                // WebSocket send failed — connection is broken
                break;
            }
        }
    });

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Ping task: sends periodic pings and monitors pong responses.
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Streaming loop: one position report per text frame.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    if let Err(e) = ingest_report(&state, &identity, text.as_str()) {
                        // Reference behavior: a malformed report ends the
                        // connection, there is no per-message recovery.
                        tracing::warn!(
                            identity = %identity,
                            error = %e,
                            "Malformed position report, closing connection"
                        );
                        let _ = tx.send(Message::Close(Some(CloseFrame {
                            code: CLOSE_INVALID_PAYLOAD,
                            reason: "malformed position report".into(),
                        })));
                        break;
                    }
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        identity = %identity,
                        "Received binary frame (expected JSON text), ignoring"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(identity = %identity, reason = ?frame, "Client initiated close");
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(identity = %identity, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                // Stream ended — client disconnected
                tracing::info!(identity = %identity, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: drop the live session and every sender clone, then let the
    // writer drain its queue (a pending close frame must still go out).
    // The identity's latest position and history stay cached until restart.
    ping_handle.abort();
    let _ = ping_handle.await;
    state.registry.unregister(&identity, &tx);
    drop(tx);
    drain_writer(writer_handle).await;

    tracing::info!(identity = %identity, "Ingestion actor stopped");
}

/// Give the writer a moment to flush queued frames (all senders are
/// dropped by now), then cut it loose. A peer that stopped reading must
/// not pin the cleanup path.
async fn drain_writer(mut writer_handle: tokio::task::JoinHandle<()>) {
    if timeout(Duration::from_secs(5), &mut writer_handle).await.is_err() {
        writer_handle.abort();
    }
}

/// Parse, stamp, record, queue for persistence, and fan out one report.
fn ingest_report(
    state: &AppState,
    identity: &str,
    text: &str,
) -> Result<(), serde_json::Error> {
    let report: PositionReport = serde_json::from_str(text)?;
    let sample = PositionSample {
        identity: identity.to_string(),
        lat: report.lat,
        lon: report.lon,
        ts: Utc::now().timestamp(),
    };

    state.registry.record_sample(sample.clone());

    // Durable append is best-effort: a full queue drops the sample rather
    // than coupling the real-time path to storage latency.
    if let Err(e) = state.store_tx.try_send(sample.clone()) {
        tracing::warn!(identity = %identity, error = %e, "Store queue rejected sample");
    }

    state.admins.broadcast(AdminEvent::update(&sample).to_message());
    Ok(())
}

/// Run the observer actor for an authorized admin connection.
///
/// Joins the fan-out set, sends the initial snapshot through its own queue
/// (FIFO, so the snapshot precedes any update enqueued after membership),
/// then idles. Inbound frames are drained and only serve to detect
/// liveness and closure.
pub async fn run_admin_connection(socket: WebSocket, state: AppState, identity: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(OBSERVER_QUEUE_CAPACITY);

    // Writer task: forwards queued frames to the WebSocket sink.
    let writer_handle = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        let mut rx = rx;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Join the fan-out set, then snapshot. An update racing this window is
    // queued behind the snapshot, never ahead of it.
    let observer_id = state.admins.add(tx.clone());
    let snapshot = AdminEvent::initial(&state.registry).to_message();
    if tx.send(snapshot).await.is_err() {
        state.admins.remove(observer_id);
        writer_handle.abort();
        return;
    }

    tracing::info!(identity = %identity, observer_id, "Admin observer started");

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Ping task. Sends through the observer's own bounded queue; waiting on
    // a backed-up queue stalls only this admin's keepalive.
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).await.is_err() {
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing admin connection");
                    let _ = ping_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: 1001,
                            reason: "Pong timeout".into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Drain inbound frames until the connection dies.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.try_send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(identity = %identity, reason = ?frame, "Admin initiated close");
                    break;
                }
                Message::Text(_) | Message::Binary(_) => {
                    // Admins are receive-only; anything else is ignored.
                    tracing::debug!(identity = %identity, "Ignoring inbound admin frame");
                }
            },
            Some(Err(e)) => {
                tracing::warn!(identity = %identity, error = %e, "Admin receive error");
                break;
            }
            None => {
                tracing::info!(identity = %identity, "Admin stream ended");
                break;
            }
        }
    }

    // Cleanup: leave the fan-out set (drops its sender clone), then drain
    // the writer so any queued frames still go out.
    state.admins.remove(observer_id);
    ping_handle.abort();
    let _ = ping_handle.await;
    drop(tx);
    drain_writer(writer_handle).await;

    tracing::info!(identity = %identity, observer_id, "Admin observer stopped");
}
