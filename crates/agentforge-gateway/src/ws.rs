// SPDX-License-Identifier: Apache-2.0
//! The session-scoped event stream: a single `tokio::select!` loop between
//! inbound client frames and outbound domain events.
//!
//! - The orchestrator's event bus is global (tagged by `session_id`); this
//!   module filters down to one session before a frame is ever written.
//! - Backpressure drops only `StreamDelta` events once a subscriber falls
//!   `event_subscriber_lag_threshold` events behind — domain events (plan
//!   and step transitions) are never dropped, only delayed.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use agentforge_orchestrator::StreamEvent;

use crate::auth::AuthedUser;
use crate::state::AppState;

pub async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    axum::Extension(user): axum::Extension<AuthedUser>,
) -> Response {
    if let Err(e) = state.authorize_session(&session_id, &user.user_id).await {
        return e.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session_id: String) {
    let mut events = spawn_event_forwarder(
        state.orchestrator.subscribe(),
        session_id.clone(),
        state.event_subscriber_lag_threshold,
    );
    let mut heartbeat = tokio::time::interval(Duration::from_secs(state.heartbeat_interval_seconds.max(1)));
    heartbeat.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_client_frame(&text),
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%session_id, "WebSocket recv error: {e}");
                        break;
                    }
                }
            }
            ev = events.recv() => {
                match ev {
                    Some(ev) => {
                        if !send_event(&mut socket, &ev).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = heartbeat.tick() => {
                let hb = StreamEvent::Heartbeat(agentforge_orchestrator::HeartbeatPayload::new());
                if !send_event(&mut socket, &hb).await {
                    break;
                }
            }
        }
    }

    debug!(%session_id, "WebSocket connection closed");
}

/// Client→server frames are ignored except `Ping`/`Pong` (handled by Axum's
/// WebSocket transport directly) and `ClientAck`, which exists only so a
/// client can acknowledge receipt — there is nothing for the server to do
/// with it.
fn handle_client_frame(text: &str) {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(v) if v.get("type").and_then(|t| t.as_str()) == Some("client_ack") => {}
        Ok(_) => {}
        Err(e) => debug!("ignoring malformed client frame: {e}"),
    }
}

async fn send_event(socket: &mut WebSocket, ev: &StreamEvent) -> bool {
    match serde_json::to_string(ev) {
        Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            warn!("failed to serialize stream event: {e}");
            true
        }
    }
}

/// Bridges the global broadcast bus down to one session's bounded mpsc
/// queue, applying the drop-`StreamDelta`-on-lag policy before anything
/// reaches the socket loop.
fn spawn_event_forwarder(
    mut events: broadcast::Receiver<(String, StreamEvent)>,
    session_id: String,
    lag_threshold: usize,
) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(lag_threshold.max(1));
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok((sid, ev)) if sid == session_id => {
                    if forward_or_drop(&tx, ev).await.is_err() {
                        break;
                    }
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(%session_id, skipped = n, "gateway subscriber lagged behind the orchestrator event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    rx
}

async fn forward_or_drop(tx: &mpsc::Sender<StreamEvent>, ev: StreamEvent) -> Result<(), ()> {
    match tx.try_send(ev) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full(StreamEvent::StreamDelta(_))) => {
            // Buffer saturated and this is a partial-text delta: drop it.
            // The client can reconstruct from the next `StepOutput`.
            Ok(())
        }
        Err(mpsc::error::TrySendError::Full(ev)) => {
            // Domain event: never dropped, only delayed until the socket
            // loop drains the buffer.
            tx.send(ev).await.map_err(|_| ())
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Err(()),
    }
}
