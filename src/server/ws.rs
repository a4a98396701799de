// ABOUTME: WebSocket push stream of full session snapshots, one text frame per change

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::AppState;
use crate::models::Session;
use crate::monitor::Monitor;

/// WebSocket upgrade handler. Authentication already happened in the
/// middleware, typically via the `token` query parameter.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.monitor, state.shutdown))
}

/// Handle a single WebSocket connection.
///
/// - The write task sends the current snapshot, then one frame per
///   snapshot that differs from the last one sent.
/// - The read task drains inbound frames only to notice a client close.
/// - Whichever finishes first ends the other, then the subscription is
///   removed.
async fn handle_socket(socket: WebSocket, monitor: Arc<Monitor>, shutdown: CancellationToken) {
    // Subscribe before reading the table so no publish falls in between
    let mut subscription = monitor.subscribe();
    let subscriber = subscription.id();
    let initial = monitor.snapshot();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let mut write_task = tokio::spawn(async move {
        let Some(mut last_sent) = encode(&initial) else {
            return;
        };
        if ws_sender.send(Message::text(last_sent.clone())).await.is_err() {
            return;
        }

        loop {
            let snapshot = tokio::select! {
                () = shutdown.cancelled() => break,
                next = subscription.recv() => match next {
                    Some(snapshot) => snapshot,
                    None => break,
                },
            };

            let Some(json) = encode(&snapshot) else {
                continue;
            };
            if json == last_sent {
                continue;
            }
            if ws_sender.send(Message::text(json.clone())).await.is_err() {
                debug!(subscriber, "ws send failed, closing");
                return;
            }
            last_sent = json;
        }

        let _ = ws_sender.send(Message::Close(None)).await;
    });

    let mut read_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("ws read error: {e}");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    monitor.unsubscribe(subscriber);
    debug!(subscriber, "ws connection closed");
}

fn encode(sessions: &[Session]) -> Option<String> {
    serde_json::to_string(sessions)
        .map_err(|e| warn!(error = %e, "Failed to encode snapshot"))
        .ok()
}
