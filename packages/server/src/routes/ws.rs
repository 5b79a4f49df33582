use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::sync::broadcast;

use crate::state::AppState;

/// `GET /ws`: claim progress and estimate updates.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rx = state.event_tx.subscribe();
    // Late subscribers first get the record as it stands.
    let greeting = match &state.orchestrator {
        Some(orchestrator) => {
            let claim = orchestrator.status().await;
            Some(serde_json::json!({ "type": "claim:snapshot", "claim": claim }).to_string())
        }
        None => None,
    };
    ws.on_upgrade(move |socket| forward_events(socket, rx, greeting))
}

async fn forward_events(mut socket: WebSocket, mut rx: broadcast::Receiver<String>, greeting: Option<String>) {
    tracing::info!("WebSocket client connected");

    if let Some(text) = greeting {
        if socket.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "WebSocket client lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Ping(data))) => {
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                // Clients only listen.
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!("WebSocket client disconnected");
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}
