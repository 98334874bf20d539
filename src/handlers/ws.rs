use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::resolve_account;
use crate::AppState;

const HEARTBEAT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Upgrades to the per-user push channel. Browsers cannot set headers on a
/// WebSocket handshake, so the JWT travels in the query string.
pub async fn ws_handler(
    Query(params): Query<WsQuery>,
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(token) = params.token.filter(|t| !t.is_empty()) else {
        return AppError::Unauthorized("Missing token".to_string()).into_response();
    };

    let account = match resolve_account(&state, &token).await {
        Ok(account) => account,
        Err(e) => {
            tracing::warn!("WebSocket authentication failed: {}", e);
            return e.into_response();
        }
    };

    let Some(ws) = ws else {
        return AppError::BadRequest("Expected a WebSocket upgrade".to_string()).into_response();
    };

    let user_id = account.id;
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Reply to a client text frame, if any.
fn client_reply(text: &str) -> Option<Value> {
    let parsed: Value = serde_json::from_str(text).ok()?;
    match parsed.get("type").and_then(Value::as_str) {
        Some("ping") => Some(json!({ "type": "pong", "timestamp": chrono::Utc::now() })),
        _ => None,
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.push.subscribe();
    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::channel::<Value>(8);

    tracing::info!(%user_id, "WebSocket connected");

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Some(reply) = client_reply(&text) {
                        if reply_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => {
                    tracing::debug!(%user_id, "Client closed connection");
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        let welcome = json!({
            "type": "connected",
            "message": "WebSocket connected",
            "user_id": user_id,
        });
        if sender.send(Message::Text(welcome.to_string())).await.is_err() {
            return;
        }

        let mut heartbeat =
            tokio::time::interval(tokio::time::Duration::from_secs(HEARTBEAT_SECS));
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        tracing::debug!(%user_id, "Client disconnected during heartbeat");
                        break;
                    }
                }
                Some(reply) = reply_rx.recv() => {
                    if sender.send(Message::Text(reply.to_string())).await.is_err() {
                        break;
                    }
                }
                result = rx.recv() => {
                    match result {
                        Ok(message) if message.user_id == user_id => {
                            if sender.send(Message::Text(message.payload.to_string())).await.is_err() {
                                tracing::debug!(%user_id, "Client disconnected");
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(%user_id, skipped = n, "Push subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Push hub closed");
                            break;
                        }
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    tracing::info!(%user_id, "WebSocket disconnected");
}
