//! Reference chat service: one WebSocket endpoint per room that validates
//! each frame and answers it with an OK or ERROR reply.

pub mod sessions;
pub mod validation;

pub use sessions::*;
pub use validation::*;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub sessions: Arc<RoomSessions>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_message: Option<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerResponse {
    pub fn ok(message: ChatMessage) -> Self {
        Self {
            status: "OK",
            server_timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            original_message: Some(message),
            error: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: "ERROR",
            server_timestamp: None,
            original_message: None,
            error: Some(reason.into()),
        }
    }
}

/// Reply for one inbound text frame.
pub fn respond(payload: &str) -> ServerResponse {
    let message: ChatMessage = match serde_json::from_str(payload) {
        Ok(message) => message,
        Err(_) => return ServerResponse::error("Invalid JSON format"),
    };
    match validate(&message) {
        Ok(()) => ServerResponse::ok(message),
        Err(reason) => ServerResponse::error(reason),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat/{room_id}", get(chat))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Chat server listening on {}", addr);
    }
    axum::serve(listener, router(state)).await
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "connections": state.sessions.total_connections(),
        "rooms": state.sessions.room_count(),
    }))
}

async fn chat(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, room_id, state))
}

async fn handle_socket(mut socket: WebSocket, room_id: String, state: AppState) {
    let session = state.sessions.join(&room_id);
    debug!("Connection established: session={} room={}", session, room_id);

    while let Some(frame) = socket.recv().await {
        let reply = match frame {
            Ok(Message::Text(text)) => respond(text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("Transport error: session={} error={}", session, e);
                break;
            }
        };
        let body = match serde_json::to_string(&reply) {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to encode reply: {}", e);
                continue;
            }
        };
        if socket.send(Message::Text(body.into())).await.is_err() {
            break;
        }
    }

    state.sessions.leave(&room_id, session);
    debug!("Connection closed: session={} room={}", session, room_id);
}
