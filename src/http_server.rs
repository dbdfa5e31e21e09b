// HTTP and WebSocket transport over the room manager

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

use crate::broadcast::Subscriber;
use crate::error::RoomError;
use crate::orchestrator::RoomManager;
use crate::types::{ChatMessage, ConversationMode, RoleUpdate, RoomInfo};

pub fn build_router(manager: RoomManager) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/api/health", get(health))
        .route("/api/room/create", post(create_room))
        .route("/api/room/:room_id", get(room_info))
        .route("/api/room/:room_id/start", post(start_room))
        .route("/api/room/:room_id/stop", post(stop_room))
        .route("/api/room/:room_id/pause", post(pause_room))
        .route("/api/room/:room_id/resume", post(resume_room))
        .route("/api/room/:room_id/conclude", post(conclude_room))
        .route("/api/room/:room_id/config", post(update_config))
        .route("/api/room/:room_id/setup", post(update_setup))
        .route("/api/room/:room_id/user-message", post(post_message))
        .route("/ws/room/:room_id", get(room_ws))
        .layer(cors)
        .with_state(manager)
}

pub async fn run(manager: RoomManager, port: u16) -> Result<()> {
    let app = build_router(manager);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    eprintln!("[Server] Listening on 0.0.0.0:{port}");
    axum::serve(listener, app)
        .await
        .context("HTTP server failed")?;
    Ok(())
}

type ApiError = (StatusCode, Json<Value>);

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn room_error(error: RoomError) -> ApiError {
    let status = match error {
        RoomError::NotFound(_) => StatusCode::NOT_FOUND,
        RoomError::Conflict(_) => StatusCode::CONFLICT,
        RoomError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
    };
    (status, Json(json!({"error": error.to_string()})))
}

#[derive(Debug, Deserialize)]
struct CreateRoomBody {
    subject: String,
    models: Vec<String>,
    conversation_mode: ConversationMode,
    #[serde(default)]
    global_instruction: String,
    #[serde(default)]
    turn_interval_seconds: Option<f64>,
    #[serde(default)]
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StartBody {
    #[serde(default)]
    max_rounds: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct StopBody {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigBody {
    #[serde(default)]
    conversation_mode: Option<ConversationMode>,
    #[serde(default)]
    global_instruction: Option<String>,
    #[serde(default)]
    turn_interval_seconds: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct SetupBody {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    role_updates: Option<Vec<RoleUpdate>>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    content: String,
}

async fn create_room(
    State(manager): State<RoomManager>,
    Json(body): Json<CreateRoomBody>,
) -> Result<Json<RoomInfo>, ApiError> {
    let info = manager
        .create_room(
            &body.subject,
            body.models,
            body.conversation_mode,
            &body.global_instruction,
            body.turn_interval_seconds,
            body.seed,
        )
        .await
        .map_err(room_error)?;
    Ok(Json(info))
}

async fn room_info(
    State(manager): State<RoomManager>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomInfo>, ApiError> {
    Ok(Json(manager.room_info(&room_id).await.map_err(room_error)?))
}

async fn start_room(
    State(manager): State<RoomManager>,
    Path(room_id): Path<String>,
    Json(body): Json<StartBody>,
) -> Result<Json<Value>, ApiError> {
    manager
        .start_room(&room_id, body.max_rounds)
        .await
        .map_err(room_error)?;
    Ok(Json(json!({"ok": true})))
}

async fn stop_room(
    State(manager): State<RoomManager>,
    Path(room_id): Path<String>,
    Json(body): Json<StopBody>,
) -> Result<Json<Value>, ApiError> {
    manager
        .stop_room(&room_id, body.reason.as_deref())
        .await
        .map_err(room_error)?;
    Ok(Json(json!({"ok": true})))
}

async fn pause_room(
    State(manager): State<RoomManager>,
    Path(room_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    manager.pause_room(&room_id).await.map_err(room_error)?;
    Ok(Json(json!({"ok": true})))
}

async fn resume_room(
    State(manager): State<RoomManager>,
    Path(room_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    manager.resume_room(&room_id).await.map_err(room_error)?;
    Ok(Json(json!({"ok": true})))
}

async fn conclude_room(
    State(manager): State<RoomManager>,
    Path(room_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    manager
        .stop_room(&room_id, Some("user_concluded"))
        .await
        .map_err(room_error)?;
    Ok(Json(json!({"ok": true})))
}

async fn update_config(
    State(manager): State<RoomManager>,
    Path(room_id): Path<String>,
    Json(body): Json<ConfigBody>,
) -> Result<Json<RoomInfo>, ApiError> {
    let info = manager
        .update_room_config(
            &room_id,
            body.conversation_mode,
            body.global_instruction.as_deref(),
            body.turn_interval_seconds,
        )
        .await
        .map_err(room_error)?;
    Ok(Json(info))
}

async fn update_setup(
    State(manager): State<RoomManager>,
    Path(room_id): Path<String>,
    Json(body): Json<SetupBody>,
) -> Result<Json<RoomInfo>, ApiError> {
    let info = manager
        .update_room_setup(&room_id, body.subject.as_deref(), body.role_updates)
        .await
        .map_err(room_error)?;
    Ok(Json(info))
}

async fn post_message(
    State(manager): State<RoomManager>,
    Path(room_id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Json<ChatMessage>, ApiError> {
    let message = manager
        .add_user_message(&room_id, &body.content)
        .await
        .map_err(room_error)?;
    Ok(Json(message))
}

// ---- WebSocket observer ----

struct WsSubscriber {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait::async_trait]
impl Subscriber for WsSubscriber {
    async fn send(&self, event: &Value) -> Result<()> {
        self.tx
            .send(event.to_string())
            .map_err(|_| anyhow!("subscriber channel closed"))
    }
}

async fn room_ws(
    State(manager): State<RoomManager>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(manager, room_id, socket))
}

async fn handle_socket(manager: RoomManager, room_id: String, mut socket: WebSocket) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let subscriber = Arc::new(WsSubscriber { tx });
    let id = match manager.register_subscriber(&room_id, subscriber).await {
        Ok(id) => id,
        Err(error) => {
            let event = json!({"type": "error", "payload": {"detail": error.to_string()}});
            let _ = socket.send(Message::Text(event.to_string())).await;
            return;
        }
    };
    eprintln!("[Server] Subscriber joined room_id={room_id}");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&manager, &room_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    manager.unregister_subscriber(&room_id, id).await;
    eprintln!("[Server] Subscriber left room_id={room_id}");
}

/// Inbound frames carry user chat; anything malformed is dropped.
async fn handle_inbound(manager: &RoomManager, room_id: &str, text: &str) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return;
    };
    if value.get("type").and_then(Value::as_str) != Some("user_message") {
        return;
    }
    let Some(content) = value.get("content").and_then(Value::as_str) else {
        return;
    };
    if let Err(error) = manager.add_user_message(room_id, content).await {
        eprintln!("[Server] Dropped inbound message for room_id={room_id}: {error}");
    }
}
