//! JSON HTTP API.
//!
//! Exposes the indexing and chat pipeline over a small axum surface, bound
//! to the single account configured in `[account]`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/folders/{id}/index` | Index a folder into the vector store |
//! | `POST` | `/folders/{id}/index-assistant` | Index a folder via the managed assistant |
//! | `POST` | `/folders/{id}/chat` | Open (or touch) the folder's chat session |
//! | `POST` | `/chat` | Send a chat turn `{message, folderId, chatId}` |
//! | `GET`  | `/chats/{id}/messages` | The chat transcript, oldest first |
//! | `DELETE` | `/chats/{id}` | Delete a chat and reset its folder |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Chat not found" } }
//! ```
//!
//! A failed chat turn is NOT an HTTP error: the orchestrator degrades to a
//! fixed assistant reply and the endpoint returns it with `error` set in
//! the body — the conversation always ends with an assistant turn.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::ChatOrchestrator;
use crate::indexer::{FolderIndexer, IndexReport, IndexStrategy};
use crate::models::ChatMessage;
use crate::store::MetaStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn MetaStore>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub indexer: Arc<FolderIndexer>,
}

/// Starts the HTTP server on the configured bind address.
///
/// Runs until the process is terminated.
pub async fn run_server(bind: &str, ctx: AppContext) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/folders/{id}/index", post(handle_index_folder))
        .route(
            "/folders/{id}/index-assistant",
            post(handle_index_folder_assistant),
        )
        .route("/folders/{id}/chat", post(handle_open_chat))
        .route("/chat", post(handle_chat_message))
        .route("/chats/{id}/messages", get(handle_chat_messages))
        .route("/chats/{id}", delete(handle_delete_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(ctx);

    println!("API server listening on http://{}", bind);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map pipeline errors onto HTTP statuses without a custom error type at
/// every boundary: "not found" messages become 404, the rest 500.
fn classify_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    if msg.contains("not found") || msg.contains("Not found") || msg.contains("Chat not found") {
        not_found(msg)
    } else if msg.contains("does not exist") || msg.contains("Invalid folder id") {
        not_found(msg)
    } else {
        internal(msg)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /folders/{id}/index ============

async fn handle_index_folder(
    State(ctx): State<AppContext>,
    Path(folder_id): Path<String>,
) -> Result<Json<IndexReport>, AppError> {
    let report = ctx
        .indexer
        .index_folder(&folder_id, IndexStrategy::PerFile)
        .await
        .map_err(classify_error)?;
    Ok(Json(report))
}

// ============ POST /folders/{id}/index-assistant ============

async fn handle_index_folder_assistant(
    State(ctx): State<AppContext>,
    Path(folder_id): Path<String>,
) -> Result<Json<IndexReport>, AppError> {
    let report = ctx
        .indexer
        .index_folder(&folder_id, IndexStrategy::AssistantBatch)
        .await
        .map_err(classify_error)?;
    Ok(Json(report))
}

// ============ POST /folders/{id}/chat ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenChatResponse {
    chat_id: String,
    folder_id: String,
    folder_name: String,
}

/// Open (or touch) the folder's one chat session.
async fn handle_open_chat(
    State(ctx): State<AppContext>,
    Path(folder_id): Path<String>,
) -> Result<Json<OpenChatResponse>, AppError> {
    let folder = ctx
        .store
        .get_folder(&folder_id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found("Folder not found"))?;

    let chat = ctx
        .store
        .get_or_create_chat(&folder.id)
        .await
        .map_err(classify_error)?;

    Ok(Json(OpenChatResponse {
        chat_id: chat.id,
        folder_id: folder.id,
        folder_name: folder.name,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    folder_id: String,
    chat_id: String,
}

async fn handle_chat_message(
    State(ctx): State<AppContext>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<crate::chat::ChatReply>, AppError> {
    if request.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let reply = ctx
        .orchestrator
        .send_message(&request.message, &request.folder_id, &request.chat_id)
        .await
        .map_err(classify_error)?;

    Ok(Json(reply))
}

// ============ GET /chats/{id}/messages ============

/// Upper bound on transcript length returned in one response.
const TRANSCRIPT_LIMIT: usize = 500;

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<ChatMessage>,
}

async fn handle_chat_messages(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<String>,
) -> Result<Json<MessagesResponse>, AppError> {
    ctx.store
        .get_chat(&chat_id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found("Chat not found"))?;

    let messages = ctx
        .store
        .recent_messages(&chat_id, TRANSCRIPT_LIMIT)
        .await
        .map_err(classify_error)?;

    Ok(Json(MessagesResponse { messages }))
}

// ============ DELETE /chats/{id} ============

#[derive(Serialize)]
struct DeleteChatResponse {
    success: bool,
}

async fn handle_delete_chat(
    State(ctx): State<AppContext>,
    Path(chat_id): Path<String>,
) -> Result<Json<DeleteChatResponse>, AppError> {
    ctx.indexer
        .delete_chat(&chat_id)
        .await
        .map_err(classify_error)?;
    Ok(Json(DeleteChatResponse { success: true }))
}
