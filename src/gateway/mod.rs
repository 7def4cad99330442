//! HTTP surface: upload, chat, clear, status.
//!
//! Handlers stay thin: they decode the request, call into
//! [`DocumentChat`], and map [`ChatError`] onto status codes and the JSON
//! shapes the browser client expects.

use anyhow::{Context, Result};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::GatewayConfig;
use crate::error::ChatError;
use crate::service::DocumentChat;
use crate::session::SessionStatus;

/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
    pub message: String,
}

/// Body for failures of operations that report `success`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FailureResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn status_code(err: &ChatError) -> StatusCode {
    match err {
        ChatError::Validation(_) => StatusCode::BAD_REQUEST,
        ChatError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ChatError::NotReady => StatusCode::CONFLICT,
        ChatError::Indexing(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ChatError::Generation { timed_out: true, .. } => StatusCode::GATEWAY_TIMEOUT,
        ChatError::Generation { .. } => StatusCode::BAD_GATEWAY,
        ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Status and user-facing message. Internal errors are logged, not echoed.
fn describe(err: &ChatError, internal: &str) -> (StatusCode, String) {
    let status = status_code(err);
    match err {
        ChatError::Storage(e) => {
            let reason = format!("{e:#}");
            error!(error = %reason, "{internal}");
            (status, internal.to_string())
        }
        other => {
            if other.is_validation() || matches!(other, ChatError::NotReady) {
                warn!(status = status.as_u16(), "{other}");
            }
            (status, other.to_string())
        }
    }
}

fn failure(err: &ChatError, internal: &str) -> Response {
    let (status, error) = describe(err, internal);
    (
        status,
        Json(FailureResponse {
            success: false,
            error,
        }),
    )
        .into_response()
}

fn chat_failure(err: &ChatError) -> Response {
    let (status, error) = describe(err, "Failed to process message");
    (status, Json(ErrorResponse { error })).into_response()
}

/// Map a multipart read error; over-limit bodies are reported as too large.
fn multipart_error(status: StatusCode, body: String, limit: u64) -> ChatError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ChatError::TooLarge { limit }
    } else {
        ChatError::validation(format!("Invalid upload: {body}"))
    }
}

async fn upload(
    State(chat): State<Arc<DocumentChat>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let limit = chat.files().max_bytes();
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            return failure(
                &ChatError::validation(format!("Invalid upload: {}", rejection.body_text())),
                "Upload failed",
            )
        }
    };

    let mut received: Option<(String, Vec<u8>)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return failure(&multipart_error(e.status(), e.body_text(), limit), "Upload failed"),
        };
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => received = Some((name, bytes.to_vec())),
            Err(e) => return failure(&multipart_error(e.status(), e.body_text(), limit), "Upload failed"),
        }
        break;
    }

    let Some((name, bytes)) = received else {
        return failure(&ChatError::validation("No file selected"), "Upload failed");
    };

    match chat.upload(&name, &bytes).await {
        Ok(file) => Json(UploadResponse {
            success: true,
            message: format!("Successfully uploaded and processed {}", file.original_name),
            filename: file.original_name,
        })
        .into_response(),
        Err(e) => failure(&e, "Upload failed"),
    }
}

async fn chat_message(
    State(chat): State<Arc<DocumentChat>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return chat_failure(&ChatError::validation(format!(
                "Invalid request: {}",
                rejection.body_text()
            )))
        }
    };

    match chat.chat(&request.message).await {
        Ok(response) => Json(ChatResponse {
            response,
            message: request.message.trim().to_string(),
        })
        .into_response(),
        Err(e) => chat_failure(&e),
    }
}

async fn clear(State(chat): State<Arc<DocumentChat>>) -> Response {
    match chat.clear().await {
        Ok(()) => Json(serde_json::json!({
            "success": true,
            "message": "Chat cleared successfully",
        }))
        .into_response(),
        Err(e) => failure(&e, "Failed to clear chat"),
    }
}

async fn status(State(chat): State<Arc<DocumentChat>>) -> Json<SessionStatus> {
    Json(chat.status())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the application router around a shared [`DocumentChat`].
pub fn router(chat: Arc<DocumentChat>) -> Router {
    let body_limit = chat.files().max_bytes().saturating_add(MULTIPART_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/upload", post(upload))
        .route("/chat", post(chat_message))
        .route("/clear", post(clear))
        .route("/status", get(status))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(chat)
}

/// Bind and serve until Ctrl-C.
pub async fn run(config: &GatewayConfig, chat: Arc<DocumentChat>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.host, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Listening on http://{addr}");
    axum::serve(listener, router(chat))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
