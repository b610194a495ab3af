//! PPID HTTP API
//!
//! Axum server shared by the messaging gateway and the operator CLI. Runs
//! alongside the Unix socket console server.
//!
//! Each endpoint is a thin axum handler over an inner function returning
//! `(StatusCode, Value)`; tests call the inner functions directly.
//!
//! Endpoints:
//! - GET  /health        liveness plus transport and index status
//! - GET  /version       server version info
//! - POST /command       any `OperatorCommand` as JSON
//! - POST /inbound       gateway pushes one inbound chat message
//! - POST /connection    gateway pushes connection state and pairing QR

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use ppid_core::ipc::{ConnectionState, OperatorCommand, OperatorEvent, OperatorResponse};

use crate::app::App;
use crate::subsystems::dispatch::Dispatcher;
use crate::transport::{remove_credentials, ConnectionUpdate, InboundMessage};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub app: Arc<App>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/command", post(command_handler))
        .route("/inbound", post(inbound_handler))
        .route("/connection", post(connection_handler))
        .with_state(state)
}

/// Serve on the configured address until the shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!(
        "{}:{}",
        state.app.config.http.host, state.app.config.http.port
    );

    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("PPID HTTP API listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

fn error_body(msg: impl Into<String>) -> Value {
    json!({ "error": msg.into(), "status": "error" })
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub async fn health_inner(app: &App) -> (StatusCode, Value) {
    (
        StatusCode::OK,
        json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "socket": app.config.service.socket_path,
            "connected": app.transport.is_connected(),
            "running": app.is_running(),
            "index_chunks": app.retriever.chunk_count().await,
        }),
    )
}

/// Pure, no IO.
pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "ppid/1",
    })
}

pub async fn command_inner(app: &App, command: OperatorCommand) -> (StatusCode, Value) {
    if matches!(command, OperatorCommand::Subscribe) {
        return (
            StatusCode::BAD_REQUEST,
            error_body("subscribe is only available on the console socket"),
        );
    }

    let response = crate::router::handle_command(command, app).await;
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    }
}

/// Queue the message on its chat's worker and return immediately.
pub fn inbound_inner(dispatcher: &Dispatcher, msg: InboundMessage) -> (StatusCode, Value) {
    if msg.chat_id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, error_body("chat_id field is required"));
    }
    dispatcher.dispatch(msg);
    (StatusCode::ACCEPTED, json!({ "queued": true }))
}

pub async fn connection_inner(app: &App, update: ConnectionUpdate) -> (StatusCode, Value) {
    if let Some(code) = update.qr {
        tracing::info!("Pairing QR received from gateway");
        app.emit(OperatorEvent::Qr { code });
    }

    if let Some(state) = update.state {
        app.transport.mark_connection(state);
        tracing::info!(?state, "Transport connection state changed");
        app.emit(OperatorEvent::ConnectionState { state });

        if state == ConnectionState::Close && update.logged_out {
            if let Err(e) = remove_credentials(&app.config.credentials_path()).await {
                tracing::error!(error = %e, "Failed to remove credentials after logout");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body(format!("Failed to remove credentials: {}", e)),
                );
            }
            app.emit(OperatorEvent::LoggedOut);
        }
    }

    (
        StatusCode::OK,
        json!({ "connected": app.transport.is_connected() }),
    )
}

// ============================================================================
// Axum handler wrappers
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.app).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn command_handler(
    State(state): State<Arc<HttpState>>,
    Json(command): Json<OperatorCommand>,
) -> impl IntoResponse {
    let (status, body) = command_inner(&state.app, command).await;
    (status, Json(body))
}

pub async fn inbound_handler(
    State(state): State<Arc<HttpState>>,
    Json(msg): Json<InboundMessage>,
) -> impl IntoResponse {
    let (status, body) = inbound_inner(&state.dispatcher, msg);
    (status, Json(body))
}

pub async fn connection_handler(
    State(state): State<Arc<HttpState>>,
    Json(update): Json<ConnectionUpdate>,
) -> impl IntoResponse {
    let (status, body) = connection_inner(&state.app, update).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert an `OperatorResponse` into an HTTP body value, or an error string.
pub fn response_to_http(response: OperatorResponse) -> std::result::Result<Value, String> {
    if response.is_ok() {
        Ok(response.data.unwrap_or(json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}
