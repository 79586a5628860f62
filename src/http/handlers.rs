use super::state::AppState;
use crate::control::ControlMessage;
use crate::session::StreamState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct PushAudioRequest {
    /// Audio file to play (any format symphonia can decode)
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub command: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// Hand a message to the command worker; 202 once queued
fn enqueue(state: &AppState, msg: ControlMessage) -> Response {
    let command = msg.kind().to_string();

    match state.controller.push(msg) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(CommandResponse {
                command,
                status: "accepted".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!("Rejected '{}' command: {}", command, e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /control/push-audio
pub async fn push_audio(
    State(state): State<AppState>,
    Json(req): Json<PushAudioRequest>,
) -> impl IntoResponse {
    if !req.path.is_file() {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Audio file not found: {}", req.path.display()),
        );
    }

    info!("Queueing audio file {}", req.path.display());
    enqueue(&state, ControlMessage::push_audio(req.path))
}

/// POST /control/interrupt
pub async fn interrupt(State(state): State<AppState>) -> impl IntoResponse {
    enqueue(&state, ControlMessage::Interrupt)
}

/// POST /control/flush
pub async fn flush(State(state): State<AppState>) -> impl IntoResponse {
    enqueue(&state, ControlMessage::Flush)
}

/// POST /control/stop
/// Stop the command worker and end the session
pub async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stop requested over HTTP");
    let response = enqueue(&state, ControlMessage::Stop);
    state.shutdown.cancel();
    response
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.status.snapshot()))
}

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.status.state() {
        StreamState::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "STOPPED"),
        _ => (StatusCode::OK, "OK"),
    }
}
