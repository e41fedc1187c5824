use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use super::super::IPCServer;
use crate::mode::AppMode;

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: AppMode,
}

/// GET /api/mode
pub async fn get_mode(State(state): State<IPCServer>) -> impl IntoResponse {
    let mode = *state.active_mode.read().await;
    Json(json!({ "mode": mode }))
}

/// PUT /api/mode - persists and becomes the active mode.
/// Does not touch a running sidecar.
pub async fn set_mode(
    State(state): State<IPCServer>,
    Json(request): Json<ModeRequest>,
) -> impl IntoResponse {
    if let Err(e) = state.config.lock().await.set_mode(request.mode) {
        tracing::error!("Failed to persist mode: {}", e);
        return e.into_response();
    }
    *state.active_mode.write().await = request.mode;
    tracing::info!("Mode set to {}", request.mode);
    Json(json!({ "mode": request.mode })).into_response()
}
