use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

use super::super::IPCServer;
use crate::mode::AppMode;

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub since: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    /// Defaults to the active mode.
    #[serde(default)]
    pub mode: Option<AppMode>,
}

/// GET /api/sidecar/status
pub async fn status(State(state): State<IPCServer>) -> impl IntoResponse {
    Json(state.supervisor.status())
}

/// GET /api/sidecar/logs?since=<id> - all retained lines, or those after `since`
pub async fn logs(
    State(state): State<IPCServer>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let lines = match query.since {
        Some(since) => state.supervisor.logs_since(since),
        None => state.supervisor.logs(),
    };
    Json(lines)
}

/// POST /api/sidecar/start - {mode?}
pub async fn start(
    State(state): State<IPCServer>,
    payload: Option<Json<StartRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let mode = match request.mode {
        Some(mode) => mode,
        None => *state.active_mode.read().await,
    };
    let executable = state
        .config
        .lock()
        .await
        .get()
        .sidecar_path
        .as_ref()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from);

    match state.supervisor.start(mode, executable).await {
        Ok(status) => (StatusCode::OK, Json(json!({ "status": status }))).into_response(),
        Err(e) => {
            tracing::warn!("Sidecar start ({}) refused: {}", mode, e);
            (
                e.status_code(),
                Json(json!({
                    "status": state.supervisor.status(),
                    "error": e.to_json(),
                })),
            )
                .into_response()
        }
    }
}

/// POST /api/sidecar/stop
pub async fn stop(State(state): State<IPCServer>) -> impl IntoResponse {
    let status = state.supervisor.stop().await;
    Json(json!({ "status": status }))
}
