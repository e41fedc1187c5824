pub mod config;
pub mod events;
pub mod mode;
pub mod remote;
pub mod sidecar;

use axum::{response::IntoResponse, Json};
use serde_json::json;

/// GET /health - liveness, no token required
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
