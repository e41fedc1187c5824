use axum::{extract::State, response::IntoResponse, Json};
use serde_json::Value;

use super::super::IPCServer;
use crate::remote::RemoteConnectionManager;

/// Keys whose change means the remote manager must be reloaded.
const REMOTE_KEYS: [&str; 2] = ["remoteConnections", "activeConnectionId"];

/// GET /api/config
pub async fn get_config(State(state): State<IPCServer>) -> impl IntoResponse {
    let config = state.config.lock().await.get().clone();
    Json(config)
}

/// PATCH /api/config - shallow merge over the stored record
///
/// Locks remote then config, the same order the remote routes use, so the
/// manager and the stored list cannot drift apart.
pub async fn save_config(
    State(state): State<IPCServer>,
    Json(partial): Json<Value>,
) -> impl IntoResponse {
    let mut remote = state.remote.write().await;
    let mut store = state.config.lock().await;

    let merged = match store.merge(&partial) {
        Ok(config) => config.clone(),
        Err(e) => {
            tracing::warn!("Config merge rejected: {}", e);
            return e.into_response();
        }
    };

    let touches_remote = partial
        .as_object()
        .map(|obj| REMOTE_KEYS.iter().any(|k| obj.contains_key(*k)))
        .unwrap_or(false);
    if touches_remote {
        *remote = RemoteConnectionManager::with_connections(
            remote.verifier(),
            merged.remote_connections.clone(),
            merged.active_connection_id.clone(),
        );
        tracing::info!(
            "Remote connections reloaded from config ({} stored)",
            merged.remote_connections.len()
        );
    }

    Json(merged).into_response()
}
