use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::super::IPCServer;
use crate::config::ConfigError;
use crate::remote::{RemoteConnection, RemoteConnectionManager};

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub id: String,
}

/// Apply `change` and persist the result. If persisting fails the manager is
/// put back the way it was.
async fn mutate_and_persist<F>(state: &IPCServer, change: F) -> Result<Vec<RemoteConnection>, ConfigError>
where
    F: FnOnce(&mut RemoteConnectionManager),
{
    let mut remote = state.remote.write().await;
    let previous = (remote.list(), remote.active_id().map(str::to_string));

    change(&mut *remote);

    let persisted = state
        .config
        .lock()
        .await
        .set_remote_connections(remote.list(), remote.active_id().map(str::to_string))
        .map(|_| ());
    if let Err(e) = persisted {
        tracing::error!("Failed to persist remote connections: {}", e);
        *remote = RemoteConnectionManager::with_connections(remote.verifier(), previous.0, previous.1);
        return Err(e);
    }
    Ok(remote.list())
}

fn list_response(result: Result<Vec<RemoteConnection>, ConfigError>) -> Response {
    match result {
        Ok(list) => Json(list).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/remote
pub async fn list(State(state): State<IPCServer>) -> impl IntoResponse {
    Json(state.remote.read().await.list())
}

/// POST /api/remote - upsert by id
pub async fn add(
    State(state): State<IPCServer>,
    Json(conn): Json<RemoteConnection>,
) -> impl IntoResponse {
    list_response(mutate_and_persist(&state, |remote| remote.add_connection(conn)).await)
}

/// DELETE /api/remote/:id - unknown ids are not an error
pub async fn remove(
    State(state): State<IPCServer>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    list_response(
        mutate_and_persist(&state, |remote| {
            if !remote.remove_connection(&id) {
                tracing::debug!("Remove of unknown remote connection '{}'", id);
            }
        })
        .await,
    )
}

/// POST /api/remote/verify - probe without storing
pub async fn verify(
    State(state): State<IPCServer>,
    Json(conn): Json<RemoteConnection>,
) -> impl IntoResponse {
    // the probe must not hold the manager lock
    let verifier = state.remote.read().await.verifier();
    let result = verifier.verify(&conn).await;
    if result.is_ok() {
        tracing::info!("Verified remote {} ({})", conn.display_name(), conn.base_url());
    } else {
        tracing::warn!(
            "Remote {} ({}) failed verification: {:?}, {}",
            conn.display_name(),
            conn.base_url(),
            result.status,
            result.detail
        );
    }
    Json(result)
}

/// PUT /api/remote/active - {id}
pub async fn set_active(
    State(state): State<IPCServer>,
    Json(request): Json<SetActiveRequest>,
) -> impl IntoResponse {
    match mutate_and_persist(&state, |remote| remote.set_active(request.id)).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/remote/active - the active connection, or null
pub async fn get_active(State(state): State<IPCServer>) -> impl IntoResponse {
    let active = state.remote.read().await.get_active().cloned();
    Json(active)
}
