//! Supervisor error type - distinguishes the expected refusals so the control
//! surface can hand the UI a machine-readable code next to the status.

use axum::http::StatusCode;
use std::path::PathBuf;

use super::state_machine::SidecarState;

/// Errors returned by `SidecarSupervisor::start`
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SidecarError {
    #[error("No sidecar executable found ({0})")]
    NotFound(String),

    #[error("Sidecar is already {0:?}")]
    AlreadyRunning(SidecarState),

    #[error("Failed to spawn sidecar '{}': {reason}", path.display())]
    SpawnFailed { path: PathBuf, reason: String },

    #[error("{0}")]
    InvalidState(String),
}

impl SidecarError {
    /// HTTP status code mapping
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyRunning(_) | Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::SpawnFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyRunning(_) => "ALREADY_RUNNING",
            Self::SpawnFailed { .. } => "SPAWN_FAILED",
            Self::InvalidState(_) => "INVALID_STATE",
        }
    }
}

impl axum::response::IntoResponse for SidecarError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(self.to_json());
        (status, body).into_response()
    }
}
