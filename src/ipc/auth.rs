//! IPC token authentication.
//!
//! A random token is generated at startup and written to a file only the
//! current user can read. The UI reads that file and sends the token in the
//! `X-Mikrobot-Token` header; anything else under `/api` gets 401.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{IPCServer, TOKEN_HEADER};

/// At most one auth-failure warning per window.
const FAILURE_LOG_WINDOW: Duration = Duration::from_secs(30);

pub fn token_file_path() -> PathBuf {
    crate::utils::app_config_dir().join(".ipc_token")
}

pub struct IpcAuth {
    token: Option<String>,
    last_failure_log: Mutex<Option<Instant>>,
    suppressed: AtomicU64,
}

impl IpcAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            last_failure_log: Mutex::new(None),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Accept every request. Development only.
    pub fn disabled() -> Self {
        Self {
            token: None,
            last_failure_log: Mutex::new(None),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Generate a fresh token and write it to `path` (0600 on unix).
    pub fn generate_and_save(path: &Path) -> anyhow::Result<Self> {
        let token = uuid::Uuid::new_v4().to_string();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &token)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!("IPC auth token saved to {}", path.display());
        Ok(Self::new(token))
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    fn accepts(&self, provided: &str) -> bool {
        match &self.token {
            Some(expected) => provided == expected,
            None => true,
        }
    }

    fn log_failure(&self, uri: &axum::http::Uri, provided: &str) {
        let should_log = {
            let mut last = self.last_failure_log.lock().unwrap_or_else(|e| e.into_inner());
            match *last {
                Some(t) if t.elapsed() < FAILURE_LOG_WINDOW => false,
                _ => {
                    *last = Some(Instant::now());
                    true
                }
            }
        };
        if !should_log {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let hint = if provided.is_empty() {
            "(empty)"
        } else {
            provided.get(..8).unwrap_or(provided)
        };
        let suppressed = self.suppressed.swap(0, Ordering::Relaxed);
        if suppressed > 0 {
            tracing::warn!(
                "IPC auth failed for {}: got={}… (suppressed {} previous)",
                uri,
                hint,
                suppressed
            );
        } else {
            tracing::warn!("IPC auth failed for {}: got={}…", uri, hint);
        }
    }
}

/// axum middleware: `X-Mikrobot-Token` check
pub async fn auth_middleware(
    State(state): State<IPCServer>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if state.auth.accepts(provided) {
        Ok(next.run(req).await)
    } else {
        state.auth.log_failure(req.uri(), provided);
        Err(StatusCode::UNAUTHORIZED)
    }
}
