//! Persisted application config - `<config dir>/mikrobot-desktop/config.json`
//!
//! The store keeps the loaded record in memory and writes it back on every
//! mutation. A mutation that fails to reach disk leaves the in-memory record
//! untouched.

pub mod settings;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::mode::AppMode;
use crate::remote::RemoteConnection;

pub use settings::ShellSettings;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "MIKROBOT_DESKTOP_CONFIG";

/// Main window geometry. Owned by the window layer; the core only stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
}

impl Default for WindowState {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            x: None,
            y: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Persisted default mode; launch flags take precedence over it.
    pub mode: Option<AppMode>,
    /// Overrides the sidecar executable lookup when set.
    pub sidecar_path: Option<String>,
    pub window_state: WindowState,
    pub remote_connections: Vec<RemoteConnection>,
    pub active_connection_id: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config {path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config update: {0}")]
    InvalidPatch(String),
}

impl ConfigError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPatch(_) => StatusCode::BAD_REQUEST,
            Self::Read { .. } | Self::Write { .. } | Self::Parse { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "CONFIG_UNREADABLE",
            Self::Write { .. } => "CONFIG_UNWRITABLE",
            Self::Parse { .. } => "CONFIG_CORRUPT",
            Self::InvalidPatch(_) => "INVALID_CONFIG",
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }
}

impl axum::response::IntoResponse for ConfigError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        (status, axum::Json(self.to_json())).into_response()
    }
}

/// Sole writer of the persisted config record.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: AppConfig,
}

impl ConfigStore {
    /// `$MIKROBOT_DESKTOP_CONFIG`, or `config.json` under the app config dir.
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| crate::utils::app_config_dir().join("config.json"))
    }

    /// Load the record at `path`. A missing file yields defaults; an
    /// unreadable or corrupt one is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let current = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            AppConfig::default()
        };

        tracing::info!(
            "Loaded config from {} ({} remote connections)",
            path.display(),
            current.remote_connections.len()
        );
        Ok(Self { path, current })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> &AppConfig {
        &self.current
    }

    /// Replace the whole record.
    pub fn save(&mut self, config: AppConfig) -> Result<&AppConfig, ConfigError> {
        self.write_to_disk(&config)?;
        self.current = config;
        Ok(&self.current)
    }

    /// Shallow merge: top-level keys of `partial` replace the same keys of
    /// the current record, every other field is left alone.
    pub fn merge(&mut self, partial: &Value) -> Result<&AppConfig, ConfigError> {
        let patch = partial
            .as_object()
            .ok_or_else(|| ConfigError::InvalidPatch("expected a JSON object".to_string()))?;

        let mut merged = serde_json::to_value(&self.current)
            .map_err(|e| ConfigError::InvalidPatch(e.to_string()))?;
        if let Some(fields) = merged.as_object_mut() {
            for (key, value) in patch {
                fields.insert(key.clone(), value.clone());
            }
        }

        let config: AppConfig =
            serde_json::from_value(merged).map_err(|e| ConfigError::InvalidPatch(e.to_string()))?;
        self.save(config)
    }

    pub fn set_mode(&mut self, mode: AppMode) -> Result<&AppConfig, ConfigError> {
        let mut config = self.current.clone();
        config.mode = Some(mode);
        self.save(config)
    }

    pub fn set_window_state(&mut self, state: WindowState) -> Result<&AppConfig, ConfigError> {
        let mut config = self.current.clone();
        config.window_state = state;
        self.save(config)
    }

    pub fn set_remote_connections(
        &mut self,
        connections: Vec<RemoteConnection>,
        active_id: Option<String>,
    ) -> Result<&AppConfig, ConfigError> {
        let mut config = self.current.clone();
        config.remote_connections = connections;
        config.active_connection_id = active_id;
        self.save(config)
    }

    fn write_to_disk(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::InvalidPatch(e.to_string()))?;

        // temp file + rename so a crash mid-write never truncates the record
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;

        tracing::debug!("Saved config to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conn(id: &str) -> RemoteConnection {
        RemoteConnection {
            id: id.to_string(),
            name: format!("engine {}", id),
            host: "10.0.0.5".to_string(),
            port: 18790,
            token: Some("secret".to_string()),
            use_tls: false,
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(tmp.path().join("config.json")).unwrap();
        assert_eq!(store.get(), &AppConfig::default());
        assert_eq!(store.get().window_state.width, 1280);
    }

    #[test]
    fn corrupt_file_is_a_hard_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = ConfigStore::open(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.error_code(), "CONFIG_CORRUPT");
    }

    #[test]
    fn save_round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");

        let mut store = ConfigStore::open(&path).unwrap();
        store.set_mode(AppMode::Full).unwrap();
        store
            .set_remote_connections(vec![conn("a"), conn("b")], Some("b".to_string()))
            .unwrap();

        let reopened = ConfigStore::open(&path).unwrap();
        assert_eq!(reopened.get().mode, Some(AppMode::Full));
        assert_eq!(reopened.get().remote_connections.len(), 2);
        assert_eq!(reopened.get().remote_connections[0].id, "a");
        assert_eq!(reopened.get().active_connection_id.as_deref(), Some("b"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn merge_only_touches_given_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::open(tmp.path().join("config.json")).unwrap();
        store.set_mode(AppMode::Remote).unwrap();

        let merged = store.merge(&json!({ "sidecarPath": "/x" })).unwrap();
        assert_eq!(merged.sidecar_path.as_deref(), Some("/x"));
        assert_eq!(merged.mode, Some(AppMode::Remote));

        assert_eq!(store.get().sidecar_path.as_deref(), Some("/x"));
        assert_eq!(store.get().mode, Some(AppMode::Remote));
    }

    #[test]
    fn merge_can_clear_optional_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::open(tmp.path().join("config.json")).unwrap();
        store.merge(&json!({ "sidecarPath": "/opt/engine" })).unwrap();
        store.merge(&json!({ "sidecarPath": null })).unwrap();
        assert_eq!(store.get().sidecar_path, None);
    }

    #[test]
    fn invalid_merge_leaves_state_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let mut store = ConfigStore::open(&path).unwrap();
        store.set_mode(AppMode::Full).unwrap();

        let err = store.merge(&json!({ "mode": "warp-speed" })).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPatch(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(store.get().mode, Some(AppMode::Full));

        assert!(store.merge(&json!(["not", "an", "object"])).is_err());
        assert_eq!(ConfigStore::open(&path).unwrap().get().mode, Some(AppMode::Full));
    }

    #[test]
    fn window_state_is_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let mut store = ConfigStore::open(&path).unwrap();
        let state = WindowState {
            width: 900,
            height: 600,
            x: Some(10),
            y: Some(-20),
        };
        store.set_window_state(state).unwrap();
        assert_eq!(ConfigStore::open(&path).unwrap().get().window_state, state);
    }

    #[test]
    fn partial_record_on_disk_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{ "mode": "full" }"#).unwrap();

        let store = ConfigStore::open(&path).unwrap();
        assert_eq!(store.get().mode, Some(AppMode::Full));
        assert!(store.get().remote_connections.is_empty());
        assert_eq!(store.get().window_state, WindowState::default());
    }
}
