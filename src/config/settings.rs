//! Shell tunables - `config/desktop.toml`
//!
//! ```toml
//! listen_addr = "127.0.0.1:18795"
//!
//! [supervisor]
//! log_buffer_size = 5000
//! stop_grace_ms = 5000
//! kill_wait_ms = 2000
//!
//! [remote]
//! verify_timeout_ms = 5000
//!
//! [ipc]
//! auth_disabled = false
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_PATH_ENV: &str = "MIKROBOT_DESKTOP_SETTINGS";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ShellSettings {
    pub listen_addr: String,
    pub supervisor: SupervisorSettings,
    pub remote: RemoteSettings,
    pub ipc: IpcSettings,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Ring capacity for captured sidecar output.
    pub log_buffer_size: usize,
    /// How long a gracefully signalled sidecar gets before it is killed.
    pub stop_grace_ms: u64,
    /// How long to wait for the exit after a forced kill.
    pub kill_wait_ms: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RemoteSettings {
    pub verify_timeout_ms: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct IpcSettings {
    /// Skip `X-Mikrobot-Token` checks (development only).
    pub auth_disabled: bool,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:18795".to_string(),
            supervisor: SupervisorSettings::default(),
            remote: RemoteSettings::default(),
            ipc: IpcSettings::default(),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            log_buffer_size: 5_000,
            stop_grace_ms: 5_000,
            kill_wait_ms: 2_000,
        }
    }
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            verify_timeout_ms: 5_000,
        }
    }
}

impl SupervisorSettings {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn kill_wait(&self) -> Duration {
        Duration::from_millis(self.kill_wait_ms)
    }
}

impl RemoteSettings {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

impl ShellSettings {
    pub fn default_path() -> PathBuf {
        std::env::var_os(SETTINGS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config").join("desktop.toml"))
    }

    /// Load from the default location; a missing file means defaults.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("invalid settings in {}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut settings: Self = toml::from_str(content)?;
        if settings.supervisor.log_buffer_size == 0 {
            tracing::warn!("log_buffer_size = 0 is not usable, keeping 1 line");
            settings.supervisor.log_buffer_size = 1;
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = ShellSettings::parse("").unwrap();
        assert_eq!(settings, ShellSettings::default());
        assert_eq!(settings.supervisor.stop_grace(), Duration::from_secs(5));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let settings = ShellSettings::parse(
            r#"
            listen_addr = "127.0.0.1:40000"

            [supervisor]
            log_buffer_size = 64

            [remote]
            verify_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(settings.listen_addr, "127.0.0.1:40000");
        assert_eq!(settings.supervisor.log_buffer_size, 64);
        assert_eq!(settings.supervisor.kill_wait_ms, 2_000);
        assert_eq!(settings.remote.verify_timeout(), Duration::from_millis(250));
        assert!(!settings.ipc.auth_disabled);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let settings = ShellSettings::parse("[supervisor]\nlog_buffer_size = 0\n").unwrap();
        assert_eq!(settings.supervisor.log_buffer_size, 1);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = ShellSettings::load_from(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(settings, ShellSettings::default());
    }

    #[test]
    fn malformed_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("desktop.toml");
        std::fs::write(&path, "listen_addr = [").unwrap();
        assert!(ShellSettings::load_from(&path).is_err());
    }
}
