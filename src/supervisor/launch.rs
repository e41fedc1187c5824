//! Where the engine binary lives and how it is invoked per mode.

use std::path::{Path, PathBuf};

use super::error::SidecarError;
use crate::mode::AppMode;

/// Engine binary name, without platform suffix.
pub const ENGINE_BINARY: &str = "gomikrobot";

/// Environment variable telling the engine which shell mode launched it.
pub const MODE_ENV: &str = "MIKROBOT_DESKTOP_MODE";

pub fn executable_name() -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", ENGINE_BINARY)
    } else {
        ENGINE_BINARY.to_string()
    }
}

/// Arguments passed to the engine for `mode`.
pub fn launch_args(mode: AppMode) -> Vec<String> {
    vec![
        "gateway".to_string(),
        "--desktop-mode".to_string(),
        mode.as_str().to_string(),
    ]
}

pub fn launch_env(mode: AppMode) -> Vec<(String, String)> {
    vec![(MODE_ENV.to_string(), mode.as_str().to_string())]
}

/// Default lookup order. `full` prefers the binary bundled next to the shell,
/// `standalone` prefers the user's own install under `~/.gomikrobot/bin`.
pub fn default_candidates(mode: AppMode) -> Vec<PathBuf> {
    let exe = executable_name();

    let bundled: Vec<PathBuf> = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .map(|dir| vec![dir.join("bin").join(&exe), dir.join(&exe)])
        .unwrap_or_default();

    let user: Vec<PathBuf> = crate::utils::home_dir()
        .map(|home| vec![home.join(".gomikrobot").join("bin").join(&exe)])
        .unwrap_or_default();

    match mode {
        AppMode::Standalone => user.into_iter().chain(bundled).collect(),
        _ => bundled.into_iter().chain(user).collect(),
    }
}

/// The override wins when given, even if it does not exist; otherwise the
/// first existing default candidate.
pub fn resolve_executable(
    mode: AppMode,
    override_path: Option<&Path>,
) -> Result<PathBuf, SidecarError> {
    if let Some(path) = override_path {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(SidecarError::NotFound(format!(
                "configured path {} does not exist",
                path.display()
            )))
        };
    }

    let candidates = default_candidates(mode);
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| {
            let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
            SidecarError::NotFound(format!("searched {}", searched.join(", ")))
        })
}
