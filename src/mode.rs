//! Deployment mode resolution.
//!
//! The mode is decided once at startup, before any process is spawned:
//! a mode flag on the command line beats the persisted default, and with
//! neither present the shell comes up in `standalone` (no local engine).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the shell talks to the bot engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    /// UI plus a locally supervised engine process.
    Full,
    /// UI only, nothing is launched.
    #[default]
    Standalone,
    /// UI pointed at a remote engine.
    Remote,
}

impl AppMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Standalone => "standalone",
            Self::Remote => "remote",
        }
    }

    /// Only `full` launches the sidecar on startup.
    pub fn auto_starts_sidecar(&self) -> bool {
        matches!(self, Self::Full)
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown mode '{0}' (expected full, standalone or remote)")]
pub struct ParseModeError(String);

impl FromStr for AppMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "standalone" => Ok(Self::Standalone),
            "remote" => Ok(Self::Remote),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

/// Derive the active mode from launch arguments and the persisted default.
///
/// Recognized flags are `--mode <m>`, `--mode=<m>`, `--full`, `--standalone`
/// and `--remote`. When several appear the last one wins; unparseable values
/// are skipped rather than treated as errors.
pub fn resolve<S: AsRef<str>>(args: &[S], persisted: Option<AppMode>) -> AppMode {
    mode_from_args(args).or(persisted).unwrap_or_default()
}

fn mode_from_args<S: AsRef<str>>(args: &[S]) -> Option<AppMode> {
    let mut found = None;
    let mut iter = args.iter().map(AsRef::as_ref);

    while let Some(arg) = iter.next() {
        let candidate = match arg {
            "--full" => Some(AppMode::Full),
            "--standalone" => Some(AppMode::Standalone),
            "--remote" => Some(AppMode::Remote),
            "--mode" => iter.next().and_then(|v| v.parse().ok()),
            _ => arg
                .strip_prefix("--mode=")
                .and_then(|v| v.parse().ok()),
        };
        if candidate.is_some() {
            found = candidate;
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_flag_overrides_persisted_mode() {
        let args = ["mikrobot-desktop", "--mode", "remote"];
        assert_eq!(resolve(&args, Some(AppMode::Full)), AppMode::Remote);
    }

    #[test]
    fn persisted_mode_used_without_flag() {
        let args = ["mikrobot-desktop"];
        assert_eq!(resolve(&args, Some(AppMode::Standalone)), AppMode::Standalone);
        assert_eq!(resolve(&args, Some(AppMode::Full)), AppMode::Full);
    }

    #[test]
    fn defaults_to_standalone() {
        let args: [&str; 0] = [];
        assert_eq!(resolve(&args, None), AppMode::Standalone);
    }

    #[test]
    fn equals_form_and_shorthands() {
        assert_eq!(resolve(&["--mode=FULL"], None), AppMode::Full);
        assert_eq!(resolve(&["--remote"], Some(AppMode::Full)), AppMode::Remote);
        assert_eq!(resolve(&["--full", "--standalone"], None), AppMode::Standalone);
    }

    #[test]
    fn invalid_value_falls_through_to_persisted() {
        let args = ["--mode", "turbo"];
        assert_eq!(resolve(&args, Some(AppMode::Full)), AppMode::Full);

        // a dangling --mode swallows nothing and changes nothing
        assert_eq!(resolve(&["--mode"], None), AppMode::Standalone);
    }

    #[test]
    fn resolution_is_deterministic() {
        let args = vec!["--mode".to_string(), "full".to_string()];
        let first = resolve(&args, Some(AppMode::Remote));
        for _ in 0..10 {
            assert_eq!(resolve(&args, Some(AppMode::Remote)), first);
        }
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&AppMode::Standalone).unwrap(), "\"standalone\"");
        let mode: AppMode = serde_json::from_str("\"remote\"").unwrap();
        assert_eq!(mode, AppMode::Remote);
        assert!(!AppMode::Remote.auto_starts_sidecar());
        assert!(AppMode::Full.auto_starts_sidecar());
    }
}
