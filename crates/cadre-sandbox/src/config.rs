//! Sandbox configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Default command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default per-stream output ceiling (1 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Sandbox settings. Unset limits fall back to the defaults above.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Directory every working directory is confined to. Defaults to the
    /// process working directory.
    pub base_dir: Option<PathBuf>,

    /// Timeout applied when a call does not supply one.
    pub timeout_seconds: Option<u64>,

    /// Ceiling applied independently to stdout and stderr.
    pub max_output_bytes: Option<usize>,

    /// Extra environment for every command.
    pub env: HashMap<String, String>,
}

impl SandboxConfig {
    /// Config rooted at `base_dir` with default limits.
    pub fn with_base(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            ..Default::default()
        }
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes.unwrap_or(DEFAULT_MAX_OUTPUT_BYTES)
    }

    /// Merge with another config (other takes precedence where set).
    pub fn merge(self, other: Self) -> Self {
        let mut env = self.env;
        env.extend(other.env);
        Self {
            base_dir: other.base_dir.or(self.base_dir),
            timeout_seconds: other.timeout_seconds.or(self.timeout_seconds),
            max_output_bytes: other.max_output_bytes.or(self.max_output_bytes),
            env,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.timeout_seconds(), 120);
        assert_eq!(config.max_output_bytes(), 1024 * 1024);
        assert!(config.base_dir.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SandboxConfig = serde_json::from_str(r#"{"timeout_seconds": 30}"#).unwrap();
        assert_eq!(config.timeout_seconds(), 30);
        assert_eq!(config.max_output_bytes(), DEFAULT_MAX_OUTPUT_BYTES);
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let base = SandboxConfig::with_base("/srv/a");
        let overlay = SandboxConfig {
            max_output_bytes: Some(4096),
            env: HashMap::from([("K".to_string(), "V".to_string())]),
            ..Default::default()
        };
        let merged = base.merge(overlay);
        assert_eq!(merged.base_dir, Some(PathBuf::from("/srv/a")));
        assert_eq!(merged.max_output_bytes(), 4096);
        assert_eq!(merged.env.get("K").map(String::as_str), Some("V"));
    }

    #[test]
    fn test_merge_restores_default_valued_setting() {
        let global = SandboxConfig {
            timeout_seconds: Some(30),
            ..Default::default()
        };
        let project = SandboxConfig {
            timeout_seconds: Some(DEFAULT_TIMEOUT_SECS),
            ..Default::default()
        };
        let merged = global.clone().merge(project);
        assert_eq!(merged.timeout_seconds(), DEFAULT_TIMEOUT_SECS);

        let untouched = global.merge(SandboxConfig::default());
        assert_eq!(untouched.timeout_seconds(), 30);
    }
}
