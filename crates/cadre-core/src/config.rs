//! Runner configuration.
//!
//! Configuration is loaded from multiple sources and merged:
//! 1. Global config: `<config_dir>/cadre/config.json` (or `cadre.json`, `cadre.jsonc`)
//! 2. Project config: `cadre.jsonc` or `cadre.json` in the project directory
//!
//! Supports JSONC (JSON with comments) and variable substitution:
//! - `{env:VAR_NAME}` - Substitute environment variable
//! - `{file:path}` - Substitute file contents

use crate::error::ConfigError;
use cadre_sandbox::SandboxConfig;
use cadre_tools::delegate::DelegationLimits;
use cadre_util::log::{LogConfig, LogLevel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Default number of model calls per turn.
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Default number of structured-output attempts.
pub const DEFAULT_CAST_ATTEMPTS: usize = 3;

static VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn var_regex() -> &'static regex::Regex {
    VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\{(env|file):([^}]+)\}")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Configuration for a runner and the tools it assembles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Model calls allowed per turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,

    /// Model used for session titles. Falls back to the agent's model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cast_attempts: Option<usize>,

    /// Root for stateful-tool databases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Directory scanned for external tool manifests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<SandboxConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation: Option<DelegationConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogSection>,
}

/// Timeout bounds for `agent_call`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// One of error, warn, info, debug, trace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl RunnerConfig {
    /// Load configuration from all sources.
    ///
    /// Returns the merged config and the files it was read from.
    pub async fn load(project_dir: Option<&Path>) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = RunnerConfig::default();
        let mut sources = Vec::new();

        if let Some(global_dir) = cadre_util::path::config_dir() {
            for name in &["config.json", "cadre.json", "cadre.jsonc"] {
                let path = global_dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        if let Some(dir) = project_dir {
            for name in &["cadre.jsonc", "cadre.json"] {
                let path = dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        Ok((config, sources))
    }

    /// Load configuration from a file.
    pub async fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::substitute_variables(&content, path)?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    /// Parse JSONC (JSON with comments).
    pub fn parse_jsonc(content: &str, source: &str) -> Result<Self, ConfigError> {
        let stripped = strip_comments(content);
        serde_json::from_str(&stripped).map_err(|e| ConfigError::InvalidJson {
            path: source.to_string(),
            message: e.to_string(),
        })
    }

    /// Substitute `{env:..}` and `{file:..}` references.
    ///
    /// File paths are relative to the config file's directory.
    fn substitute_variables(content: &str, config_path: &Path) -> Result<String, ConfigError> {
        let config_dir = config_path.parent().unwrap_or(Path::new("."));
        let mut result = content.to_string();

        for cap in var_regex().captures_iter(content) {
            let (Some(full), Some(kind), Some(value)) = (cap.get(0), cap.get(1), cap.get(2))
            else {
                continue;
            };
            let value = value.as_str();

            let replacement = match kind.as_str() {
                "env" => std::env::var(value).map_err(|_| ConfigError::EnvVarNotFound {
                    name: value.to_string(),
                })?,
                "file" => {
                    let file_path = config_dir.join(value);
                    std::fs::read_to_string(&file_path)
                        .map_err(|_| ConfigError::FileRefNotFound {
                            path: file_path.display().to_string(),
                        })?
                        .trim()
                        .to_string()
                }
                _ => continue,
            };

            result = result.replace(full.as_str(), &replacement);
        }

        Ok(result)
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(self, other: Self) -> Self {
        Self {
            max_steps: merge_option(self.max_steps, other.max_steps),
            title_model: merge_option(self.title_model, other.title_model),
            cast_attempts: merge_option(self.cast_attempts, other.cast_attempts),
            data_dir: merge_option(self.data_dir, other.data_dir),
            tools_dir: merge_option(self.tools_dir, other.tools_dir),
            sandbox: match (self.sandbox, other.sandbox) {
                (Some(base), Some(other)) => Some(base.merge(other)),
                (base, other) => merge_option(base, other),
            },
            delegation: match (self.delegation, other.delegation) {
                (Some(base), Some(other)) => Some(DelegationConfig {
                    default_timeout_seconds: merge_option(
                        base.default_timeout_seconds,
                        other.default_timeout_seconds,
                    ),
                    max_timeout_seconds: merge_option(
                        base.max_timeout_seconds,
                        other.max_timeout_seconds,
                    ),
                }),
                (base, other) => merge_option(base, other),
            },
            log: match (self.log, other.log) {
                (Some(base), Some(other)) => Some(LogSection {
                    level: merge_option(base.level, other.level),
                    file: merge_option(base.file, other.file),
                }),
                (base, other) => merge_option(base, other),
            },
        }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps.unwrap_or(DEFAULT_MAX_STEPS).max(1)
    }

    pub fn cast_attempts(&self) -> usize {
        self.cast_attempts.unwrap_or(DEFAULT_CAST_ATTEMPTS).max(1)
    }

    /// Sandbox config, rooted at `project_dir` unless a base is configured.
    pub fn sandbox_config(&self, project_dir: &Path) -> SandboxConfig {
        SandboxConfig::with_base(project_dir).merge(self.sandbox.clone().unwrap_or_default())
    }

    /// Stateful-tool data root. Defaults to `.cadre` under `project_dir`.
    pub fn data_dir(&self, project_dir: &Path) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| project_dir.join(".cadre"))
    }

    pub fn delegation_limits(&self) -> DelegationLimits {
        let defaults = DelegationLimits::default();
        let Some(delegation) = &self.delegation else {
            return defaults;
        };
        DelegationLimits {
            default_timeout: delegation
                .default_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_timeout),
            max_timeout: delegation
                .max_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_timeout),
        }
    }

    /// Logging setup derived from the `log` section.
    ///
    /// Without a configured file, logs go to the default log path unless
    /// `print` sends them to stderr.
    pub fn log_config(&self, print: bool) -> LogConfig {
        let section = self.log.clone().unwrap_or_default();
        let level = section
            .level
            .as_deref()
            .and_then(LogLevel::parse)
            .unwrap_or_default();
        let file = section
            .file
            .or_else(|| (!print).then(cadre_util::log::default_log_path).flatten());
        LogConfig {
            print,
            level,
            include_location: false,
            file,
        }
    }
}

/// Strip `//` and `/* */` comments outside of strings.
fn strip_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            result.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
            result.push(c);
            continue;
        }

        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            result.push('\n');
                            break;
                        }
                    }
                    continue;
                }
                Some('*') => {
                    chars.next();
                    let mut prev = ' ';
                    for c in chars.by_ref() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        // Keep line numbers stable for parse errors.
                        if c == '\n' {
                            result.push('\n');
                        }
                        prev = c;
                    }
                    continue;
                }
                _ => {}
            }
        }

        result.push(c);
    }

    result
}

fn merge_option<T>(base: Option<T>, other: Option<T>) -> Option<T> {
    other.or(base)
}
