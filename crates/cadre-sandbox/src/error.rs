//! Error types for sandbox operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised before a command is spawned.
///
/// Failures of the process itself (non-zero exit, timeout, spawn failure)
/// are reported inside [`crate::ExecResult`] instead.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("working directory '{path}' escapes the sandbox base '{base}'")]
    PathEscape { path: PathBuf, base: PathBuf },

    #[error("working directory '{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("failed to prepare working directory '{path}': {source}")]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    pub fn path_escape(path: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        Self::PathEscape {
            path: path.into(),
            base: base.into(),
        }
    }

    pub fn working_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WorkingDir {
            path: path.into(),
            source,
        }
    }

    /// Whether this error comes from working-directory confinement.
    pub fn is_confinement(&self) -> bool {
        matches!(self, Self::PathEscape { .. } | Self::NotADirectory(_))
    }
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;
