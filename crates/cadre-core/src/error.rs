//! Error types for the core crate.

use cadre_provider::ProviderError;
use cadre_storage::StorageError;
use cadre_tools::ToolError;
use thiserror::Error;

/// Result type for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that end a turn.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The agent definition names no model.
    #[error("agent @{0} has no model configured")]
    EmptyModel(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The model stream reported an error.
    #[error("stream error: {0}")]
    Stream(String),

    /// A tool failed in a way the model cannot recover from.
    #[error("tool {tool} failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: ToolError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("cast error: {0}")]
    Cast(#[from] CastError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("cancelled")]
    Cancelled,
}

/// Structured-output casting errors.
#[derive(Debug, Error)]
pub enum CastError {
    /// Every attempt produced invalid output.
    #[error("no valid output after {attempts} attempts: {last_error}")]
    Exhausted { attempts: usize, last_error: String },

    #[error("invalid output schema: {0}")]
    InvalidSchema(String),

    #[error("cancelled")]
    Cancelled,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    #[error("environment variable not found: {name}")]
    EnvVarNotFound { name: String },

    #[error("file reference not found: {path}")]
    FileRefNotFound { path: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
