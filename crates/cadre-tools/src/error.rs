//! Tool error types.

use cadre_sandbox::SandboxError;
use cadre_storage::StorageError;
use thiserror::Error;

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors that can occur during tool execution.
///
/// Every variant except [`ToolError::MissingContext`] is recoverable: the
/// runner turns it into tool-result text so the model can adjust.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// A required binary is not on the search path.
    #[error("Missing dependency: {0}")]
    Dependency(String),

    #[error("agent {0} cannot delegate to itself")]
    SelfDelegation(String),

    #[error("agent {agent} timed out after {elapsed}")]
    DelegationTimeout { agent: String, elapsed: String },

    /// The tool context lacks a collaborator the tool cannot run without.
    #[error("Missing tool context: {0}")]
    MissingContext(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed(message.into())
    }

    pub fn missing_context(what: impl Into<String>) -> Self {
        Self::MissingContext(what.into())
    }

    /// Whether the error must abort the turn instead of being reported to
    /// the model.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingContext(_))
    }

    /// Parse tool arguments, mapping failures to a validation error.
    pub fn parse_args<T: serde::de::DeserializeOwned>(args: serde_json::Value) -> ToolResult<T> {
        serde_json::from_value(args)
            .map_err(|e| Self::validation(format!("Invalid arguments: {e}")))
    }
}
