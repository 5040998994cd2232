//! Confined command execution for cadre tools.
//!
//! Every shell or external-tool call goes through [`Sandbox`], which:
//!
//! - rejects blank commands before spawning anything
//! - confines the working directory to a base directory
//! - enforces a timeout and honours parent cancellation
//! - caps stdout and stderr independently
//!
//! # Example
//!
//! ```rust,no_run
//! use cadre_sandbox::{Sandbox, SandboxConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let sandbox = Sandbox::new(SandboxConfig::with_base("/tmp/work"))?;
//! let result = sandbox
//!     .run("echo hello", None, None, &CancellationToken::new())
//!     .await?;
//! assert_eq!(result.stdout, "hello\n");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod output;
pub mod path;

pub use config::{SandboxConfig, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_SECS};
pub use error::{SandboxError, SandboxResult};
pub use executor::{ExecRequest, Invocation, Sandbox};

use serde::{Deserialize, Serialize};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Result of a sandboxed command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecResult {
    /// A result for a command that never ran.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            exit_code: -1,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Exit 0, no error, no timeout and nothing dropped.
    pub fn is_clean_success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none() && !self.timed_out && !self.truncated
    }

    /// The JSON envelope.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::Value::Null)
    }

    /// Text handed back to the model: raw stdout on clean success, the JSON
    /// envelope otherwise.
    pub fn render(&self) -> String {
        if self.is_clean_success() {
            self.stdout.clone()
        } else {
            self.to_json().to_string()
        }
    }
}
