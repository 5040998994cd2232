//! Tool implementations for cadre agents.
//!
//! - `shell`: confined shell commands
//! - external manifests: declarative wrappers around installed binaries
//! - `todowrite` / `planwrite`: task tracking with change detection
//! - `memory`: long-term memory operations
//! - `agent_call`: delegation to another agent

pub mod delegate;
pub mod error;
pub mod external;
pub mod memory;
pub mod plan;
pub mod registry;
pub mod shell;
pub mod todo;
pub mod tracking;

pub use error::{ToolError, ToolResult};
pub use registry::ToolRegistry;

use async_trait::async_trait;
use cadre_storage::SessionStore;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    /// Persisted session id, when the runner has one.
    pub session_id: Option<String>,
    /// Handle of the agent making the call.
    pub agent: String,
    /// Delegation depth of the calling runner.
    pub depth: usize,
    /// Cancellation token for the current turn.
    pub abort: CancellationToken,
    /// Sandbox base directory.
    pub root_dir: PathBuf,
    pub session_store: Option<Arc<dyn SessionStore>>,
}

impl ToolContext {
    /// A context with no session and no store.
    pub fn new(agent: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_id: None,
            agent: agent.into(),
            depth: 0,
            abort: CancellationToken::new(),
            root_dir: root_dir.into(),
            session_store: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// The session id, or a fatal error if the runner supplied none.
    pub fn require_session(&self) -> ToolResult<&str> {
        self.session_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ToolError::missing_context("session id"))
    }

    /// The session store, or a fatal error if none is configured.
    pub fn require_store(&self) -> ToolResult<&Arc<dyn SessionStore>> {
        self.session_store
            .as_ref()
            .ok_or_else(|| ToolError::missing_context("session store"))
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("session_id", &self.session_id)
            .field("agent", &self.agent)
            .field("depth", &self.depth)
            .field("root_dir", &self.root_dir)
            .field("session_store", &self.session_store.is_some())
            .finish()
    }
}

/// Result of tool execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Title/summary of the operation.
    pub title: String,
    /// Text returned to the model.
    pub output: String,
    /// Tool-specific metadata for rich rendering.
    pub metadata: Value,
    /// The tool ran but reports failure (non-zero exit, timeout).
    pub is_error: bool,
}

impl ToolOutput {
    pub fn new(title: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            output: output.into(),
            metadata: Value::Null,
            is_error: false,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Mark the output as a failed run.
    pub fn failed(mut self, failed: bool) -> Self {
        self.is_error = failed;
        self
    }
}

/// The main trait for tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as the model sees it.
    fn id(&self) -> &str;

    /// Tool description (for the model).
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Presenters should not show a progress indicator for this tool.
    fn quiet(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput>;
}

/// A boxed tool for dynamic dispatch.
pub type BoxedTool = Arc<dyn Tool>;
