//! Events pushed from a run to its presentation sink.

use crate::memory::MemoryOutcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool call as shown to presenters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallInfo {
    pub id: String,
    pub name: String,
    /// Raw JSON input.
    pub input: Value,
    /// Shell command, when the tool runs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Presenters should not show a spinner.
    #[serde(default)]
    pub quiet: bool,
}

impl ToolCallInfo {
    /// Build display info, pulling `command` and `description` out of the input.
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        let field = |key: &str| input.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            id: id.into(),
            name: name.into(),
            command: field("command"),
            description: field("description"),
            input,
            quiet: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

/// A finished tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultInfo {
    pub id: String,
    pub name: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub metadata: Value,
}

impl ToolResultInfo {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One unit of progress from a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta { text: String },
    /// A text block finished; carries the full block.
    TextDone { text: String },
    ReasoningDelta { text: String },
    ReasoningDone { text: String },
    ToolStart { call: ToolCallInfo },
    ToolResult { result: ToolResultInfo },
    AgentStart { agent: String, depth: usize },
    AgentEnd {
        agent: String,
        depth: usize,
        duration_ms: u64,
    },
    Memory { outcome: MemoryOutcome },
    Error { message: String },
    /// The top-level run finished with this reply.
    Done { text: String },
}
