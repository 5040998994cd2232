//! Push-based presentation of a run.
//!
//! The runner reports progress through a [`StreamWriter`] trait object and
//! never looks at the concrete sink. Two sinks ship here:
//! - [`ChannelWriter`] queues [`StreamEvent`]s for an interactive display loop
//! - [`PrintWriter`] renders plain text to any `Write`

mod channel;
mod event;
mod print;

pub use channel::ChannelWriter;
pub use event::{StreamEvent, ToolCallInfo, ToolResultInfo};
pub use print::PrintWriter;

use crate::memory::MemoryOutcome;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Receives the events of exactly one run.
#[async_trait]
pub trait StreamWriter: Send + Sync {
    /// A model call is about to start for `agent`.
    async fn begin_turn(&self, _agent: &str) {}

    async fn text_delta(&self, text: &str);

    async fn text_done(&self, text: &str);

    async fn reasoning_delta(&self, text: &str);

    async fn reasoning_done(&self, text: &str);

    async fn tool_start(&self, call: &ToolCallInfo);

    async fn tool_result(&self, result: &ToolResultInfo);

    async fn agent_start(&self, agent: &str, depth: usize);

    async fn agent_end(&self, agent: &str, depth: usize, elapsed: Duration);

    async fn memory_event(&self, outcome: &MemoryOutcome);

    async fn error(&self, message: &str);

    /// The top-level run finished.
    async fn done(&self, text: &str);
}

/// A shared writer.
pub type SharedWriter = Arc<dyn StreamWriter>;

/// A writer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWriter;

#[async_trait]
impl StreamWriter for NullWriter {
    async fn text_delta(&self, _text: &str) {}
    async fn text_done(&self, _text: &str) {}
    async fn reasoning_delta(&self, _text: &str) {}
    async fn reasoning_done(&self, _text: &str) {}
    async fn tool_start(&self, _call: &ToolCallInfo) {}
    async fn tool_result(&self, _result: &ToolResultInfo) {}
    async fn agent_start(&self, _agent: &str, _depth: usize) {}
    async fn agent_end(&self, _agent: &str, _depth: usize, _elapsed: Duration) {}
    async fn memory_event(&self, _outcome: &MemoryOutcome) {}
    async fn error(&self, _message: &str) {}
    async fn done(&self, _text: &str) {}
}
