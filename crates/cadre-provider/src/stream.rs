//! Streaming response types.

use serde::{Deserialize, Serialize};

/// A chunk from a streaming model response.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    TextStart,
    TextDelta(String),
    TextEnd,

    ReasoningStart,
    ReasoningDelta(String),
    ReasoningEnd,

    /// A tool call is starting; arguments follow as deltas.
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, delta: String },
    /// A tool call with its complete JSON arguments.
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },

    /// One model step is finishing.
    FinishStep {
        usage: Usage,
        finish_reason: FinishReason,
    },

    /// The provider reported an error inside the stream.
    Error(String),
}

impl StreamChunk {
    pub fn text(delta: impl Into<String>) -> Self {
        Self::TextDelta(delta.into())
    }

    pub fn reasoning(delta: impl Into<String>) -> Self {
        Self::ReasoningDelta(delta.into())
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    pub fn finish(finish_reason: FinishReason) -> Self {
        Self::FinishStep {
            usage: Usage::default(),
            finish_reason,
        }
    }

    /// Whether this chunk carries visible output (text, reasoning or a tool call).
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            StreamChunk::TextDelta(_)
                | StreamChunk::ReasoningDelta(_)
                | StreamChunk::ToolCallStart { .. }
                | StreamChunk::ToolCall { .. }
        )
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub reasoning_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            reasoning_tokens: 0,
        }
    }
}

/// Why a step finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    EndTurn,
    Stop,
    MaxTokens,
    ToolUse,
    ContentFilter,
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_classification() {
        assert!(StreamChunk::text("hi").is_content());
        assert!(StreamChunk::reasoning("hmm").is_content());
        assert!(StreamChunk::tool_call("1", "shell", "{}").is_content());
        assert!(!StreamChunk::TextStart.is_content());
        assert!(!StreamChunk::finish(FinishReason::EndTurn).is_content());
    }
}
