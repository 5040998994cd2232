use super::{StreamEvent, StreamWriter, ToolCallInfo, ToolResultInfo};
use crate::memory::MemoryOutcome;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Queues events on an mpsc channel for a display loop.
///
/// Sends wait for capacity, so a slow consumer applies backpressure to the
/// run. Once the receiver is dropped events are discarded.
#[derive(Debug, Clone)]
pub struct ChannelWriter {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelWriter {
    /// Create a writer and the receiving half of its queue.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    async fn send(&self, event: StreamEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("Event receiver closed, dropping event");
        }
    }
}

#[async_trait]
impl StreamWriter for ChannelWriter {
    async fn text_delta(&self, text: &str) {
        self.send(StreamEvent::TextDelta {
            text: text.to_string(),
        })
        .await;
    }

    async fn text_done(&self, text: &str) {
        self.send(StreamEvent::TextDone {
            text: text.to_string(),
        })
        .await;
    }

    async fn reasoning_delta(&self, text: &str) {
        self.send(StreamEvent::ReasoningDelta {
            text: text.to_string(),
        })
        .await;
    }

    async fn reasoning_done(&self, text: &str) {
        self.send(StreamEvent::ReasoningDone {
            text: text.to_string(),
        })
        .await;
    }

    async fn tool_start(&self, call: &ToolCallInfo) {
        self.send(StreamEvent::ToolStart { call: call.clone() })
            .await;
    }

    async fn tool_result(&self, result: &ToolResultInfo) {
        self.send(StreamEvent::ToolResult {
            result: result.clone(),
        })
        .await;
    }

    async fn agent_start(&self, agent: &str, depth: usize) {
        self.send(StreamEvent::AgentStart {
            agent: agent.to_string(),
            depth,
        })
        .await;
    }

    async fn agent_end(&self, agent: &str, depth: usize, elapsed: Duration) {
        self.send(StreamEvent::AgentEnd {
            agent: agent.to_string(),
            depth,
            duration_ms: elapsed.as_millis() as u64,
        })
        .await;
    }

    async fn memory_event(&self, outcome: &MemoryOutcome) {
        self.send(StreamEvent::Memory {
            outcome: outcome.clone(),
        })
        .await;
    }

    async fn error(&self, message: &str) {
        self.send(StreamEvent::Error {
            message: message.to_string(),
        })
        .await;
    }

    async fn done(&self, text: &str) {
        self.send(StreamEvent::Done {
            text: text.to_string(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (writer, mut rx) = ChannelWriter::new(16);
        writer.begin_turn("coder").await;
        writer.text_delta("Hel").await;
        writer.text_delta("lo").await;
        writer
            .tool_start(&ToolCallInfo::new("c1", "shell", json!({"command": "ls"})))
            .await;
        writer.done("Hello").await;
        drop(writer);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            StreamEvent::TextDelta {
                text: "Hel".into()
            }
        );
        assert!(matches!(&events[2], StreamEvent::ToolStart { call } if call.id == "c1"));
        assert_eq!(
            events[3],
            StreamEvent::Done {
                text: "Hello".into()
            }
        );
    }

    #[tokio::test]
    async fn test_closed_receiver_is_ignored() {
        let (writer, rx) = ChannelWriter::new(1);
        drop(rx);
        writer.error("boom").await;
        writer.done("").await;
    }
}
