//! Scripted provider implementations.
//!
//! Providers that record interactions and return queued responses.

use async_stream::try_stream;
use async_trait::async_trait;
use cadre_provider::{
    BoxedLanguageModel, ChunkStream, ContentPart, FinishReason, GenerateOptions, LanguageModel,
    Message, ModelInfo, ModelResolver, ProviderError, ProviderResult, StreamChunk, Usage,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A recorded call to `generate`.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub options: GenerateOptions,
}

impl RecordedCall {
    /// Concatenated system message text.
    pub fn system_text(&self) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| m.role == cadre_provider::Role::System)
            .map(|m| m.text())
            .collect()
    }

    /// Names of the tools offered in this call.
    pub fn tool_names(&self) -> Vec<String> {
        self.options.tools.iter().map(|t| t.name.clone()).collect()
    }
}

/// A response the provider can return.
#[derive(Debug, Clone)]
pub enum ProviderResponse {
    Text(String),
    TextWithThinking { thinking: String, text: String },
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    /// Several tool calls in one step: (id, name, arguments).
    MultipleToolCalls(Vec<(String, String, String)>),
    /// Fail the `generate` call itself.
    Error(String),
    /// Yield an error chunk mid-stream after some text.
    StreamError { text: String, message: String },
    /// A stream that never yields.
    Hang,
    Chunks(Vec<StreamChunk>),
}

impl Default for ProviderResponse {
    fn default() -> Self {
        ProviderResponse::Text("Test response".to_string())
    }
}

/// A provider that records every call and replays queued responses.
///
/// Clones share the queue and the recording, so a test can keep one clone
/// for inspection while the runner owns another.
#[derive(Clone)]
pub struct RecordingProvider {
    model: ModelInfo,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    responses: Arc<Mutex<Vec<ProviderResponse>>>,
    default_response: Arc<Mutex<ProviderResponse>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self {
            model: ModelInfo::new("test-model", "test"),
            calls: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: Arc::new(Mutex::new(ProviderResponse::default())),
        }
    }

    pub fn with_model(mut self, model: ModelInfo) -> Self {
        self.model = model;
        self
    }

    fn push(self, response: ProviderResponse) -> Self {
        self.responses.lock().unwrap().push(response);
        self
    }

    /// Queue a text response.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.push(ProviderResponse::Text(text.into()))
    }

    pub fn with_thinking_response(
        self,
        thinking: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.push(ProviderResponse::TextWithThinking {
            thinking: thinking.into(),
            text: text.into(),
        })
    }

    /// Queue a single tool call.
    pub fn with_tool_call(self, id: &str, name: &str, arguments: &str) -> Self {
        self.push(ProviderResponse::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        })
    }

    pub fn with_tool_calls(self, calls: &[(&str, &str, &str)]) -> Self {
        self.push(ProviderResponse::MultipleToolCalls(
            calls
                .iter()
                .map(|(id, name, args)| (id.to_string(), name.to_string(), args.to_string()))
                .collect(),
        ))
    }

    /// Queue a failed `generate` call.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push(ProviderResponse::Error(message.into()))
    }

    /// Queue a stream that fails after emitting `text`.
    pub fn with_stream_error(self, text: impl Into<String>, message: impl Into<String>) -> Self {
        self.push(ProviderResponse::StreamError {
            text: text.into(),
            message: message.into(),
        })
    }

    pub fn with_hang(self) -> Self {
        self.push(ProviderResponse::Hang)
    }

    pub fn with_chunks(self, chunks: Vec<StreamChunk>) -> Self {
        self.push(ProviderResponse::Chunks(chunks))
    }

    /// Response returned once the queue is empty.
    pub fn with_default_response(self, response: ProviderResponse) -> Self {
        *self.default_response.lock().unwrap() = response;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.lock().unwrap().last().cloned()
    }

    /// Responses still queued.
    pub fn pending_responses(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    /// Whether any text part of any recorded message contains `text`.
    pub fn was_sent(&self, text: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|call| {
            call.messages.iter().any(|msg| {
                msg.content.iter().any(|part| match part {
                    ContentPart::Text { text: t } => t.contains(text),
                    ContentPart::ToolResult { content, .. } => content.contains(text),
                    _ => false,
                })
            })
        })
    }
}

impl Default for RecordingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for RecordingProvider {
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> ProviderResult<ChunkStream> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall { messages, options });

        let response = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                self.default_response.lock().unwrap().clone()
            } else {
                responses.remove(0)
            }
        };

        if let ProviderResponse::Error(message) = &response {
            return Err(ProviderError::internal(message.clone()));
        }

        Ok(Box::pin(try_stream! {
            match response {
                ProviderResponse::Text(text) => {
                    yield StreamChunk::TextStart;
                    yield StreamChunk::TextDelta(text);
                    yield StreamChunk::TextEnd;
                    yield StreamChunk::FinishStep {
                        usage: Usage::new(100, 50),
                        finish_reason: FinishReason::EndTurn,
                    };
                }
                ProviderResponse::TextWithThinking { thinking, text } => {
                    yield StreamChunk::ReasoningStart;
                    yield StreamChunk::ReasoningDelta(thinking);
                    yield StreamChunk::ReasoningEnd;
                    yield StreamChunk::TextStart;
                    yield StreamChunk::TextDelta(text);
                    yield StreamChunk::TextEnd;
                    yield StreamChunk::FinishStep {
                        usage: Usage {
                            input_tokens: 100,
                            output_tokens: 50,
                            reasoning_tokens: 30,
                        },
                        finish_reason: FinishReason::EndTurn,
                    };
                }
                ProviderResponse::ToolCall { id, name, arguments } => {
                    yield StreamChunk::ToolCallStart { id: id.clone(), name: name.clone() };
                    yield StreamChunk::ToolCall { id, name, arguments };
                    yield StreamChunk::FinishStep {
                        usage: Usage::new(100, 50),
                        finish_reason: FinishReason::ToolUse,
                    };
                }
                ProviderResponse::MultipleToolCalls(calls) => {
                    for (id, name, arguments) in calls {
                        yield StreamChunk::ToolCallStart { id: id.clone(), name: name.clone() };
                        yield StreamChunk::ToolCall { id, name, arguments };
                    }
                    yield StreamChunk::FinishStep {
                        usage: Usage::new(100, 50),
                        finish_reason: FinishReason::ToolUse,
                    };
                }
                ProviderResponse::StreamError { text, message } => {
                    yield StreamChunk::TextStart;
                    yield StreamChunk::TextDelta(text);
                    yield StreamChunk::Error(message);
                }
                ProviderResponse::Hang => {
                    futures::future::pending::<()>().await;
                }
                ProviderResponse::Chunks(chunks) => {
                    for chunk in chunks {
                        yield chunk;
                    }
                }
                ProviderResponse::Error(message) => {
                    Err(ProviderError::internal(message))?;
                }
            }
        }))
    }

    fn model_info(&self) -> &ModelInfo {
        &self.model
    }
}

/// A resolver backed by a fixed table of models.
#[derive(Clone, Default)]
pub struct ScriptedResolver {
    models: Arc<Mutex<HashMap<String, BoxedLanguageModel>>>,
    fallback: Option<BoxedLanguageModel>,
    resolved: Arc<Mutex<Vec<String>>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model under `id`.
    pub fn with_model(self, id: &str, model: impl LanguageModel + 'static) -> Self {
        self.models
            .lock()
            .unwrap()
            .insert(id.to_string(), Arc::new(model));
        self
    }

    /// Model returned for ids that are not registered.
    pub fn with_fallback(mut self, model: impl LanguageModel + 'static) -> Self {
        self.fallback = Some(Arc::new(model));
        self
    }

    /// Every id passed to `resolve`, in order.
    pub fn resolved(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelResolver for ScriptedResolver {
    async fn resolve(&self, model_id: &str) -> ProviderResult<BoxedLanguageModel> {
        self.resolved.lock().unwrap().push(model_id.to_string());
        if let Some(model) = self.models.lock().unwrap().get(model_id) {
            return Ok(model.clone());
        }
        match &self.fallback {
            Some(model) => Ok(model.clone()),
            None => {
                let (provider, model) = model_id.split_once('/').unwrap_or(("", model_id));
                Err(ProviderError::model_not_found(provider, model))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_provider::collect_text;

    #[tokio::test]
    async fn test_queued_responses_in_order() {
        let provider = RecordingProvider::new()
            .with_response("one")
            .with_response("two");

        let first = provider
            .generate(vec![Message::user("hi")], GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(collect_text(first).await.unwrap(), "one");

        let second = provider
            .generate(vec![Message::user("again")], GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(collect_text(second).await.unwrap(), "two");
        assert_eq!(provider.call_count(), 2);
        assert!(provider.was_sent("again"));
    }

    #[tokio::test]
    async fn test_resolver() {
        let resolver = ScriptedResolver::new().with_model("test/a", RecordingProvider::new());
        assert!(resolver.resolve("test/a").await.is_ok());
        assert!(resolver.resolve("test/b").await.is_err());
        assert_eq!(resolver.resolved(), vec!["test/a", "test/b"]);
    }
}
