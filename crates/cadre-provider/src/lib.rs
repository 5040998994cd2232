//! Language model abstraction for cadre.
//!
//! Concrete provider clients live outside this workspace. This crate defines
//! the contract they implement ([`LanguageModel`]), the resolver that maps a
//! model identifier to a client ([`ModelResolver`]), and the message and
//! stream types that flow between them and the runner.

pub mod error;
pub mod message;
pub mod model;
pub mod stream;

#[cfg(test)]
mod mock;

pub use error::{ProviderError, ProviderResult};
pub use message::{ContentPart, ImageSource, Message, Role};
pub use model::{ModelInfo, ModelRef};
pub use stream::{FinishReason, StreamChunk, Usage};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

/// A boxed stream of chunks as returned by [`LanguageModel::generate`].
pub type ChunkStream = BoxStream<'static, ProviderResult<StreamChunk>>;

/// Options for text generation.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// System prompt supplied out of band of the message list.
    pub system: Option<String>,
    /// Tools the model may call.
    pub tools: Vec<ToolDefinition>,
    pub abort: Option<tokio_util::sync::CancellationToken>,
}

/// A tool definition offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool parameters.
    pub parameters: Value,
}

/// The main trait for language models.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a streaming response.
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> ProviderResult<ChunkStream>;

    /// Generate a JSON value shaped by `schema`.
    ///
    /// The default implementation asks for JSON in the system prompt, collects
    /// the streamed text and parses it. Providers with native structured
    /// output should override this.
    async fn generate_object(
        &self,
        messages: Vec<Message>,
        schema: Value,
        mut options: GenerateOptions,
    ) -> ProviderResult<Value> {
        let instruction = format!(
            "Respond only with a JSON value that conforms to this JSON schema:\n{}",
            serde_json::to_string_pretty(&schema)?
        );
        options.system = Some(match options.system.take() {
            Some(existing) => format!("{existing}\n\n{instruction}"),
            None => instruction,
        });
        options.tools.clear();

        let stream = self.generate(messages, options).await?;
        let text = collect_text(stream).await?;
        let body = strip_code_fence(&text);
        serde_json::from_str(body).map_err(|e| {
            ProviderError::invalid_response(format!("model did not return valid JSON: {e}"))
        })
    }

    /// Information about this model.
    fn model_info(&self) -> &ModelInfo;

    /// The provider id (e.g., "anthropic", "openai").
    fn provider_id(&self) -> &str {
        &self.model_info().provider_id
    }
}

/// A boxed language model for dynamic dispatch.
pub type BoxedLanguageModel = Arc<dyn LanguageModel>;

/// Maps a model identifier (`provider/model` or a bare model id) to a client.
#[async_trait]
pub trait ModelResolver: Send + Sync {
    async fn resolve(&self, model_id: &str) -> ProviderResult<BoxedLanguageModel>;
}

/// Drain a chunk stream and return the concatenated text deltas.
pub async fn collect_text(mut stream: ChunkStream) -> ProviderResult<String> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            StreamChunk::TextDelta(delta) => text.push_str(&delta),
            StreamChunk::Error(message) => return Err(ProviderError::invalid_response(message)),
            _ => {}
        }
    }
    Ok(text)
}

/// Strip a surrounding Markdown code fence, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use serde_json::json;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_generate_object_parses_fenced_json() {
        let provider = MockProvider::new();
        provider.expect_text("```json\n{\"name\": \"cadre\"}\n```");

        let value = provider
            .generate_object(
                vec![Message::user("extract")],
                json!({"type": "object"}),
                GenerateOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(value, json!({"name": "cadre"}));
        let system = provider.last_options().and_then(|o| o.system).unwrap();
        assert!(system.contains("JSON schema"));
    }

    #[tokio::test]
    async fn test_generate_object_rejects_prose() {
        let provider = MockProvider::new();
        provider.expect_text("I cannot do that");

        let err = provider
            .generate_object(
                vec![Message::user("extract")],
                json!({"type": "object"}),
                GenerateOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_collect_text_surfaces_stream_error() {
        let provider = MockProvider::new();
        provider.expect_stream_error("overloaded");
        let stream = provider
            .generate(vec![Message::user("hi")], GenerateOptions::default())
            .await
            .unwrap();
        assert!(collect_text(stream).await.is_err());
    }
}
