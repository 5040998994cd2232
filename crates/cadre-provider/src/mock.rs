//! Mock provider for unit tests.

use crate::{
    model::ModelInfo, stream::StreamChunk, ChunkStream, FinishReason, GenerateOptions,
    LanguageModel, Message, ProviderError, ProviderResult, Usage,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum MockResponse {
    Text(String),
    StreamError(String),
}

pub struct MockProvider {
    model: ModelInfo,
    responses: Arc<Mutex<Vec<MockResponse>>>,
    last_options: Arc<Mutex<Option<GenerateOptions>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            model: ModelInfo::new("mock-model", "mock"),
            responses: Arc::new(Mutex::new(Vec::new())),
            last_options: Arc::new(Mutex::new(None)),
        }
    }

    pub fn expect_text(&self, text: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push(MockResponse::Text(text.into()));
    }

    pub fn expect_stream_error(&self, message: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .push(MockResponse::StreamError(message.into()));
    }

    pub fn last_options(&self) -> Option<GenerateOptions> {
        self.last_options.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for MockProvider {
    async fn generate(
        &self,
        _messages: Vec<Message>,
        options: GenerateOptions,
    ) -> ProviderResult<ChunkStream> {
        *self.last_options.lock().unwrap() = Some(options);

        let response = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                MockResponse::Text("Mock response".to_string())
            } else {
                responses.remove(0)
            }
        };

        let chunks = match response {
            MockResponse::Text(text) => vec![
                StreamChunk::TextStart,
                StreamChunk::TextDelta(text),
                StreamChunk::TextEnd,
                StreamChunk::FinishStep {
                    usage: Usage::new(10, 5),
                    finish_reason: FinishReason::EndTurn,
                },
            ],
            MockResponse::StreamError(message) => vec![StreamChunk::Error(message)],
        };

        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok::<_, ProviderError>))))
    }

    fn model_info(&self) -> &ModelInfo {
        &self.model
    }
}
