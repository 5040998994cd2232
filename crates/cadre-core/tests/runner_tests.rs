//! Integration tests for the runner.
//!
//! These drive full turns against scripted providers with a real sandbox,
//! real tools, and an in-memory session store.

mod common;

use async_trait::async_trait;
use cadre_core::{
    AgentDefinition, Attachment, DuplicateCheck, MemoryFormation, MemoryOutcome, RunnerConfig,
    RunnerError, StaticCatalog, StreamEvent,
};
use cadre_provider::{FinishReason, StreamChunk, Usage};
use cadre_storage::SessionStore;
use cadre_test_utils::{InMemoryMemoryService, ProviderResponse, RecordingProvider, ScriptedResolver};
use cadre_tools::memory::NewMemory;
use common::{base_config, count, Harness};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn coder() -> AgentDefinition {
    AgentDefinition::new("coder", "test/model").with_system_prompt("You write code.")
}

fn resolver(provider: &RecordingProvider) -> ScriptedResolver {
    ScriptedResolver::new().with_fallback(provider.clone())
}

/// Test that a plain reply streams text and ends with a done event.
#[tokio::test]
async fn test_chat_plain_reply() {
    let provider = RecordingProvider::new().with_response("Hello!");
    let mut harness = Harness::new(resolver(&provider), StaticCatalog::new());

    let reply = harness
        .runner
        .chat(&CancellationToken::new(), &coder(), "Hi")
        .await
        .expect("chat should succeed");
    assert_eq!(reply, "Hello!");

    let events = harness.events();
    assert!(events.contains(&StreamEvent::TextDelta {
        text: "Hello!".into()
    }));
    assert!(events.contains(&StreamEvent::TextDone {
        text: "Hello!".into()
    }));
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Done {
            text: "Hello!".into()
        })
    );

    let call = provider.last_call().expect("provider should be called");
    assert!(call.system_text().iter().any(|s| s.contains("You write code.")));
}

/// Test that the session carries the exchange into the next turn and is persisted.
#[tokio::test]
async fn test_chat_keeps_history_and_persists() {
    let provider = RecordingProvider::new()
        .with_response("First answer")
        .with_response("Second answer");
    let harness = Harness::new(resolver(&provider), StaticCatalog::new());
    let cancel = CancellationToken::new();

    harness.runner.chat(&cancel, &coder(), "First question").await.unwrap();
    harness.runner.chat(&cancel, &coder(), "Second question").await.unwrap();

    let call = provider.last_call().unwrap();
    assert!(call.messages.iter().any(|m| m.text() == "First question"));
    assert!(call.messages.iter().any(|m| m.text() == "First answer"));

    let handle = harness.runner.sessions().get("coder").expect("session should exist");
    let session = handle.lock().await;
    let session_id = session.session_id.clone().expect("session should be persisted");
    let stored = harness.store.list_messages(&session_id).await.unwrap();
    let texts: Vec<String> = stored.iter().map(|m| m.text()).collect();
    assert_eq!(
        texts,
        vec!["First question", "First answer", "Second question", "Second answer"]
    );
}

/// Test that a shell tool call runs in the sandbox and feeds its output back.
#[tokio::test]
async fn test_shell_tool_round_trip() {
    let provider = RecordingProvider::new()
        .with_tool_call(
            "call_1",
            "shell",
            r#"{"command": "echo hi", "description": "Say hi"}"#,
        )
        .with_response("Done");
    let mut harness = Harness::new(resolver(&provider), StaticCatalog::new());
    let agent = coder().with_tools(["shell"]);

    let reply = harness
        .runner
        .chat(&CancellationToken::new(), &agent, "Greet")
        .await
        .unwrap();
    assert_eq!(reply, "Done");
    assert_eq!(provider.call_count(), 2);
    assert!(provider.was_sent("hi"));

    let events = harness.events();
    let start = events
        .iter()
        .position(|e| matches!(e, StreamEvent::ToolStart { call } if call.id == "call_1"))
        .expect("tool_start should be emitted");
    let result = events
        .iter()
        .position(|e| matches!(e, StreamEvent::ToolResult { result } if result.id == "call_1"))
        .expect("tool_result should be emitted");
    assert!(start < result);

    match &events[start] {
        StreamEvent::ToolStart { call } => {
            assert_eq!(call.command.as_deref(), Some("echo hi"));
            assert_eq!(call.description.as_deref(), Some("Say hi"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match &events[result] {
        StreamEvent::ToolResult { result } => {
            assert_eq!(result.output.trim(), "hi");
            assert!(!result.is_error());
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

/// Test that tools outside the agent's grant are not offered and fail softly.
#[tokio::test]
async fn test_ungranted_tool_is_soft_error() {
    let provider = RecordingProvider::new()
        .with_tool_call("call_1", "shell", r#"{"command": "echo hi"}"#)
        .with_response("I could not run it");
    let harness = Harness::new(resolver(&provider), StaticCatalog::new());

    let reply = harness
        .runner
        .chat(&CancellationToken::new(), &coder(), "Run it")
        .await
        .unwrap();
    assert_eq!(reply, "I could not run it");

    let first = &provider.calls()[0];
    assert!(!first.tool_names().contains(&"shell".to_string()));
    assert!(provider.was_sent("unknown tool: shell"));
}

/// Test that malformed tool arguments are reported back to the model.
#[tokio::test]
async fn test_invalid_arguments_are_soft_error() {
    let provider = RecordingProvider::new()
        .with_tool_call("call_1", "shell", "{not json")
        .with_response("Retrying later");
    let harness = Harness::new(resolver(&provider), StaticCatalog::new());
    let agent = coder().with_tools(["*"]);

    let reply = harness
        .runner
        .chat(&CancellationToken::new(), &agent, "Run it")
        .await
        .unwrap();
    assert_eq!(reply, "Retrying later");
    assert!(provider.was_sent("invalid JSON arguments"));
}

/// Test that an agent without a model fails before any model is resolved.
#[tokio::test]
async fn test_empty_model_is_rejected() {
    let provider = RecordingProvider::new();
    let resolver = resolver(&provider);
    let mut harness = Harness::new(resolver.clone(), StaticCatalog::new());
    let agent = AgentDefinition::new("coder", "  ");

    let err = harness
        .runner
        .chat(&CancellationToken::new(), &agent, "Hi")
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::EmptyModel(ref h) if h == "coder"));
    assert!(resolver.resolved().is_empty());
    assert_eq!(provider.call_count(), 0);

    let events = harness.events();
    assert_eq!(count(&events, |e| matches!(e, StreamEvent::Error { .. })), 1);
    assert_eq!(count(&events, |e| matches!(e, StreamEvent::Done { .. })), 0);
}

/// Test that a stream error ends the turn and leaves the session untouched.
#[tokio::test]
async fn test_stream_error_rolls_back_turn() {
    let provider = RecordingProvider::new()
        .with_stream_error("partial", "connection reset")
        .with_response("Recovered");
    let mut harness = Harness::new(resolver(&provider), StaticCatalog::new());
    let cancel = CancellationToken::new();

    let err = harness.runner.chat(&cancel, &coder(), "Hi").await.unwrap_err();
    assert!(matches!(err, RunnerError::Stream(ref m) if m == "connection reset"));

    let events = harness.events();
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::Error { message } if message.contains("connection reset")
    )));

    harness.runner.chat(&cancel, &coder(), "Hi again").await.unwrap();
    let call = provider.calls()[1].clone();
    assert!(!call.messages.iter().any(|m| m.text() == "Hi"));
    assert!(!call.messages.iter().any(|m| m.text() == "partial"));
}

/// Test that a stateful tool without a session aborts the turn.
#[tokio::test]
async fn test_missing_session_context_is_fatal() {
    let provider = RecordingProvider::new()
        .with_tool_call(
            "call_1",
            "todowrite",
            r#"{"todos": [{"content": "Plan", "status": "pending"}]}"#,
        )
        .with_response("unreachable");
    let mut harness = Harness::without_store(resolver(&provider), StaticCatalog::new());
    let agent = coder().with_tools(["todowrite"]);

    let err = harness
        .runner
        .chat(&CancellationToken::new(), &agent, "Plan it")
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Tool { ref tool, .. } if tool == "todowrite"));
    assert_eq!(provider.call_count(), 1);

    let events = harness.events();
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::ToolResult { result } if result.name == "todowrite" && result.is_error()
    )));
}

/// Test that todowrite reports transitions through tool metadata.
#[tokio::test]
async fn test_todowrite_with_session() {
    let provider = RecordingProvider::new()
        .with_tool_call(
            "call_1",
            "todowrite",
            r#"{"todos": [{"content": "Write tests", "status": "in_progress", "active_form": "Writing tests"}]}"#,
        )
        .with_response("Started");
    let mut harness = Harness::new(resolver(&provider), StaticCatalog::new());
    let agent = coder().with_tools(["todowrite"]);

    harness
        .runner
        .chat(&CancellationToken::new(), &agent, "Plan it")
        .await
        .unwrap();

    let events = harness.events();
    let result = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::ToolResult { result } => Some(result.clone()),
            _ => None,
        })
        .expect("tool_result should be emitted");
    assert!(!result.is_error());
    assert_eq!(result.metadata["just_started"], "Writing tests");
}

/// Test that the loop falls back to the last non-empty text.
#[tokio::test]
async fn test_reply_falls_back_to_last_text() {
    let provider = RecordingProvider::new()
        .with_chunks(vec![
            StreamChunk::TextDelta("Let me check".into()),
            StreamChunk::ToolCall {
                id: "call_1".into(),
                name: "shell".into(),
                arguments: r#"{"command": "true"}"#.into(),
            },
            StreamChunk::FinishStep {
                usage: Usage::new(10, 5),
                finish_reason: FinishReason::ToolUse,
            },
        ])
        .with_chunks(vec![StreamChunk::FinishStep {
            usage: Usage::new(10, 0),
            finish_reason: FinishReason::EndTurn,
        }]);
    let harness = Harness::new(resolver(&provider), StaticCatalog::new());
    let agent = coder().with_tools(["shell"]);

    let reply = harness
        .runner
        .chat(&CancellationToken::new(), &agent, "Check")
        .await
        .unwrap();
    assert_eq!(reply, "Let me check");
}

/// Test that the step budget bounds a model that keeps calling tools.
#[tokio::test]
async fn test_max_steps_bounds_loop() {
    let provider = RecordingProvider::new().with_default_response(ProviderResponse::ToolCall {
        id: "call".into(),
        name: "shell".into(),
        arguments: r#"{"command": "true"}"#.into(),
    });
    let harness = Harness::with(resolver(&provider), StaticCatalog::new(), |builder| {
        builder.config(RunnerConfig {
            max_steps: Some(3),
            ..base_config()
        })
    });
    let agent = coder().with_tools(["shell"]);

    harness
        .runner
        .chat(&CancellationToken::new(), &agent, "Loop")
        .await
        .expect("hitting the step budget is not an error");
    assert_eq!(provider.call_count(), 3);
}

/// Test that an output schema casts the reply into validated JSON.
#[tokio::test]
async fn test_output_schema_casts_reply() {
    let provider = RecordingProvider::new()
        .with_response("The score is seven")
        .with_response(r#"{"score": 7}"#);
    let mut harness = Harness::new(resolver(&provider), StaticCatalog::new());
    let agent = coder().with_output_schema(json!({
        "type": "object",
        "properties": {"score": {"type": "integer"}},
        "required": ["score"]
    }));

    let reply = harness
        .runner
        .chat(&CancellationToken::new(), &agent, "Rate it")
        .await
        .unwrap();
    assert_eq!(reply, "{\n  \"score\": 7\n}");
    assert!(provider.was_sent("The score is seven"));

    let events = harness.events();
    assert_eq!(events.last(), Some(&StreamEvent::Done { text: reply }));
}

/// Test that the first chat turn titles the persisted session once.
#[tokio::test]
async fn test_first_turn_generates_title() {
    let provider = RecordingProvider::new()
        .with_response("Sure")
        .with_response("Again");
    let harness = Harness::new(resolver(&provider), StaticCatalog::new());
    let titles = harness.titles.clone().with_response("\"Greeting exchange\"");
    let cancel = CancellationToken::new();

    harness.runner.chat(&cancel, &coder(), "Hello there").await.unwrap();
    harness.drain().await;
    harness.runner.chat(&cancel, &coder(), "And again").await.unwrap();
    harness.drain().await;

    assert_eq!(titles.call_count(), 1);
    assert!(titles.was_sent("Hello there"));
    assert_eq!(provider.call_count(), 2);

    let handle = harness.runner.sessions().get("coder").unwrap();
    let session_id = handle.lock().await.session_id.clone().unwrap();
    let record = harness.store.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(record.title.as_deref(), Some("Greeting exchange"));
}

/// Test that the agent's model titles the session when no title model is set.
#[tokio::test]
async fn test_title_falls_back_to_agent_model() {
    let provider = RecordingProvider::new()
        .with_response("Sure")
        .with_response("Agent titled");
    let harness = Harness::with(resolver(&provider), StaticCatalog::new(), |builder| {
        builder.config(RunnerConfig::default())
    });

    harness
        .runner
        .chat(&CancellationToken::new(), &coder(), "Hello there")
        .await
        .unwrap();
    harness.drain().await;

    assert_eq!(provider.call_count(), 2);
    assert_eq!(harness.titles.call_count(), 0);
    let handle = harness.runner.sessions().get("coder").unwrap();
    let session_id = handle.lock().await.session_id.clone().unwrap();
    let record = harness.store.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(record.title.as_deref(), Some("Agent titled"));
}

/// Test that one-shot text runs inline attachments and keep no chat session.
#[tokio::test]
async fn test_text_with_attachment() {
    let provider = RecordingProvider::new().with_response("Summary");
    let harness = Harness::new(resolver(&provider), StaticCatalog::new());

    let reply = harness
        .runner
        .text(
            &CancellationToken::new(),
            &coder(),
            "Summarize",
            &[Attachment::bytes("notes.txt", "alpha beta")],
        )
        .await
        .unwrap();
    assert_eq!(reply, "Summary");
    assert!(provider.was_sent("<file name=\"notes.txt\">"));
    assert!(provider.was_sent("alpha beta"));
    assert!(harness.runner.sessions().is_empty());
}

/// Test that cancelling a turn stops a hanging stream.
#[tokio::test]
async fn test_cancel_stops_turn() {
    let provider = RecordingProvider::new().with_hang();
    let harness = Harness::new(resolver(&provider), StaticCatalog::new());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        harness.runner.chat(&cancel, &coder(), "Wait"),
    )
    .await
    .expect("cancellation should end the turn")
    .unwrap_err();
    assert!(matches!(err, RunnerError::Cancelled));
}

struct RememberEverything;

#[async_trait]
impl MemoryFormation for RememberEverything {
    async fn extract(
        &self,
        _agent: &str,
        user: &str,
        _assistant: &str,
    ) -> anyhow::Result<Option<NewMemory>> {
        Ok(Some(NewMemory {
            content: format!("User said: {user}"),
            category: Some("conversation".into()),
            agent: None,
        }))
    }

    async fn check_duplicate(&self, _candidate: &NewMemory) -> anyhow::Result<DuplicateCheck> {
        Ok(DuplicateCheck::Unique)
    }
}

/// Test that memory-enabled agents see relevant memories and form new ones.
#[tokio::test]
async fn test_memory_context_and_formation() {
    let provider = RecordingProvider::new().with_response("Tabs it is");
    let memory =
        Arc::new(InMemoryMemoryService::new().with_memory("User prefers tabs", Some("preference")));
    let service = Arc::clone(&memory);
    let mut harness = Harness::with(resolver(&provider), StaticCatalog::new(), move |builder| {
        builder
            .memory(service)
            .formation(Arc::new(RememberEverything))
    });
    let agent = coder().with_memory(true);

    harness
        .runner
        .chat(&CancellationToken::new(), &agent, "Use tabs please")
        .await
        .unwrap();
    harness.drain().await;

    let call = provider.calls()[0].clone();
    assert!(call.system_text().iter().any(|s| s.contains("User prefers tabs")));

    let events = harness.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, StreamEvent::Memory { outcome: MemoryOutcome::Created { .. } })));

    let records = memory.records();
    assert_eq!(records.len(), 2);
    let formed = records
        .iter()
        .find(|r| r.content == "User said: Use tabs please")
        .expect("memory should be formed");
    assert_eq!(formed.agent.as_deref(), Some("coder"));
}

/// Test that agents without memory skip both context and formation.
#[tokio::test]
async fn test_memory_disabled_agent() {
    let provider = RecordingProvider::new().with_response("Ok");
    let memory =
        Arc::new(InMemoryMemoryService::new().with_memory("User prefers tabs", None));
    let service = Arc::clone(&memory);
    let mut harness = Harness::with(resolver(&provider), StaticCatalog::new(), move |builder| {
        builder
            .memory(service)
            .formation(Arc::new(RememberEverything))
    });

    harness
        .runner
        .chat(&CancellationToken::new(), &coder(), "Use tabs please")
        .await
        .unwrap();
    harness.drain().await;

    let call = provider.last_call().unwrap();
    assert!(!call.system_text().iter().any(|s| s.contains("User prefers tabs")));
    assert_eq!(memory.records().len(), 1);
    assert_eq!(
        count(&harness.events(), |e| matches!(e, StreamEvent::Memory { .. })),
        0
    );
}
