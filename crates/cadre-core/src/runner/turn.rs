//! The step loop: stream the model, run requested tools, repeat.

use super::RunnerServices;
use crate::agent::AgentDefinition;
use crate::error::{RunnerError, RunnerResult};
use crate::stream::{ToolCallInfo, ToolResultInfo};
use cadre_provider::{
    BoxedLanguageModel, ChunkStream, ContentPart, GenerateOptions, Message, Role, StreamChunk,
};
use cadre_tools::delegate::AGENT_CALL_TOOL;
use cadre_tools::{ToolContext, ToolRegistry};
use futures::StreamExt;
use serde_json::Value;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a step needs besides the message history.
pub(super) struct StepContext<'a> {
    pub services: &'a RunnerServices,
    pub agent: &'a AgentDefinition,
    pub model: &'a BoxedLanguageModel,
    pub tools: &'a ToolRegistry,
    pub session_id: Option<&'a str>,
    pub depth: usize,
    pub cancel: &'a CancellationToken,
}

#[derive(Debug)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

#[derive(Debug, Default)]
struct StepOutput {
    text: String,
    reasoning: String,
    calls: Vec<PendingCall>,
}

/// Run model steps until the model stops calling tools or the step budget
/// is spent. Returns the reply text.
pub(super) async fn run_steps(ctx: StepContext<'_>, mut messages: Vec<Message>) -> RunnerResult<String> {
    let max_steps = ctx.services.config.max_steps();
    let definitions = ctx.tools.definitions();
    let tool_ctx = tool_context(&ctx);

    let mut final_text = String::new();
    let mut last_text = String::new();

    for step in 1..=max_steps {
        if ctx.cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }
        debug!(agent = %ctx.agent.handle, step, "Starting step");

        ctx.services.writer.begin_turn(&ctx.agent.handle).await;
        let options = GenerateOptions {
            tools: definitions.clone(),
            abort: Some(ctx.cancel.child_token()),
            ..Default::default()
        };
        let stream = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(RunnerError::Cancelled),
            stream = ctx.model.generate(messages.clone(), options) => stream?,
        };
        let output = consume(&ctx, stream).await?;

        if !output.text.trim().is_empty() {
            last_text = output.text.clone();
        }
        final_text = output.text.clone();

        if output.calls.is_empty() {
            break;
        }

        let mut assistant = Vec::new();
        if !output.reasoning.is_empty() {
            assistant.push(ContentPart::Thinking {
                text: output.reasoning,
            });
        }
        if !output.text.is_empty() {
            assistant.push(ContentPart::text(output.text));
        }
        for call in &output.calls {
            assistant.push(ContentPart::tool_use(
                &call.id,
                &call.name,
                parse_arguments(&call.arguments).unwrap_or(Value::Null),
            ));
        }
        messages.push(Message::new(Role::Assistant, assistant));

        info!(agent = %ctx.agent.handle, count = output.calls.len(), "Executing tool calls");
        for call in output.calls {
            let result = execute(&ctx, &tool_ctx, call).await?;
            messages.push(result);
        }

        if step == max_steps {
            warn!(agent = %ctx.agent.handle, max_steps, "Max steps reached");
        }
    }

    if final_text.trim().is_empty() {
        final_text = last_text;
    }
    Ok(final_text)
}

fn tool_context(ctx: &StepContext<'_>) -> ToolContext {
    let mut tool_ctx = ToolContext::new(&ctx.agent.handle, ctx.services.sandbox.base_dir());
    tool_ctx.depth = ctx.depth;
    tool_ctx.abort = ctx.cancel.child_token();
    if let Some(session_id) = ctx.session_id {
        tool_ctx = tool_ctx.with_session(session_id);
    }
    if let Some(store) = &ctx.services.session_store {
        tool_ctx = tool_ctx.with_store(store.clone());
    }
    tool_ctx
}

/// Translate one model stream into writer events and collect its output.
async fn consume(ctx: &StepContext<'_>, mut stream: ChunkStream) -> RunnerResult<StepOutput> {
    let writer = &ctx.services.writer;
    let mut output = StepOutput::default();
    let mut text_block = String::new();
    let mut reasoning_block = String::new();

    loop {
        let next = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(RunnerError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };

        match chunk? {
            StreamChunk::TextStart | StreamChunk::ReasoningStart => {}
            StreamChunk::TextDelta(delta) => {
                writer.text_delta(&delta).await;
                text_block.push_str(&delta);
                output.text.push_str(&delta);
            }
            StreamChunk::TextEnd => {
                writer.text_done(&text_block).await;
                text_block.clear();
            }
            StreamChunk::ReasoningDelta(delta) => {
                writer.reasoning_delta(&delta).await;
                reasoning_block.push_str(&delta);
                output.reasoning.push_str(&delta);
            }
            StreamChunk::ReasoningEnd => {
                writer.reasoning_done(&reasoning_block).await;
                reasoning_block.clear();
            }
            StreamChunk::ToolCallStart { id, name } => {
                debug!(id = %id, name = %name, "Tool call started");
                output.calls.push(PendingCall {
                    id,
                    name,
                    arguments: String::new(),
                });
            }
            StreamChunk::ToolCallDelta { id, delta } => {
                if let Some(call) = output.calls.iter_mut().find(|c| c.id == id) {
                    call.arguments.push_str(&delta);
                }
            }
            StreamChunk::ToolCall {
                id,
                name,
                arguments,
            } => match output.calls.iter_mut().find(|c| c.id == id) {
                Some(call) => call.arguments = arguments,
                None => output.calls.push(PendingCall {
                    id,
                    name,
                    arguments,
                }),
            },
            StreamChunk::FinishStep {
                usage,
                finish_reason,
            } => {
                debug!(
                    input = usage.input_tokens,
                    output = usage.output_tokens,
                    reason = ?finish_reason,
                    "Step finished"
                );
            }
            StreamChunk::Error(message) => return Err(RunnerError::Stream(message)),
        }
    }

    if !text_block.is_empty() {
        writer.text_done(&text_block).await;
    }
    if !reasoning_block.is_empty() {
        writer.reasoning_done(&reasoning_block).await;
    }
    Ok(output)
}

fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
}

/// Run one tool call and return the tool-result message.
///
/// Soft failures become error results the model can react to; fatal ones
/// end the turn.
async fn execute(
    ctx: &StepContext<'_>,
    tool_ctx: &ToolContext,
    call: PendingCall,
) -> RunnerResult<Message> {
    let writer = &ctx.services.writer;
    let tool = ctx.tools.get(&call.name);

    let (input, parse_error) = match parse_arguments(&call.arguments) {
        Ok(input) => (input, None),
        Err(e) => (
            Value::String(call.arguments.clone()),
            Some(format!("invalid JSON arguments: {e}")),
        ),
    };

    let info = ToolCallInfo::new(&call.id, &call.name, input.clone())
        .quiet(tool.is_some_and(|t| t.quiet()));
    writer.tool_start(&info).await;

    let started = Instant::now();
    let (output, error, metadata, fatal) = match (tool, parse_error) {
        (None, _) => {
            let message = format!("unknown tool: {}", call.name);
            (format!("Error: {message}"), Some(message), Value::Null, None)
        }
        (Some(_), Some(message)) => (format!("Error: {message}"), Some(message), Value::Null, None),
        (Some(tool), None) => match tool.execute(input, tool_ctx).await {
            Ok(out) => {
                let error = out.is_error.then(|| out.output.clone());
                (out.output, error, out.metadata, None)
            }
            Err(e) if e.is_fatal() => (format!("Error: {e}"), Some(e.to_string()), Value::Null, Some(e)),
            Err(e) => {
                debug!(tool = %call.name, error = %e, "Tool failed");
                (format!("Error: {e}"), Some(e.to_string()), Value::Null, None)
            }
        },
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    // A completed delegation is already framed by agent_start/agent_end.
    if call.name != AGENT_CALL_TOOL || error.is_some() {
        writer
            .tool_result(&ToolResultInfo {
                id: call.id.clone(),
                name: call.name.clone(),
                output: output.clone(),
                error: error.clone(),
                duration_ms,
                metadata,
            })
            .await;
    }

    if let Some(source) = fatal {
        warn!(tool = %call.name, error = %source, "Fatal tool error");
        return Err(RunnerError::Tool {
            tool: call.name,
            source,
        });
    }

    Ok(Message::tool_result(call.id, output, error.is_some()))
}
