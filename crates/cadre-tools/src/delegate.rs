//! Agent call tool - delegate a task to another agent.
//!
//! The sub-agent runs as a bounded sub-task: its run gets a child
//! cancellation token and a clamped timeout, and its reply is truncated
//! before it is handed back to the calling model.

use crate::{Tool, ToolContext, ToolError, ToolOutput, ToolResult};
use async_trait::async_trait;
use cadre_util::text::truncate_bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tool name.
pub const AGENT_CALL_TOOL: &str = "agent_call";

/// Largest reply handed back to the caller.
pub const MAX_REPLY_BYTES: usize = 128 * 1024;

const TRUNCATION_MARKER: &str = "\n\n[output truncated]";

/// How long a timed-out run gets to wind down after cancellation.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Timeout bounds for delegated runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegationLimits {
    /// Used when the caller does not ask for a timeout. Also the floor.
    pub default_timeout: Duration,
    /// Ceiling for requested timeouts.
    pub max_timeout: Duration,
}

impl Default for DelegationLimits {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(120),
            max_timeout: Duration::from_secs(300),
        }
    }
}

impl DelegationLimits {
    /// Clamp a requested timeout into `[default_timeout, max_timeout]`.
    pub fn clamp(&self, requested: Option<u64>) -> Duration {
        let floor = self.default_timeout.min(self.max_timeout);
        requested
            .map(Duration::from_secs)
            .unwrap_or(floor)
            .clamp(floor, self.max_timeout)
    }
}

/// A delegated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationRequest {
    /// Normalized handle of the calling agent.
    pub caller: String,
    /// Normalized handle of the target agent.
    pub agent: String,
    pub prompt: String,
    /// Model override for the sub-agent.
    pub model: Option<String>,
    /// Depth of the calling runner.
    pub depth: usize,
}

/// Runs delegated work. Implemented by the runner layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Delegator: Send + Sync {
    /// Whether `agent` (normalized) may be targeted.
    fn is_delegable(&self, agent: &str) -> bool;

    /// Run the request to completion and return the sub-agent's reply.
    async fn delegate(
        &self,
        request: DelegationRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<String>;
}

/// Normalize an agent handle: trim, strip a leading `@`, lowercase.
pub fn normalize_handle(handle: &str) -> String {
    let trimmed = handle.trim();
    trimmed
        .strip_prefix('@')
        .unwrap_or(trimmed)
        .trim()
        .to_lowercase()
}

/// Render a timeout as whole minutes, or fractional when uneven.
fn format_minutes(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}m", secs as f64 / 60.0)
    }
}

#[derive(Debug, Deserialize)]
struct AgentCallArgs {
    agent: String,
    prompt: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

/// Delegate a task to another agent.
pub struct AgentCallTool {
    delegator: Arc<dyn Delegator>,
    limits: DelegationLimits,
}

impl AgentCallTool {
    pub fn new(delegator: Arc<dyn Delegator>, limits: DelegationLimits) -> Self {
        Self { delegator, limits }
    }
}

#[async_trait]
impl Tool for AgentCallTool {
    fn id(&self) -> &str {
        AGENT_CALL_TOOL
    }

    fn description(&self) -> &str {
        r#"Delegate a self-contained task to another agent and return its reply.

Usage notes:
- agent is the handle of the target agent, e.g. "@reviewer".
- The prompt must contain everything the agent needs; it does not see this conversation.
- An agent cannot delegate to itself."#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["agent", "prompt"],
            "properties": {
                "agent": {
                    "type": "string",
                    "description": "Handle of the agent to call"
                },
                "prompt": {
                    "type": "string",
                    "description": "The task for the agent"
                },
                "model": {
                    "type": "string",
                    "description": "Optional model override"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "description": "Timeout in seconds (120-300)"
                }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let args: AgentCallArgs = ToolError::parse_args(args)?;

        let target = normalize_handle(&args.agent);
        if target.is_empty() {
            return Err(ToolError::validation("agent must not be empty"));
        }
        if args.prompt.trim().is_empty() {
            return Err(ToolError::validation("prompt must not be empty"));
        }

        let caller = normalize_handle(&ctx.agent);
        if target == caller {
            return Err(ToolError::SelfDelegation(format!("@{target}")));
        }
        if !self.delegator.is_delegable(&target) {
            return Err(ToolError::permission_denied(format!(
                "agent @{target} is not available for delegation"
            )));
        }

        let timeout = self.limits.clamp(args.timeout_seconds);
        let request = DelegationRequest {
            caller,
            agent: target.clone(),
            prompt: args.prompt,
            model: args.model.filter(|m| !m.trim().is_empty()),
            depth: ctx.depth,
        };

        info!(agent = %target, depth = ctx.depth, timeout_secs = timeout.as_secs(), "Delegating");
        let started = Instant::now();
        let cancel = ctx.abort.child_token();

        let run = self.delegator.delegate(request, cancel.clone());
        tokio::pin!(run);
        let outcome = tokio::select! {
            result = &mut run => Some(result),
            _ = tokio::time::sleep(timeout) => None,
        };

        let reply = match outcome {
            Some(Ok(reply)) => reply,
            Some(Err(e)) => {
                warn!(agent = %target, error = %e, "Delegated run failed");
                return Err(ToolError::execution_failed(format!(
                    "agent @{target} failed: {e}"
                )));
            }
            None => {
                // Let the sub-run observe cancellation and close out its events.
                cancel.cancel();
                if tokio::time::timeout(CANCEL_GRACE, &mut run).await.is_err() {
                    warn!(agent = %target, "Delegated run ignored cancellation");
                }
                return Err(ToolError::DelegationTimeout {
                    agent: format!("@{target}"),
                    elapsed: format_minutes(timeout),
                });
            }
        };

        let truncated = reply.len() > MAX_REPLY_BYTES;
        let output = truncate_bytes(&reply, MAX_REPLY_BYTES, TRUNCATION_MARKER);
        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(agent = %target, bytes = reply.len(), truncated, duration_ms, "Delegation finished");

        Ok(ToolOutput::new(format!("@{target}"), output).with_metadata(json!({
            "agent": target,
            "truncated": truncated,
            "duration_ms": duration_ms,
        })))
    }
}
