//! Shell tool - run a command line inside the sandbox.
//!
//! The command runs under `sh -c` with the working directory confined to the
//! sandbox base. On a clean run the model sees stdout verbatim; otherwise it
//! sees the JSON envelope with stdout, stderr, exit code and error.

use crate::{Tool, ToolContext, ToolError, ToolOutput, ToolResult};
use async_trait::async_trait;
use cadre_sandbox::{Sandbox, SandboxError};
use cadre_util::text::truncate_chars;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Longest timeout a caller may request.
const MAX_TIMEOUT_SECS: u64 = 600;

/// Execute shell commands.
pub struct ShellTool {
    sandbox: Arc<Sandbox>,
}

impl ShellTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[derive(Debug, Deserialize)]
struct ShellArgs {
    command: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(default)]
    working_dir: Option<String>,
}

#[async_trait]
impl Tool for ShellTool {
    fn id(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        r#"Executes a shell command inside the project sandbox.

Usage notes:
- The command argument is required.
- working_dir is relative to the project root and may not leave it.
- timeout_seconds defaults to the sandbox timeout (at most 600).
- On success the raw stdout is returned; otherwise a JSON object with stdout, stderr, exit_code and error."#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["command", "description"],
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                },
                "description": {
                    "type": "string",
                    "description": "Clear, concise description of what this command does"
                },
                "timeout_seconds": {
                    "type": "integer",
                    "description": "Optional timeout in seconds"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Working directory relative to the project root"
                }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let args: ShellArgs = ToolError::parse_args(args)?;
        if args.command.trim().is_empty() {
            return Err(SandboxError::EmptyCommand.into());
        }

        let timeout = args
            .timeout_seconds
            .map(|secs| Duration::from_secs(secs.clamp(1, MAX_TIMEOUT_SECS)));

        debug!(command = %args.command, working_dir = ?args.working_dir, "Running shell command");

        let result = self
            .sandbox
            .run(
                &args.command,
                args.working_dir.as_deref(),
                timeout,
                &ctx.abort,
            )
            .await?;

        info!(
            exit_code = result.exit_code,
            timed_out = result.timed_out,
            truncated = result.truncated,
            "Shell command finished"
        );

        let title = args
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| truncate_command(&args.command));

        Ok(ToolOutput::new(title, result.render())
            .with_metadata(json!({
                "command": args.command,
                "result": result.to_json(),
            }))
            .failed(!result.is_clean_success()))
    }
}

/// First line of a command, shortened for display.
pub fn truncate_command(cmd: &str) -> String {
    let first_line = cmd.lines().next().unwrap_or(cmd);
    truncate_chars(first_line, 50)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_sandbox::SandboxConfig;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ShellTool, ToolContext) {
        let dir = TempDir::new().unwrap();
        let sandbox = Sandbox::new(SandboxConfig::with_base(dir.path())).unwrap();
        let ctx = ToolContext::new("coder", sandbox.base_dir());
        (dir, ShellTool::new(Arc::new(sandbox)), ctx)
    }

    #[test]
    fn test_truncate_command() {
        assert_eq!(truncate_command("ls -la"), "ls -la");
        assert_eq!(truncate_command("echo a\necho b"), "echo a");
        let long = "x".repeat(80);
        let short = truncate_command(&long);
        assert_eq!(short.chars().count(), 50);
        assert!(short.ends_with("..."));
    }

    #[tokio::test]
    async fn test_clean_run_returns_raw_stdout() {
        let (_dir, tool, ctx) = setup();
        let out = tool
            .execute(json!({"command": "echo hello", "description": "greet"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.output, "hello\n");
        assert_eq!(out.title, "greet");
        assert!(!out.is_error);
        assert_eq!(out.metadata["result"]["exit_code"], 0);
    }

    #[tokio::test]
    async fn test_failure_returns_envelope() {
        let (_dir, tool, ctx) = setup();
        let out = tool
            .execute(json!({"command": "echo oops >&2; exit 3"}), &ctx)
            .await
            .unwrap();
        assert!(out.is_error);
        let envelope: Value = serde_json::from_str(&out.output).unwrap();
        assert_eq!(envelope["exit_code"], 3);
        assert_eq!(envelope["stderr"], "oops\n");
    }

    #[tokio::test]
    async fn test_blank_command_is_soft_error() {
        let (_dir, tool, ctx) = setup();
        let err = tool
            .execute(json!({"command": "   "}), &ctx)
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(err, ToolError::Sandbox(SandboxError::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_working_dir_escape_rejected() {
        let (_dir, tool, ctx) = setup();
        let err = tool
            .execute(json!({"command": "pwd", "working_dir": "../.."}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Sandbox(ref e) if e.is_confinement()));
    }

    #[tokio::test]
    async fn test_missing_command_is_validation_error() {
        let (_dir, tool, ctx) = setup();
        let err = tool.execute(json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }
}
