//! Process execution with timeout, cancellation and output caps.

use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::output::{drain_into, CappedBuffer, SharedBuffer};
use crate::path::resolve_working_dir;
use crate::ExecResult;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long to wait for output readers once the child has been killed.
const READER_GRACE: Duration = Duration::from_secs(2);

/// What to run.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// A command line handed to `sh -c`.
    Shell(String),
    /// A program with an explicit argument vector.
    Program { program: String, args: Vec<String> },
}

impl Invocation {
    fn describe(&self) -> String {
        match self {
            Invocation::Shell(command) => command.clone(),
            Invocation::Program { program, args } => {
                std::iter::once(program.as_str())
                    .chain(args.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ")
            }
        }
    }
}

/// A fully resolved execution request.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub invocation: Invocation,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

enum Outcome {
    Exited(ExitStatus),
    WaitFailed(std::io::Error),
    TimedOut,
    Cancelled,
}

/// Confined command executor.
#[derive(Debug, Clone)]
pub struct Sandbox {
    base_dir: PathBuf,
    default_timeout: Duration,
    max_output_bytes: usize,
    env: HashMap<String, String>,
}

impl Sandbox {
    /// Create a sandbox, creating and canonicalizing the base directory.
    pub fn new(config: SandboxConfig) -> SandboxResult<Self> {
        let base = match config.base_dir.clone() {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        std::fs::create_dir_all(&base).map_err(|e| SandboxError::working_dir(&base, e))?;
        let base_dir = base
            .canonicalize()
            .map_err(|e| SandboxError::working_dir(&base, e))?;
        let max_output_bytes = config.max_output_bytes();
        if max_output_bytes == 0 {
            return Err(SandboxError::Config(
                "max_output_bytes must be greater than zero".to_string(),
            ));
        }

        debug!(base = %base_dir.display(), "Sandbox created");

        Ok(Self {
            base_dir,
            default_timeout: Duration::from_secs(config.timeout_seconds()),
            max_output_bytes,
            env: config.env,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    /// Resolve a working-directory argument inside the base directory.
    pub async fn resolve_working_dir(&self, arg: Option<&str>) -> SandboxResult<PathBuf> {
        resolve_working_dir(&self.base_dir, arg).await
    }

    /// Run a shell command.
    ///
    /// Validation failures (blank command, confinement) are returned as
    /// errors and nothing is spawned. Everything that happens after spawn
    /// is reported in the [`ExecResult`].
    pub async fn run(
        &self,
        command: &str,
        working_dir: Option<&str>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> SandboxResult<ExecResult> {
        if command.trim().is_empty() {
            return Err(SandboxError::EmptyCommand);
        }
        let cwd = self.resolve_working_dir(working_dir).await?;
        let request = ExecRequest {
            invocation: Invocation::Shell(command.to_string()),
            cwd,
            env: HashMap::new(),
            timeout: timeout.unwrap_or(self.default_timeout),
        };
        Ok(self.execute(request, cancel).await)
    }

    /// Execute a resolved request.
    pub async fn execute(&self, request: ExecRequest, cancel: &CancellationToken) -> ExecResult {
        let started = Instant::now();
        let description = request.invocation.describe();
        debug!(
            command = %description,
            cwd = %request.cwd.display(),
            timeout_ms = request.timeout.as_millis() as u64,
            "Executing command"
        );

        let mut cmd = match &request.invocation {
            Invocation::Shell(command) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(command);
                cmd
            }
            Invocation::Program { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        };
        cmd.current_dir(&request.cwd)
            .env("TERM", "dumb")
            .env("NO_COLOR", "1")
            .env("GIT_TERMINAL_PROMPT", "0")
            .envs(&self.env)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %description, error = %e, "Failed to spawn command");
                return ExecResult::failure(format!("failed to start command: {e}"));
            }
        };

        let stdout_buf: SharedBuffer = Arc::new(Mutex::new(CappedBuffer::new(self.max_output_bytes)));
        let stderr_buf: SharedBuffer = Arc::new(Mutex::new(CappedBuffer::new(self.max_output_bytes)));
        let readers = [
            spawn_reader(child.stdout.take(), stdout_buf.clone()),
            spawn_reader(child.stderr.take(), stderr_buf.clone()),
        ];

        let outcome = tokio::select! {
            waited = tokio::time::timeout(request.timeout, child.wait()) => match waited {
                Ok(Ok(status)) => Outcome::Exited(status),
                Ok(Err(e)) => Outcome::WaitFailed(e),
                Err(_) => Outcome::TimedOut,
            },
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        let killed = matches!(outcome, Outcome::TimedOut | Outcome::Cancelled);
        if killed {
            let _ = child.kill().await;
        }
        for reader in readers.into_iter().flatten() {
            finish_reader(reader, killed).await;
        }

        let (stdout, stdout_truncated) = snapshot(&stdout_buf);
        let (stderr, stderr_truncated) = snapshot(&stderr_buf);
        let mut result = ExecResult {
            stdout,
            stderr,
            exit_code: -1,
            timed_out: false,
            truncated: stdout_truncated || stderr_truncated,
            error: None,
        };

        match outcome {
            Outcome::Exited(status) => match status.code() {
                Some(code) => {
                    result.exit_code = code;
                    if code != 0 {
                        result.error = Some(format!("exit status {code}"));
                    }
                }
                None => result.error = Some(format!("process terminated by signal ({status})")),
            },
            Outcome::WaitFailed(e) => result.error = Some(format!("failed to wait for command: {e}")),
            Outcome::TimedOut => {
                result.timed_out = true;
                result.error = Some(format!(
                    "command timed out after {}",
                    format_seconds(request.timeout)
                ));
            }
            Outcome::Cancelled => result.error = Some("command cancelled".to_string()),
        }

        debug!(
            command = %description,
            exit_code = result.exit_code,
            timed_out = result.timed_out,
            truncated = result.truncated,
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }
}

fn spawn_reader<R>(reader: Option<R>, buffer: SharedBuffer) -> Option<JoinHandle<()>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    reader.map(|reader| {
        tokio::spawn(async move {
            if let Err(e) = drain_into(reader, buffer).await {
                debug!(error = %e, "Output reader stopped");
            }
        })
    })
}

/// Wait for a reader to hit EOF. After a kill, orphaned grandchildren may keep
/// the pipe open, so the wait is bounded.
async fn finish_reader(mut reader: JoinHandle<()>, killed: bool) {
    if !killed {
        let _ = reader.await;
        return;
    }
    if tokio::time::timeout(READER_GRACE, &mut reader).await.is_err() {
        reader.abort();
    }
}

/// Render a timeout as whole seconds, or tenths when uneven.
fn format_seconds(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

fn snapshot(buffer: &SharedBuffer) -> (String, bool) {
    match buffer.lock() {
        Ok(buf) => (buf.to_text(), buf.is_truncated()),
        Err(_) => (String::new(), false),
    }
}
