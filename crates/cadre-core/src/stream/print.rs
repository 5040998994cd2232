use super::{StreamWriter, ToolCallInfo, ToolResultInfo};
use crate::memory::MemoryOutcome;
use async_trait::async_trait;
use cadre_tools::shell::truncate_command;
use cadre_util::text::truncate_chars;
use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FRAME_INTERVAL: Duration = Duration::from_millis(80);

/// Output lines shown under a tool status line.
const PREVIEW_LINES: usize = 5;
const PREVIEW_WIDTH: usize = 120;

const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";
const CLEAR_LINE: &str = "\r\x1b[2K";

struct Spinner {
    stop: CancellationToken,
    label: String,
}

#[derive(Default)]
struct PrintState {
    depth: usize,
    at_line_start: bool,
    /// Display labels of running tool calls, by call id.
    labels: HashMap<String, String>,
    spinner: Option<Spinner>,
}

/// Renders a run as plain text.
///
/// Output is indented two spaces per delegation level. An optional spinner
/// animates while the model is thinking or a tool is running; it is stopped
/// by the first event that prints content.
pub struct PrintWriter<W: Write + Send + 'static> {
    out: Arc<Mutex<W>>,
    state: Mutex<PrintState>,
    spinner: bool,
    ansi: bool,
    reasoning: bool,
}

impl PrintWriter<std::io::Stdout> {
    /// Print to stdout, with a spinner and colors when it is a terminal.
    pub fn stdout() -> Self {
        let tty = std::io::stdout().is_terminal();
        Self::new(std::io::stdout()).with_spinner(tty).with_ansi(tty)
    }
}

impl<W: Write + Send + 'static> PrintWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            state: Mutex::new(PrintState {
                at_line_start: true,
                ..Default::default()
            }),
            spinner: false,
            ansi: false,
            reasoning: false,
        }
    }

    pub fn with_spinner(mut self, enabled: bool) -> Self {
        self.spinner = enabled;
        self
    }

    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    /// Also print reasoning text.
    pub fn with_reasoning(mut self, enabled: bool) -> Self {
        self.reasoning = enabled;
        self
    }

    fn state(&self) -> MutexGuard<'_, PrintState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn out(&self) -> MutexGuard<'_, W> {
        lock_out(&*self.out)
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.ansi {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn start_spinner(&self, state: &mut PrintState, label: String) {
        if !self.spinner {
            return;
        }
        self.stop_spinner(state, None);

        let stop = CancellationToken::new();
        let shared = Arc::clone(&self.out);
        let indent = indent(state.depth);
        let task_stop = stop.clone();
        let task_label = label.clone();
        tokio::spawn(async move {
            let mut frame = 0;
            loop {
                {
                    // Checked under the output lock so no frame lands after a stop.
                    let mut out = lock_out(&*shared);
                    if task_stop.is_cancelled() {
                        break;
                    }
                    let _ = write!(out, "\r{indent}{} {task_label}", FRAMES[frame]);
                    let _ = out.flush();
                }
                frame = (frame + 1) % FRAMES.len();
                tokio::select! {
                    _ = task_stop.cancelled() => break,
                    _ = tokio::time::sleep(FRAME_INTERVAL) => {}
                }
            }
        });

        state.spinner = Some(Spinner { stop, label });
    }

    /// Stop the spinner. With a failure message the spinner line is kept
    /// and marked with an error.
    fn stop_spinner(&self, state: &mut PrintState, failure: Option<&str>) {
        let Some(spinner) = state.spinner.take() else {
            return;
        };
        spinner.stop.cancel();
        let mut out = self.out();
        let _ = write!(out, "{CLEAR_LINE}");
        if let Some(message) = failure {
            let marker = self.paint(RED, "✗");
            let _ = writeln!(
                out,
                "{}{marker} {}: {message}",
                indent(state.depth),
                spinner.label
            );
            state.at_line_start = true;
        }
        let _ = out.flush();
    }

    /// Write `text`, indenting every new line at the current depth.
    fn write_indented(&self, state: &mut PrintState, text: &str) {
        let pad = indent(state.depth);
        let mut out = self.out();
        for piece in text.split_inclusive('\n') {
            if state.at_line_start && !pad.is_empty() {
                let _ = out.write_all(pad.as_bytes());
            }
            let _ = out.write_all(piece.as_bytes());
            state.at_line_start = piece.ends_with('\n');
        }
        let _ = out.flush();
    }

    fn end_line(&self, state: &mut PrintState) {
        if !state.at_line_start {
            self.write_indented(state, "\n");
        }
    }

    fn line(&self, state: &mut PrintState, text: &str) {
        self.end_line(state);
        self.write_indented(state, &format!("{text}\n"));
    }
}

fn lock_out<W>(out: &Mutex<W>) -> MutexGuard<'_, W> {
    out.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn format_duration(duration_ms: u64) -> String {
    if duration_ms < 1000 {
        format!("{duration_ms}ms")
    } else {
        format!("{:.1}s", duration_ms as f64 / 1000.0)
    }
}

fn call_label(call: &ToolCallInfo) -> String {
    match (&call.description, &call.command) {
        (Some(description), _) if !description.trim().is_empty() => description.clone(),
        (_, Some(command)) => truncate_command(command),
        _ => String::new(),
    }
}

#[async_trait]
impl<W: Write + Send + 'static> StreamWriter for PrintWriter<W> {
    async fn begin_turn(&self, _agent: &str) {
        let mut state = self.state();
        self.start_spinner(&mut state, "Thinking...".to_string());
    }

    async fn text_delta(&self, text: &str) {
        let mut state = self.state();
        self.stop_spinner(&mut state, None);
        self.write_indented(&mut state, text);
    }

    async fn text_done(&self, _text: &str) {
        let mut state = self.state();
        self.end_line(&mut state);
    }

    async fn reasoning_delta(&self, text: &str) {
        let mut state = self.state();
        self.stop_spinner(&mut state, None);
        if self.reasoning {
            let text = self.paint(DIM, text);
            self.write_indented(&mut state, &text);
        }
    }

    async fn reasoning_done(&self, _text: &str) {
        if self.reasoning {
            let mut state = self.state();
            self.end_line(&mut state);
        }
    }

    async fn tool_start(&self, call: &ToolCallInfo) {
        let mut state = self.state();
        self.stop_spinner(&mut state, None);
        let label = call_label(call);
        if !call.quiet {
            let spinner_label = if label.is_empty() {
                call.name.clone()
            } else {
                format!("{}: {label}", call.name)
            };
            self.start_spinner(&mut state, spinner_label);
        }
        state.labels.insert(call.id.clone(), label);
    }

    async fn tool_result(&self, result: &ToolResultInfo) {
        let mut state = self.state();
        self.stop_spinner(&mut state, None);
        let label = state.labels.remove(&result.id).unwrap_or_default();

        let (marker, body) = match &result.error {
            Some(error) => (self.paint(RED, "✗"), error.as_str()),
            None => (self.paint(GREEN, "✓"), result.output.as_str()),
        };
        let duration = self.paint(DIM, &format!("({})", format_duration(result.duration_ms)));
        let status = if label.is_empty() {
            format!("{marker} {} {duration}", result.name)
        } else {
            format!("{marker} {} {duration} {label}", result.name)
        };
        self.line(&mut state, &status);

        let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
        for line in lines.iter().take(PREVIEW_LINES) {
            let preview = self.paint(DIM, &truncate_chars(line, PREVIEW_WIDTH));
            self.line(&mut state, &format!("  {preview}"));
        }
        if lines.len() > PREVIEW_LINES {
            let more = format!("  ... {} more lines", lines.len() - PREVIEW_LINES);
            self.line(&mut state, &self.paint(DIM, &more));
        }
    }

    async fn agent_start(&self, agent: &str, depth: usize) {
        let mut state = self.state();
        self.stop_spinner(&mut state, None);
        state.depth = depth.saturating_sub(1);
        self.line(&mut state, &format!("→ @{agent}"));
        state.depth = depth;
    }

    async fn agent_end(&self, agent: &str, depth: usize, elapsed: Duration) {
        let mut state = self.state();
        self.stop_spinner(&mut state, None);
        self.end_line(&mut state);
        state.depth = depth.saturating_sub(1);
        let duration = format_duration(elapsed.as_millis() as u64);
        self.line(&mut state, &self.paint(DIM, &format!("← @{agent} ({duration})")));
    }

    async fn memory_event(&self, outcome: &MemoryOutcome) {
        let text = match outcome {
            MemoryOutcome::Created { id } => format!("memory saved ({id})"),
            MemoryOutcome::Superseded { old_id, new_id } => {
                format!("memory updated ({old_id} → {new_id})")
            }
            // Skips and failures are not interesting to the user.
            MemoryOutcome::Skipped { .. } | MemoryOutcome::Failed { .. } => return,
        };
        let mut state = self.state();
        self.line(&mut state, &self.paint(DIM, &text));
    }

    async fn error(&self, message: &str) {
        let mut state = self.state();
        if state.spinner.is_some() {
            self.stop_spinner(&mut state, Some(message));
        } else {
            let marker = self.paint(RED, "✗");
            self.line(&mut state, &format!("{marker} Error: {message}"));
        }
    }

    async fn done(&self, _text: &str) {
        let mut state = self.state();
        self.stop_spinner(&mut state, None);
        self.end_line(&mut state);
    }
}

impl<W: Write + Send + 'static> Drop for PrintWriter<W> {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            if let Some(spinner) = state.spinner.take() {
                spinner.stop.cancel();
            }
        }
    }
}
