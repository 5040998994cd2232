//! Plan tool - a phased task plan stored with the session.

use crate::todo::task_item_schema;
use crate::tracking::{ChangeTracker, RawTaskItem, Status, StatusCounts, TaskItem};
use crate::{Tool, ToolContext, ToolError, ToolOutput, ToolResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

/// A named group of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub status: Status,
    pub tasks: Vec<TaskItem>,
}

/// A plan: either phases or a flat task list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<Phase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskItem>,
}

impl Plan {
    /// Every task, phase by phase.
    pub fn all_tasks(&self) -> impl Iterator<Item = &TaskItem> {
        self.phases
            .iter()
            .flat_map(|p| p.tasks.iter())
            .chain(self.tasks.iter())
    }

    /// Status lookup keyed by task content and by phase name.
    fn lookup(&self) -> HashMap<String, Status> {
        let mut map: HashMap<String, Status> = self
            .all_tasks()
            .map(|t| (task_key(&t.content), t.status))
            .collect();
        for phase in &self.phases {
            map.insert(phase_key(&phase.name), phase.status);
        }
        map
    }
}

fn task_key(content: &str) -> String {
    format!("task:{content}")
}

fn phase_key(name: &str) -> String {
    format!("phase:{name}")
}

#[derive(Debug, Deserialize)]
struct RawPhase {
    name: String,
    status: String,
    #[serde(default)]
    tasks: Vec<RawTaskItem>,
}

#[derive(Debug, Deserialize)]
struct PlanWriteArgs {
    #[serde(default)]
    phases: Vec<RawPhase>,
    #[serde(default)]
    tasks: Vec<RawTaskItem>,
}

fn validate_items(raw: Vec<RawTaskItem>) -> ToolResult<Vec<TaskItem>> {
    raw.into_iter()
        .enumerate()
        .map(|(i, item)| item.validate(i))
        .collect()
}

/// Validate a submitted plan. Nothing is stored on failure.
fn validate(args: PlanWriteArgs) -> ToolResult<Plan> {
    if !args.phases.is_empty() && !args.tasks.is_empty() {
        return Err(ToolError::validation(
            "phases and top-level tasks are mutually exclusive",
        ));
    }
    if args.phases.len() == 1 {
        return Err(ToolError::validation(
            "a phased plan needs at least two phases; use top-level tasks instead",
        ));
    }

    let mut phases = Vec::with_capacity(args.phases.len());
    for raw in args.phases {
        if raw.name.trim().is_empty() {
            return Err(ToolError::validation("phase name must not be empty"));
        }
        let status = Status::require(&raw.status, &format!("phase '{}'", raw.name))?;
        if raw.tasks.is_empty() {
            return Err(ToolError::validation(format!(
                "phase '{}' must contain at least one task",
                raw.name
            )));
        }
        phases.push(Phase {
            name: raw.name,
            status,
            tasks: validate_items(raw.tasks)?,
        });
    }

    Ok(Plan {
        phases,
        tasks: validate_items(args.tasks)?,
    })
}

/// Write the session's plan.
#[derive(Debug, Default)]
pub struct PlanWriteTool;

impl PlanWriteTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for PlanWriteTool {
    fn id(&self) -> &str {
        "planwrite"
    }

    fn description(&self) -> &str {
        r#"Create or replace the plan for the current session.

Use either phases (two or more, each with at least one task) or a flat list of tasks, not both.
Statuses: pending, in_progress, completed."#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "phases": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["name", "status", "tasks"],
                        "properties": {
                            "name": {"type": "string"},
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed"]
                            },
                            "tasks": {"type": "array", "items": task_item_schema()}
                        }
                    }
                },
                "tasks": {"type": "array", "items": task_item_schema()}
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let session_id = ctx.require_session()?;
        let store = ctx.require_store()?;
        let args: PlanWriteArgs = ToolError::parse_args(args)?;
        let plan = validate(args)?;

        let previous = match store.get_plan(session_id).await? {
            Some(value) => serde_json::from_value::<Plan>(value).unwrap_or_else(|e| {
                debug!(session_id, error = %e, "Ignoring unreadable stored plan");
                Plan::default()
            }),
            None => Plan::default(),
        };

        let mut tracker = ChangeTracker::new(previous.lookup(), false);
        for phase in &plan.phases {
            tracker.observe(&phase_key(&phase.name), phase.status, &phase.name, &phase.name);
            for task in &phase.tasks {
                tracker.observe(
                    &task_key(&task.content),
                    task.status,
                    &task.content,
                    task.started_label(),
                );
            }
        }
        for task in &plan.tasks {
            tracker.observe(
                &task_key(&task.content),
                task.status,
                &task.content,
                task.started_label(),
            );
        }
        let changes = tracker.finish();

        let snapshot = serde_json::to_value(&plan)?;
        store.update_plan(session_id, &snapshot).await?;

        let counts = StatusCounts::of(plan.all_tasks());
        debug!(session_id, phases = plan.phases.len(), total = counts.total(), "Plan updated");

        let title = if plan.phases.is_empty() {
            format!("{} tasks", counts.total())
        } else {
            format!("{} phases, {} tasks", plan.phases.len(), counts.total())
        };
        let output = format!(
            "Plan updated: {} pending, {} in progress, {} completed ({} total)",
            counts.pending,
            counts.in_progress,
            counts.completed,
            counts.total()
        );

        Ok(ToolOutput::new(title, output).with_metadata(json!({
            "plan": snapshot,
            "counts": counts,
            "just_completed": changes.just_completed,
            "just_started": changes.just_started,
        })))
    }
}
