//! Todo tool - a per-session task list backed by the tool's own database.

use crate::tracking::{snapshot, ChangeTracker, RawTaskItem, StatusCounts, TaskItem};
use crate::{Tool, ToolContext, ToolError, ToolOutput, ToolResult};
use async_trait::async_trait;
use cadre_storage::{StorageResult, ToolDb};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, warn};

/// Tool name, also the name of its storage directory and database.
pub const TODO_TOOL: &str = "todowrite";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS todos (
    session_id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Persistence for todo lists, one row per session.
#[derive(Debug)]
pub struct TodoStore {
    db: ToolDb,
}

impl TodoStore {
    /// Store under `<data_dir>/todowrite/todowrite.db`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            db: ToolDb::new(TODO_TOOL, data_dir, SCHEMA),
        }
    }

    pub fn db(&self) -> &ToolDb {
        &self.db
    }

    /// The stored list for a session, empty if none.
    pub fn load(&self, session_id: &str) -> StorageResult<Vec<TaskItem>> {
        let data: Option<String> = self.db.db(|conn| {
            conn.query_row(
                "SELECT data FROM todos WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()
        })?;

        let Some(data) = data else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&data) {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!(session_id, error = %e, "Discarding unreadable todo snapshot");
                Ok(Vec::new())
            }
        }
    }

    /// Replace the list for a session.
    pub fn save(&self, session_id: &str, items: &[TaskItem]) -> StorageResult<()> {
        let data = serde_json::to_string(items)?;
        let now = Utc::now().to_rfc3339();
        self.db.db(|conn| {
            conn.execute(
                "INSERT INTO todos (session_id, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(session_id) DO UPDATE SET
                     data = excluded.data,
                     updated_at = excluded.updated_at",
                params![session_id, data, now],
            )
        })?;
        Ok(())
    }
}

/// Write the session's todo list.
pub struct TodoWriteTool {
    store: TodoStore,
}

impl TodoWriteTool {
    pub fn new(store: TodoStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct TodoWriteArgs {
    todos: Vec<RawTaskItem>,
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn id(&self) -> &str {
        TODO_TOOL
    }

    fn description(&self) -> &str {
        r#"Create and manage a structured task list for the current session.

Each call replaces the whole list. Statuses: pending, in_progress, completed.
Keep exactly one task in_progress at a time and mark tasks completed as soon as they are done."#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["todos"],
            "properties": {
                "todos": {
                    "type": "array",
                    "description": "The complete todo list",
                    "items": task_item_schema()
                }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let session_id = ctx.require_session()?;
        let args: TodoWriteArgs = ToolError::parse_args(args)?;

        let items = args
            .todos
            .into_iter()
            .enumerate()
            .map(|(i, raw)| raw.validate(i))
            .collect::<ToolResult<Vec<_>>>()?;

        let previous = self.store.load(session_id)?;
        let mut tracker = ChangeTracker::new(snapshot(&previous), true);
        for item in &items {
            tracker.observe_item(item);
        }
        let changes = tracker.finish();

        self.store.save(session_id, &items)?;

        let counts = StatusCounts::of(&items);
        debug!(
            session_id,
            total = counts.total(),
            just_completed = changes.just_completed.len(),
            "Todos updated"
        );

        let title = format!("{} todos", counts.total());
        let output = format!(
            "Todos updated: {} pending, {} in progress, {} completed ({} total)",
            counts.pending,
            counts.in_progress,
            counts.completed,
            counts.total()
        );

        Ok(ToolOutput::new(title, output).with_metadata(json!({
            "todos": items,
            "counts": counts,
            "just_completed": changes.just_completed,
            "just_started": changes.just_started,
        })))
    }
}

/// Schema for one task item, shared with the plan tool.
pub(crate) fn task_item_schema() -> Value {
    json!({
        "type": "object",
        "required": ["content", "status"],
        "properties": {
            "content": {
                "type": "string",
                "description": "What needs to be done"
            },
            "status": {
                "type": "string",
                "enum": ["pending", "in_progress", "completed"]
            },
            "active_form": {
                "type": "string",
                "description": "Present-continuous label shown while the task runs"
            }
        }
    })
}
