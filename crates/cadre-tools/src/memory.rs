//! Memory tool - search and manage long-term memories.

use crate::{Tool, ToolContext, ToolError, ToolOutput, ToolResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Default number of results for `search` and `list`.
pub const DEFAULT_LIMIT: usize = 10;

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Agent that created the memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Relevance score from a search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// A memory to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// Long-term memory backend.
///
/// Implementations choose how to search; without an embedder a keyword
/// match is expected.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<MemoryRecord>>;

    async fn create(&self, memory: NewMemory) -> anyhow::Result<MemoryRecord>;

    /// Replace `old_id` with a new memory.
    async fn supersede(&self, old_id: &str, memory: NewMemory) -> anyhow::Result<MemoryRecord>;

    async fn list(&self, category: Option<String>, limit: usize) -> anyhow::Result<Vec<MemoryRecord>>;

    /// Remove a memory. Returns false if it did not exist.
    async fn forget(&self, id: &str) -> anyhow::Result<bool>;

    /// Whether semantic search is available.
    fn has_embedder(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Operation {
    Search,
    Store,
    List,
    Forget,
}

#[derive(Debug, Deserialize)]
struct MemoryArgs {
    operation: Operation,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

fn required(value: Option<String>, field: &str, operation: &str) -> ToolResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ToolError::validation(format!("'{field}' is required for {operation}")))
}

fn service_error(operation: &str, err: anyhow::Error) -> ToolError {
    ToolError::execution_failed(format!("memory {operation} failed: {err}"))
}

fn format_records(records: &[MemoryRecord]) -> String {
    if records.is_empty() {
        return "No memories found.".to_string();
    }
    records
        .iter()
        .map(|r| match &r.category {
            Some(category) => format!("- [{}] ({}) {}", r.id, category, r.content),
            None => format!("- [{}] {}", r.id, r.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Search and manage long-term memories.
pub struct MemoryTool {
    service: Arc<dyn MemoryService>,
}

impl MemoryTool {
    pub fn new(service: Arc<dyn MemoryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn id(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        r#"Search, store, list or forget long-term memories.

Operations:
- search: find memories relevant to `query`
- store: save `content` with an optional `category`
- list: list memories, optionally filtered by `category`
- forget: delete the memory with `id`"#
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["operation"],
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["search", "store", "list", "forget"]
                },
                "query": {"type": "string", "description": "Search query"},
                "content": {"type": "string", "description": "Memory to store"},
                "category": {"type": "string", "description": "Memory category"},
                "id": {"type": "string", "description": "Memory id to forget"},
                "limit": {"type": "integer", "description": "Maximum results (default 10)"}
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let args: MemoryArgs = ToolError::parse_args(args)?;
        let limit = args.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT);

        match args.operation {
            Operation::Search => {
                let query = required(args.query, "query", "search")?;
                let records = self
                    .service
                    .search(&query, limit)
                    .await
                    .map_err(|e| service_error("search", e))?;
                debug!(results = records.len(), semantic = self.service.has_embedder(), "Memory search");
                Ok(ToolOutput::new(
                    format!("{} memories", records.len()),
                    format_records(&records),
                )
                .with_metadata(json!({
                    "operation": "search",
                    "semantic": self.service.has_embedder(),
                    "memories": records,
                })))
            }
            Operation::Store => {
                let content = required(args.content, "content", "store")?;
                let record = self
                    .service
                    .create(NewMemory {
                        content,
                        category: args.category,
                        agent: Some(ctx.agent.clone()),
                    })
                    .await
                    .map_err(|e| service_error("store", e))?;
                Ok(
                    ToolOutput::new("Memory stored", format!("Stored memory {}", record.id))
                        .with_metadata(json!({"operation": "store", "memory": record})),
                )
            }
            Operation::List => {
                let records = self
                    .service
                    .list(args.category, limit)
                    .await
                    .map_err(|e| service_error("list", e))?;
                Ok(ToolOutput::new(
                    format!("{} memories", records.len()),
                    format_records(&records),
                )
                .with_metadata(json!({"operation": "list", "memories": records})))
            }
            Operation::Forget => {
                let id = required(args.id, "id", "forget")?;
                let removed = self
                    .service
                    .forget(&id)
                    .await
                    .map_err(|e| service_error("forget", e))?;
                let output = if removed {
                    format!("Forgot memory {id}")
                } else {
                    format!("No memory with id {id}")
                };
                Ok(ToolOutput::new("Memory forgotten", output)
                    .with_metadata(json!({"operation": "forget", "id": id, "removed": removed})))
            }
        }
    }
}
