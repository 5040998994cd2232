//! Session persistence contract.

use crate::error::StorageResult;
use async_trait::async_trait;
use cadre_provider::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    /// Handle of the agent the session belongs to.
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence service for sessions, their messages and their plan.
///
/// Implementations synchronize internally; callers may share one store
/// across runners and tasks.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new session for `agent`.
    async fn create_session(&self, agent: &str) -> StorageResult<SessionRecord>;

    async fn get_session(&self, session_id: &str) -> StorageResult<Option<SessionRecord>>;

    /// Append a message. Order of appends is preserved.
    async fn append_message(&self, session_id: &str, message: &Message) -> StorageResult<()>;

    async fn list_messages(&self, session_id: &str) -> StorageResult<Vec<Message>>;

    async fn update_title(&self, session_id: &str, title: &str) -> StorageResult<()>;

    /// Replace the session's plan snapshot.
    async fn update_plan(&self, session_id: &str, plan: &Value) -> StorageResult<()>;

    async fn get_plan(&self, session_id: &str) -> StorageResult<Option<Value>>;
}
