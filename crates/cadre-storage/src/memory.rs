//! In-memory session store.
//!
//! Not persistent. Used for one-shot runs and tests.

use crate::error::{StorageError, StorageResult};
use crate::session::{SessionRecord, SessionStore};
use async_trait::async_trait;
use cadre_provider::Message;
use cadre_util::Identifier;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug)]
struct Entry {
    record: SessionRecord,
    messages: Vec<Message>,
    plan: Option<Value>,
}

/// Session store backed by a map.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions created so far.
    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    fn with_entry<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Entry) -> T,
    ) -> StorageResult<T> {
        let mut sessions = self.sessions.write().map_err(StorageError::poisoned)?;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| StorageError::session_not_found(session_id))?;
        Ok(f(entry))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, agent: &str) -> StorageResult<SessionRecord> {
        let now = Utc::now();
        let record = SessionRecord {
            id: Identifier::session(),
            agent: agent.to_string(),
            title: None,
            created_at: now,
            updated_at: now,
        };
        let mut sessions = self.sessions.write().map_err(StorageError::poisoned)?;
        sessions.insert(
            record.id.clone(),
            Entry {
                record: record.clone(),
                messages: Vec::new(),
                plan: None,
            },
        );
        Ok(record)
    }

    async fn get_session(&self, session_id: &str) -> StorageResult<Option<SessionRecord>> {
        let sessions = self.sessions.read().map_err(StorageError::poisoned)?;
        Ok(sessions.get(session_id).map(|e| e.record.clone()))
    }

    async fn append_message(&self, session_id: &str, message: &Message) -> StorageResult<()> {
        self.with_entry(session_id, |entry| {
            entry.messages.push(message.clone());
            entry.record.updated_at = Utc::now();
        })
    }

    async fn list_messages(&self, session_id: &str) -> StorageResult<Vec<Message>> {
        self.with_entry(session_id, |entry| entry.messages.clone())
    }

    async fn update_title(&self, session_id: &str, title: &str) -> StorageResult<()> {
        self.with_entry(session_id, |entry| {
            entry.record.title = Some(title.to_string());
            entry.record.updated_at = Utc::now();
        })
    }

    async fn update_plan(&self, session_id: &str, plan: &Value) -> StorageResult<()> {
        self.with_entry(session_id, |entry| {
            entry.plan = Some(plan.clone());
            entry.record.updated_at = Utc::now();
        })
    }

    async fn get_plan(&self, session_id: &str) -> StorageResult<Option<Value>> {
        self.with_entry(session_id, |entry| entry.plan.clone())
    }
}
