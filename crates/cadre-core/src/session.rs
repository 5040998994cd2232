//! In-process chat sessions keyed by agent handle.

use cadre_provider::Message;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Conversation state for one agent handle.
#[derive(Debug, Default)]
pub struct ChatSession {
    /// Accumulated messages, system prompt first.
    pub messages: Vec<Message>,
    /// Persisted session id, when a store is configured.
    pub session_id: Option<String>,
    pub title_generated: bool,
    /// System messages have been assembled.
    pub initialized: bool,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no turn has completed yet.
    pub fn is_first_turn(&self) -> bool {
        !self.messages.iter().any(|m| m.role != cadre_provider::Role::System)
    }
}

/// Shared handle to a session. Holding the lock serializes turns.
pub type SessionHandle = Arc<tokio::sync::Mutex<ChatSession>>;

/// Sessions for the lifetime of the process.
///
/// The outer lock only guards the map; each session has its own async
/// mutex that a turn holds from start to finish.
#[derive(Debug, Default)]
pub struct SessionMap {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session for `handle`, created empty on first use.
    pub fn get_or_create(&self, handle: &str) -> SessionHandle {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions
            .entry(handle.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(ChatSession::new())))
            .clone()
    }

    pub fn get(&self, handle: &str) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(handle)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
