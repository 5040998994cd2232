//! Memory retrieval and formation around a turn.

use async_trait::async_trait;
use cadre_tools::memory::{MemoryService, NewMemory};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Memories retrieved into the system prompt.
pub const CONTEXT_LIMIT: usize = 5;

/// Result of a duplicate check against stored memories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateCheck {
    Unique,
    /// An equivalent memory already exists.
    Duplicate { existing_id: String },
    /// The candidate replaces an older memory.
    Supersedes { existing_id: String },
}

/// Decides what, if anything, a finished turn should remember.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemoryFormation: Send + Sync {
    /// Extract a memory candidate from one exchange.
    async fn extract(
        &self,
        agent: &str,
        user: &str,
        assistant: &str,
    ) -> anyhow::Result<Option<NewMemory>>;

    async fn check_duplicate(&self, candidate: &NewMemory) -> anyhow::Result<DuplicateCheck>;
}

/// What memory formation did after a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MemoryOutcome {
    Created { id: String },
    Skipped { reason: String },
    Superseded { old_id: String, new_id: String },
    Failed { error: String },
}

/// Run extraction, deduplication and storage for one exchange.
pub async fn form_memory(
    formation: &dyn MemoryFormation,
    service: &dyn MemoryService,
    agent: &str,
    user: &str,
    assistant: &str,
) -> MemoryOutcome {
    match try_form(formation, service, agent, user, assistant).await {
        Ok(outcome) => outcome,
        Err(e) => {
            debug!(agent = %agent, error = %e, "Memory formation failed");
            MemoryOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

async fn try_form(
    formation: &dyn MemoryFormation,
    service: &dyn MemoryService,
    agent: &str,
    user: &str,
    assistant: &str,
) -> anyhow::Result<MemoryOutcome> {
    let Some(mut candidate) = formation.extract(agent, user, assistant).await? else {
        return Ok(MemoryOutcome::Skipped {
            reason: "nothing worth remembering".to_string(),
        });
    };
    if candidate.agent.is_none() {
        candidate.agent = Some(agent.to_string());
    }

    match formation.check_duplicate(&candidate).await? {
        DuplicateCheck::Unique => {
            let record = service.create(candidate).await?;
            Ok(MemoryOutcome::Created { id: record.id })
        }
        DuplicateCheck::Duplicate { existing_id } => Ok(MemoryOutcome::Skipped {
            reason: format!("duplicate of {existing_id}"),
        }),
        DuplicateCheck::Supersedes { existing_id } => {
            let record = service.supersede(&existing_id, candidate).await?;
            Ok(MemoryOutcome::Superseded {
                old_id: existing_id,
                new_id: record.id,
            })
        }
    }
}

/// Render memories relevant to `query` as a prompt preamble.
///
/// Returns `None` when nothing matches or the search fails.
pub async fn memory_context(service: &dyn MemoryService, query: &str) -> Option<String> {
    let records = match service.search(query, CONTEXT_LIMIT).await {
        Ok(records) => records,
        Err(e) => {
            debug!(error = %e, "Memory search failed");
            return None;
        }
    };
    if records.is_empty() {
        return None;
    }

    let mut context = String::from("Relevant memories from earlier sessions:\n");
    for record in records {
        match &record.category {
            Some(category) => context.push_str(&format!("- [{category}] {}\n", record.content)),
            None => context.push_str(&format!("- {}\n", record.content)),
        }
    }
    Some(context)
}
