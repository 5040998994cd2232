//! In-memory memory service.

use async_trait::async_trait;
use cadre_tools::memory::{MemoryRecord, MemoryService, NewMemory};
use cadre_util::{IdPrefix, Identifier};
use chrono::Utc;
use std::sync::Mutex;

/// A [`MemoryService`] that keeps memories in a vector and searches by
/// case-insensitive keyword overlap.
#[derive(Debug, Default)]
pub struct InMemoryMemoryService {
    records: Mutex<Vec<MemoryRecord>>,
    embedder: bool,
}

impl InMemoryMemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an embedder as available.
    pub fn with_embedder(mut self) -> Self {
        self.embedder = true;
        self
    }

    /// Seed a memory.
    pub fn with_memory(self, content: &str, category: Option<&str>) -> Self {
        self.records.lock().unwrap().push(Self::record(NewMemory {
            content: content.to_string(),
            category: category.map(str::to_string),
            agent: None,
        }));
        self
    }

    pub fn records(&self) -> Vec<MemoryRecord> {
        self.records.lock().unwrap().clone()
    }

    fn record(memory: NewMemory) -> MemoryRecord {
        MemoryRecord {
            id: Identifier::ascending(IdPrefix::Memory),
            content: memory.content,
            category: memory.category,
            agent: memory.agent,
            created_at: Utc::now(),
            score: None,
        }
    }
}

#[async_trait]
impl MemoryService for InMemoryMemoryService {
    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<MemoryRecord>> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        let records = self.records.lock().unwrap();
        let mut scored: Vec<MemoryRecord> = records
            .iter()
            .filter_map(|r| {
                let content = r.content.to_lowercase();
                let hits = words.iter().filter(|w| content.contains(w.as_str())).count();
                (hits > 0).then(|| MemoryRecord {
                    score: Some(hits as f32 / words.len().max(1) as f32),
                    ..r.clone()
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn create(&self, memory: NewMemory) -> anyhow::Result<MemoryRecord> {
        let record = Self::record(memory);
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn supersede(&self, old_id: &str, memory: NewMemory) -> anyhow::Result<MemoryRecord> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != old_id);
        if records.len() == before {
            anyhow::bail!("memory {old_id} not found");
        }
        let record = Self::record(memory);
        records.push(record.clone());
        Ok(record)
    }

    async fn list(&self, category: Option<String>, limit: usize) -> anyhow::Result<Vec<MemoryRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| category.is_none() || r.category == category)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn forget(&self, id: &str) -> anyhow::Result<bool> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }

    fn has_embedder(&self) -> bool {
        self.embedder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyword_search_and_forget() {
        let service = InMemoryMemoryService::new()
            .with_memory("User prefers tabs over spaces", Some("prefs"))
            .with_memory("Project uses PostgreSQL", None);

        let hits = service.search("tabs", 10).await.unwrap();
        assert_eq!(hits.len(), 1);

        let id = hits[0].id.clone();
        assert!(matches!(Identifier::parse(&id), Some((IdPrefix::Memory, _))));
        assert!(service.forget(&id).await.unwrap());
        assert!(!service.forget(&id).await.unwrap());
        assert_eq!(service.list(None, 10).await.unwrap().len(), 1);
    }
}
