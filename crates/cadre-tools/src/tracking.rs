//! Status tracking for todo lists and plans.
//!
//! Both tools compare the new item list with the previously stored one and
//! report which items just completed and which item just started.

use crate::{ToolError, ToolResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Item status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
}

impl Status {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Parse a status supplied by the model.
    pub fn require(s: &str, what: &str) -> ToolResult<Self> {
        Self::parse(s).ok_or_else(|| {
            ToolError::validation(format!(
                "invalid status '{s}' for {what}: expected pending, in_progress or completed"
            ))
        })
    }
}

/// A tracked item as submitted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub content: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub active_form: String,
}

impl TaskItem {
    /// Label announced when the item starts.
    pub fn started_label(&self) -> &str {
        if self.active_form.trim().is_empty() {
            &self.content
        } else {
            &self.active_form
        }
    }
}

/// Item input before status validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTaskItem {
    pub content: String,
    pub status: String,
    #[serde(default, alias = "activeForm")]
    pub active_form: Option<String>,
}

impl RawTaskItem {
    pub fn validate(self, index: usize) -> ToolResult<TaskItem> {
        if self.content.trim().is_empty() {
            return Err(ToolError::validation(format!(
                "item {} has empty content",
                index + 1
            )));
        }
        let status = Status::require(&self.status, &format!("'{}'", self.content))?;
        Ok(TaskItem {
            content: self.content,
            status,
            active_form: self.active_form.unwrap_or_default(),
        })
    }
}

/// Counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl StatusCounts {
    pub fn of<'a>(items: impl IntoIterator<Item = &'a TaskItem>) -> Self {
        let mut counts = Self::default();
        for item in items {
            match item.status {
                Status::Pending => counts.pending += 1,
                Status::InProgress => counts.in_progress += 1,
                Status::Completed => counts.completed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed
    }
}

/// Transitions detected between two submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusChanges {
    /// Items that moved into `completed`, in submission order.
    pub just_completed: Vec<String>,
    /// The last item that moved into `in_progress`.
    pub just_started: Option<String>,
}

impl StatusChanges {
    pub fn is_empty(&self) -> bool {
        self.just_completed.is_empty() && self.just_started.is_none()
    }
}

/// Accumulates changes against a snapshot of previous statuses.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    previous: HashMap<String, Status>,
    /// Only count completions of items present in the snapshot.
    require_known: bool,
    changes: StatusChanges,
}

impl ChangeTracker {
    pub fn new(previous: HashMap<String, Status>, require_known: bool) -> Self {
        Self {
            previous,
            require_known,
            changes: StatusChanges::default(),
        }
    }

    /// Record one item.
    pub fn observe(&mut self, key: &str, status: Status, completed_label: &str, started_label: &str) {
        let before = self.previous.get(key).copied();
        match status {
            Status::Completed if before != Some(Status::Completed) => {
                if !self.require_known || before.is_some() {
                    self.changes.just_completed.push(completed_label.to_string());
                }
            }
            Status::InProgress if before != Some(Status::InProgress) => {
                self.changes.just_started = Some(started_label.to_string());
            }
            _ => {}
        }
    }

    pub fn observe_item(&mut self, item: &TaskItem) {
        self.observe(&item.content, item.status, &item.content, item.started_label());
    }

    pub fn finish(self) -> StatusChanges {
        self.changes
    }
}

/// Snapshot of a flat item list keyed by content.
pub fn snapshot<'a>(items: impl IntoIterator<Item = &'a TaskItem>) -> HashMap<String, Status> {
    items
        .into_iter()
        .map(|item| (item.content.clone(), item.status))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(content: &str, status: Status) -> TaskItem {
        TaskItem {
            content: content.to_string(),
            status,
            active_form: String::new(),
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(Status::parse("in_progress"), Some(Status::InProgress));
        assert_eq!(Status::parse("done"), None);
        assert!(Status::require("done", "x").is_err());
    }

    #[test]
    fn test_completion_requires_known_item() {
        let previous = snapshot(&[item("a", Status::InProgress)]);
        let mut tracker = ChangeTracker::new(previous, true);
        tracker.observe_item(&item("a", Status::Completed));
        tracker.observe_item(&item("b", Status::Completed));
        let changes = tracker.finish();
        assert_eq!(changes.just_completed, vec!["a"]);
    }

    #[test]
    fn test_completion_without_known_requirement() {
        let mut tracker = ChangeTracker::new(HashMap::new(), false);
        tracker.observe_item(&item("b", Status::Completed));
        assert_eq!(tracker.finish().just_completed, vec!["b"]);
    }

    #[test]
    fn test_just_started_last_write_wins() {
        let previous = snapshot(&[item("a", Status::Pending), item("b", Status::Pending)]);
        let mut tracker = ChangeTracker::new(previous, true);
        let mut first = item("a", Status::InProgress);
        first.active_form = "Doing a".into();
        tracker.observe_item(&first);
        tracker.observe_item(&item("b", Status::InProgress));
        assert_eq!(tracker.finish().just_started.as_deref(), Some("b"));
    }

    #[test]
    fn test_unchanged_items_report_nothing() {
        let items = [item("a", Status::Completed), item("b", Status::InProgress)];
        let mut tracker = ChangeTracker::new(snapshot(&items), true);
        for i in &items {
            tracker.observe_item(i);
        }
        assert!(tracker.finish().is_empty());
    }

    #[test]
    fn test_started_label_prefers_active_form() {
        let mut i = item("Run tests", Status::InProgress);
        assert_eq!(i.started_label(), "Run tests");
        i.active_form = "Running tests".into();
        assert_eq!(i.started_label(), "Running tests");
    }

    #[test]
    fn test_counts() {
        let items = [
            item("a", Status::Pending),
            item("b", Status::Completed),
            item("c", Status::Completed),
        ];
        let counts = StatusCounts::of(&items);
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.total(), 3);
    }
}
