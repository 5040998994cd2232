//! Background task supervision.

use std::future::Future;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Tracks fire-and-forget work spawned by runners, such as title
/// generation and memory formation.
#[derive(Debug, Clone, Default)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a tracked task.
    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, "Spawning background task");
        self.tracker.spawn(future);
    }

    /// Number of tasks still running.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for running tasks, up to `timeout`.
    ///
    /// Returns false if tasks were still running when `timeout` elapsed.
    /// Tasks spawned after a drain are still tracked.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let finished = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        self.tracker.reopen();
        if !finished {
            warn!(
                remaining = self.tracker.len(),
                "Background tasks still running after drain timeout"
            );
        }
        finished
    }
}
