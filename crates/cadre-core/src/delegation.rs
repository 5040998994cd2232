//! Delegation through nested runners.

use crate::error::RunnerError;
use crate::runner::{Runner, RunnerServices};
use async_trait::async_trait;
use cadre_tools::delegate::{DelegationRequest, Delegator};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs `agent_call` requests in a fresh runner one level deeper.
///
/// The nested runner shares every service with its parent (including the
/// session store) but starts with an empty session map.
pub struct RunnerDelegator {
    services: Arc<RunnerServices>,
}

impl RunnerDelegator {
    pub fn new(services: Arc<RunnerServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Delegator for RunnerDelegator {
    fn is_delegable(&self, agent: &str) -> bool {
        let catalog = &self.services.catalog;
        catalog.is_builtin(agent) || catalog.is_plugin(agent)
    }

    async fn delegate(
        &self,
        request: DelegationRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<String> {
        let mut agent = self
            .services
            .catalog
            .get(&request.agent)
            .ok_or_else(|| anyhow::anyhow!("unknown agent @{}", request.agent))?;
        if let Some(model) = request.model {
            agent.model = model;
        }

        let depth = request.depth + 1;
        let writer = &self.services.writer;
        debug!(caller = %request.caller, agent = %agent.handle, depth, "Starting nested run");

        writer.agent_start(&agent.handle, depth).await;
        let started = Instant::now();
        let runner = Runner::nested(Arc::clone(&self.services), depth);
        let result = tokio::select! {
            result = runner.text(&cancel, &agent, &request.prompt, &[]) => result,
            _ = cancel.cancelled() => Err(RunnerError::Cancelled),
        };
        writer.agent_end(&agent.handle, depth, started.elapsed()).await;

        Ok(result?)
    }
}
