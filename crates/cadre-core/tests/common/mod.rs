//! Shared harness for runner integration tests.

#![allow(dead_code)]

use cadre_core::{
    ChannelWriter, Runner, RunnerConfig, RunnerServices, RunnerServicesBuilder, StaticCatalog,
    StreamEvent,
};
use cadre_storage::MemorySessionStore;
use cadre_test_utils::{BuiltTestProject, RecordingProvider, ScriptedResolver, TestProject};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Model id every harness routes title generation to.
pub const TITLE_MODEL: &str = "test/title";

/// Config shared by all harnesses. Titles never touch the agent's model.
pub fn base_config() -> RunnerConfig {
    RunnerConfig {
        title_model: Some(TITLE_MODEL.to_string()),
        ..Default::default()
    }
}

pub struct Harness {
    pub project: BuiltTestProject,
    /// Answers title requests.
    pub titles: RecordingProvider,
    pub store: Arc<MemorySessionStore>,
    pub services: Arc<RunnerServices>,
    pub runner: Runner,
    events: mpsc::Receiver<StreamEvent>,
}

impl Harness {
    /// A runner with a session store and default config.
    pub fn new(resolver: ScriptedResolver, catalog: StaticCatalog) -> Self {
        Self::with(resolver, catalog, |builder| builder)
    }

    /// A runner with no session store.
    pub fn without_store(resolver: ScriptedResolver, catalog: StaticCatalog) -> Self {
        Self::build(resolver, catalog, false, |builder| builder)
    }

    /// A runner whose services are adjusted by `configure`.
    pub fn with(
        resolver: ScriptedResolver,
        catalog: StaticCatalog,
        configure: impl FnOnce(RunnerServicesBuilder) -> RunnerServicesBuilder,
    ) -> Self {
        Self::build(resolver, catalog, true, configure)
    }

    fn build(
        resolver: ScriptedResolver,
        catalog: StaticCatalog,
        persist: bool,
        configure: impl FnOnce(RunnerServicesBuilder) -> RunnerServicesBuilder,
    ) -> Self {
        let project = TestProject::new().build();
        let store = Arc::new(MemorySessionStore::new());
        let (writer, events) = ChannelWriter::new(1024);
        let titles = RecordingProvider::new();
        let resolver = resolver.with_model(TITLE_MODEL, titles.clone());

        let mut builder = RunnerServices::builder(
            Arc::new(resolver),
            Arc::new(catalog),
            Arc::new(writer),
            project.sandbox(),
        )
        .config(RunnerConfig {
            data_dir: Some(project.data_dir()),
            ..base_config()
        });
        if persist {
            builder = builder.session_store(store.clone());
        }

        let services = configure(builder).build();
        let runner = Runner::new(Arc::clone(&services));
        Self {
            project,
            titles,
            store,
            services,
            runner,
            events,
        }
    }

    /// Events emitted so far.
    pub fn events(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for background tasks to finish.
    pub async fn drain(&self) {
        assert!(
            self.services.supervisor.drain(Duration::from_secs(5)).await,
            "background tasks did not finish"
        );
    }
}

pub fn count<F: Fn(&StreamEvent) -> bool>(events: &[StreamEvent], pred: F) -> usize {
    events.iter().filter(|e| pred(e)).count()
}
