//! Agent runner.
//!
//! A [`Runner`] drives turns for agent definitions: it assembles the system
//! prompt and tool set, streams the model, dispatches tool calls, and
//! persists the exchange. Services shared by every runner, nested ones
//! included, live in [`RunnerServices`].

mod title;
mod turn;

use crate::agent::{AgentCatalog, AgentDefinition, SkillSource};
use crate::attachment::Attachment;
use crate::config::RunnerConfig;
use crate::delegation::RunnerDelegator;
use crate::error::{RunnerError, RunnerResult};
use crate::memory::{form_memory, memory_context, MemoryFormation};
use crate::prompt::{system_messages, PromptParts};
use crate::session::{ChatSession, SessionMap};
use crate::stream::SharedWriter;
use crate::supervisor::TaskSupervisor;
use cadre_provider::{ContentPart, Message, ModelResolver, Role};
use cadre_sandbox::Sandbox;
use cadre_storage::SessionStore;
use cadre_tools::delegate::{AgentCallTool, AGENT_CALL_TOOL};
use cadre_tools::external::ExternalTool;
use cadre_tools::memory::{MemoryService, MemoryTool};
use cadre_tools::plan::PlanWriteTool;
use cadre_tools::shell::ShellTool;
use cadre_tools::todo::{TodoStore, TodoWriteTool};
use cadre_tools::{BoxedTool, ToolRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Collaborators shared by a runner and every runner nested under it.
pub struct RunnerServices {
    pub config: RunnerConfig,
    pub resolver: Arc<dyn ModelResolver>,
    pub catalog: Arc<dyn AgentCatalog>,
    pub writer: SharedWriter,
    pub sandbox: Arc<Sandbox>,
    pub session_store: Option<Arc<dyn SessionStore>>,
    pub memory: Option<Arc<dyn MemoryService>>,
    pub formation: Option<Arc<dyn MemoryFormation>>,
    pub skills: Option<Arc<dyn SkillSource>>,
    pub supervisor: TaskSupervisor,
    /// Every tool an agent may be granted, except `agent_call`.
    tools: ToolRegistry,
}

impl RunnerServices {
    pub fn builder(
        resolver: Arc<dyn ModelResolver>,
        catalog: Arc<dyn AgentCatalog>,
        writer: SharedWriter,
        sandbox: Arc<Sandbox>,
    ) -> RunnerServicesBuilder {
        RunnerServicesBuilder {
            config: RunnerConfig::default(),
            resolver,
            catalog,
            writer,
            sandbox,
            session_store: None,
            memory: None,
            formation: None,
            skills: None,
            supervisor: TaskSupervisor::new(),
        }
    }

    /// Tools available for granting, sorted by id.
    pub fn tool_ids(&self) -> Vec<&str> {
        self.tools.list()
    }
}

/// Builder for [`RunnerServices`].
pub struct RunnerServicesBuilder {
    config: RunnerConfig,
    resolver: Arc<dyn ModelResolver>,
    catalog: Arc<dyn AgentCatalog>,
    writer: SharedWriter,
    sandbox: Arc<Sandbox>,
    session_store: Option<Arc<dyn SessionStore>>,
    memory: Option<Arc<dyn MemoryService>>,
    formation: Option<Arc<dyn MemoryFormation>>,
    skills: Option<Arc<dyn SkillSource>>,
    supervisor: TaskSupervisor,
}

impl RunnerServicesBuilder {
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn memory(mut self, service: Arc<dyn MemoryService>) -> Self {
        self.memory = Some(service);
        self
    }

    pub fn formation(mut self, formation: Arc<dyn MemoryFormation>) -> Self {
        self.formation = Some(formation);
        self
    }

    pub fn skills(mut self, skills: Arc<dyn SkillSource>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn supervisor(mut self, supervisor: TaskSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Assemble the tool pool and freeze the services.
    pub fn build(self) -> Arc<RunnerServices> {
        let root = self.sandbox.base_dir().to_path_buf();
        let mut tools = ToolRegistry::new();

        tools.register(Arc::new(ShellTool::new(Arc::clone(&self.sandbox))));
        tools.register(Arc::new(TodoWriteTool::new(TodoStore::new(
            &self.config.data_dir(&root),
        ))));
        tools.register(Arc::new(PlanWriteTool::new()));
        if let Some(memory) = &self.memory {
            tools.register(Arc::new(MemoryTool::new(Arc::clone(memory))));
        }

        if let Some(dir) = &self.config.tools_dir {
            let dir = if dir.is_absolute() {
                dir.clone()
            } else {
                root.join(dir)
            };
            match ExternalTool::load_dir(&dir, Arc::clone(&self.sandbox)) {
                Ok(external) => {
                    for tool in external {
                        if tools.contains(tool.id()) {
                            warn!(tool = %tool.id(), "External tool shadows a builtin, skipping");
                            continue;
                        }
                        tools.register(tool);
                    }
                }
                Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to load external tools"),
            }
        }

        info!(tools = tools.len(), root = %root.display(), "Runner services ready");

        Arc::new(RunnerServices {
            config: self.config,
            resolver: self.resolver,
            catalog: self.catalog,
            writer: self.writer,
            sandbox: self.sandbox,
            session_store: self.session_store,
            memory: self.memory,
            formation: self.formation,
            skills: self.skills,
            supervisor: self.supervisor,
            tools,
        })
    }
}

/// Drives agent turns.
pub struct Runner {
    services: Arc<RunnerServices>,
    sessions: SessionMap,
    depth: usize,
    agent_call: BoxedTool,
}

impl Runner {
    /// A top-level runner.
    pub fn new(services: Arc<RunnerServices>) -> Self {
        Self::nested(services, 0)
    }

    /// A runner at delegation `depth` with a fresh session map.
    pub fn nested(services: Arc<RunnerServices>, depth: usize) -> Self {
        let limits = services.config.delegation_limits();
        let delegator = Arc::new(RunnerDelegator::new(Arc::clone(&services)));
        Self {
            agent_call: Arc::new(AgentCallTool::new(delegator, limits)),
            services,
            sessions: SessionMap::new(),
            depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn services(&self) -> &Arc<RunnerServices> {
        &self.services
    }

    pub fn sessions(&self) -> &SessionMap {
        &self.sessions
    }

    /// Run one turn of the agent's ongoing conversation.
    ///
    /// Turns for the same handle are serialized. A failed turn leaves the
    /// session as it was before the turn.
    pub async fn chat(
        &self,
        cancel: &CancellationToken,
        agent: &AgentDefinition,
        input: &str,
    ) -> RunnerResult<String> {
        let result = async {
            ensure_model(agent)?;
            let handle = self.sessions.get_or_create(&agent.handle);
            let mut session = handle.lock().await;
            self.turn(cancel, agent, &mut session, Message::user(input), input, true)
                .await
        }
        .await;
        self.finish(result).await
    }

    /// Run a one-shot prompt with optional attachments.
    ///
    /// Nothing is kept in the runner's session map.
    pub async fn text(
        &self,
        cancel: &CancellationToken,
        agent: &AgentDefinition,
        prompt: &str,
        attachments: &[Attachment],
    ) -> RunnerResult<String> {
        let result = async {
            ensure_model(agent)?;
            let mut parts = vec![ContentPart::text(prompt)];
            for attachment in attachments {
                parts.extend(attachment.to_parts().await);
            }
            let mut session = ChatSession::new();
            self.turn(
                cancel,
                agent,
                &mut session,
                Message::new(Role::User, parts),
                prompt,
                false,
            )
            .await
        }
        .await;
        self.finish(result).await
    }

    async fn finish(&self, result: RunnerResult<String>) -> RunnerResult<String> {
        let writer = &self.services.writer;
        match &result {
            Ok(reply) if self.depth == 0 => writer.done(reply).await,
            Ok(_) => {}
            Err(e) if self.depth == 0 => writer.error(&e.to_string()).await,
            // The caller sees nested failures as a tool error.
            Err(e) => debug!(depth = self.depth, error = %e, "Nested run failed"),
        }
        result
    }

    async fn turn(
        &self,
        cancel: &CancellationToken,
        agent: &AgentDefinition,
        session: &mut ChatSession,
        user: Message,
        user_text: &str,
        titled: bool,
    ) -> RunnerResult<String> {
        let services = &self.services;
        let first_turn = session.is_first_turn();

        if !session.initialized {
            self.initialize(agent, session, user_text).await;
        }

        let model = services.resolver.resolve(&agent.model).await?;
        let tools = self.tool_set(agent);

        let mut messages = session.messages.clone();
        messages.push(user.clone());

        let reply = turn::run_steps(
            turn::StepContext {
                services,
                agent,
                model: &model,
                tools: &tools,
                session_id: session.session_id.as_deref(),
                depth: self.depth,
                cancel,
            },
            messages,
        )
        .await?;

        let reply = match &agent.output_schema {
            Some(schema) => {
                let caster = crate::cast::Caster::new(model, services.config.cast_attempts());
                let value = caster.cast(&reply, schema, cancel).await?;
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
            None => reply,
        };

        let assistant = Message::assistant(reply.clone());
        session.messages.push(user.clone());
        session.messages.push(assistant.clone());

        if let (Some(store), Some(session_id)) = (&services.session_store, &session.session_id) {
            for message in [&user, &assistant] {
                if let Err(e) = store.append_message(session_id, message).await {
                    warn!(session = %session_id, error = %e, "Failed to persist message");
                }
            }

            if titled && first_turn && !session.title_generated {
                session.title_generated = true;
                let model_id = services
                    .config
                    .title_model
                    .clone()
                    .unwrap_or_else(|| agent.model.clone());
                services.supervisor.spawn(
                    "title",
                    title::generate_title(
                        Arc::clone(&services.resolver),
                        Arc::clone(store),
                        model_id,
                        session_id.clone(),
                        user_text.to_string(),
                        reply.clone(),
                    ),
                );
            }
        }

        self.spawn_memory_formation(agent, user_text, &reply);

        Ok(reply)
    }

    /// Build system messages and open a persisted session.
    async fn initialize(&self, agent: &AgentDefinition, session: &mut ChatSession, user_text: &str) {
        let services = &self.services;

        let memory_context = match (&services.memory, agent.memory_enabled) {
            (Some(memory), true) => memory_context(&**memory, user_text).await,
            _ => None,
        };
        let skill_prompt = services
            .skills
            .as_ref()
            .and_then(|skills| skills.skill_prompt(agent));
        let delegates = if self.offers_agent_call(agent) {
            self.delegates(agent)
        } else {
            Vec::new()
        };

        session.messages = system_messages(
            agent,
            PromptParts {
                memory_context,
                skill_prompt,
                delegates,
            },
        );

        if let Some(store) = &services.session_store {
            match store.create_session(&agent.handle).await {
                Ok(record) => {
                    debug!(session = %record.id, agent = %agent.handle, "Session created");
                    session.session_id = Some(record.id);
                }
                Err(e) => warn!(agent = %agent.handle, error = %e, "Failed to create session"),
            }
        }
        session.initialized = true;
    }

    fn offers_agent_call(&self, agent: &AgentDefinition) -> bool {
        let builtin = agent.is_builtin() || self.services.catalog.is_builtin(&agent.handle);
        agent.allows(AGENT_CALL_TOOL) || !builtin
    }

    /// Delegable agents other than `agent`, with descriptions.
    fn delegates(&self, agent: &AgentDefinition) -> Vec<(String, Option<String>)> {
        let catalog = &self.services.catalog;
        catalog
            .list()
            .into_iter()
            .filter(|handle| *handle != agent.handle)
            .filter(|handle| catalog.is_builtin(handle) || catalog.is_plugin(handle))
            .map(|handle| {
                let description = catalog.get(&handle).and_then(|a| a.description);
                (handle, description)
            })
            .collect()
    }

    /// The tools granted to `agent` for this turn.
    fn tool_set(&self, agent: &AgentDefinition) -> ToolRegistry {
        let mut allowed = agent.allowed_tools.clone();
        if let Some(skills) = &self.services.skills {
            allowed.extend(skills.allowed_tools(agent));
        }
        let wildcard = allowed.iter().any(|t| t == "*");

        let mut registry = ToolRegistry::new();
        for id in self.services.tools.list() {
            if wildcard || allowed.iter().any(|t| t == id) {
                if let Some(tool) = self.services.tools.get(id) {
                    registry.register(Arc::clone(tool));
                }
            }
        }
        if self.offers_agent_call(agent) {
            registry.register(Arc::clone(&self.agent_call));
        }
        registry
    }

    fn spawn_memory_formation(&self, agent: &AgentDefinition, user: &str, assistant: &str) {
        let services = &self.services;
        let (Some(formation), Some(memory)) = (&services.formation, &services.memory) else {
            return;
        };
        if !agent.memory_enabled {
            return;
        }

        let formation = Arc::clone(formation);
        let memory = Arc::clone(memory);
        let writer = Arc::clone(&services.writer);
        let handle = agent.handle.clone();
        let user = user.to_string();
        let assistant = assistant.to_string();
        services.supervisor.spawn("memory", async move {
            let outcome = form_memory(&*formation, &*memory, &handle, &user, &assistant).await;
            writer.memory_event(&outcome).await;
        });
    }
}

fn ensure_model(agent: &AgentDefinition) -> RunnerResult<()> {
    if agent.model.trim().is_empty() {
        return Err(RunnerError::EmptyModel(agent.handle.clone()));
    }
    Ok(())
}
