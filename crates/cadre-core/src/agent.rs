//! Agent definitions and the catalog that resolves handles to them.
//!
//! An agent is a named configuration: model, prompts, allowed tools and
//! optional input/output schemas. Definitions are immutable for the
//! duration of a run.

use cadre_tools::delegate::normalize_handle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// Where an agent definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSource {
    /// Shipped with the tool. Reserved handles.
    Builtin,
    /// Provided by an installed plugin.
    Plugin,
    /// Defined by the user.
    #[default]
    User,
}

impl AgentSource {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "builtin" => Some(Self::Builtin),
            "plugin" => Some(Self::Plugin),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// An agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Agent handle, without the leading `@`.
    pub handle: String,

    /// Model identifier (`provider/model` or bare model id).
    #[serde(default)]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Main system prompt.
    #[serde(default)]
    pub system_prompt: String,

    /// Extra instructions on how to use the agent's tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_prompt: Option<String>,

    /// Tool ids the agent may call.
    #[serde(default)]
    pub allowed_tools: Vec<String>,

    /// JSON schema the input is expected to follow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,

    /// JSON schema the final reply is cast into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Retrieve memories into the prompt and form new ones after turns.
    #[serde(default)]
    pub memory_enabled: bool,

    #[serde(default)]
    pub source: AgentSource,
}

impl AgentDefinition {
    /// A user agent with the given handle and model.
    pub fn new(handle: impl AsRef<str>, model: impl Into<String>) -> Self {
        Self {
            handle: normalize_handle(handle.as_ref()),
            model: model.into(),
            description: None,
            system_prompt: String::new(),
            tool_prompt: None,
            skill_prompt: None,
            allowed_tools: Vec::new(),
            input_schema: None,
            output_schema: None,
            memory_enabled: false,
            source: AgentSource::User,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tool_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.tool_prompt = Some(prompt.into());
        self
    }

    pub fn with_skill_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.skill_prompt = Some(prompt.into());
        self
    }

    /// Allow the given tool ids.
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_memory(mut self, enabled: bool) -> Self {
        self.memory_enabled = enabled;
        self
    }

    pub fn with_source(mut self, source: AgentSource) -> Self {
        self.source = source;
        self
    }

    /// Whether the agent may call `tool`.
    pub fn allows(&self, tool: &str) -> bool {
        self.allowed_tools.iter().any(|t| t == tool || t == "*")
    }

    pub fn is_builtin(&self) -> bool {
        self.source == AgentSource::Builtin
    }
}

/// Looks up agent definitions by handle.
///
/// Handles passed in are already normalized.
#[cfg_attr(test, mockall::automock)]
pub trait AgentCatalog: Send + Sync {
    fn get(&self, handle: &str) -> Option<AgentDefinition>;

    /// Whether `handle` is a reserved builtin agent.
    fn is_builtin(&self, handle: &str) -> bool;

    /// Whether `handle` belongs to a recognized plugin agent.
    fn is_plugin(&self, handle: &str) -> bool;

    /// All known handles, sorted.
    fn list(&self) -> Vec<String>;
}

/// Supplies skill-derived tools and prompt text for an agent.
#[cfg_attr(test, mockall::automock)]
pub trait SkillSource: Send + Sync {
    /// Extra tool ids granted by the agent's skills.
    fn allowed_tools(&self, agent: &AgentDefinition) -> Vec<String>;

    fn skill_prompt(&self, agent: &AgentDefinition) -> Option<String>;
}

/// An in-memory catalog.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    agents: RwLock<HashMap<String, AgentDefinition>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any existing one with the same handle.
    pub fn register(&self, mut agent: AgentDefinition) {
        agent.handle = normalize_handle(&agent.handle);
        if let Ok(mut agents) = self.agents.write() {
            agents.insert(agent.handle.clone(), agent);
        }
    }

    pub fn with_agent(self, agent: AgentDefinition) -> Self {
        self.register(agent);
        self
    }

    fn source_of(&self, handle: &str) -> Option<AgentSource> {
        self.agents
            .read()
            .ok()?
            .get(&normalize_handle(handle))
            .map(|a| a.source)
    }
}

impl AgentCatalog for StaticCatalog {
    fn get(&self, handle: &str) -> Option<AgentDefinition> {
        self.agents
            .read()
            .ok()?
            .get(&normalize_handle(handle))
            .cloned()
    }

    fn is_builtin(&self, handle: &str) -> bool {
        self.source_of(handle) == Some(AgentSource::Builtin)
    }

    fn is_plugin(&self, handle: &str) -> bool {
        self.source_of(handle) == Some(AgentSource::Plugin)
    }

    fn list(&self) -> Vec<String> {
        let mut handles: Vec<String> = self
            .agents
            .read()
            .map(|agents| agents.keys().cloned().collect())
            .unwrap_or_default();
        handles.sort();
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_handle() {
        let agent = AgentDefinition::new("  @Reviewer ", "test/model");
        assert_eq!(agent.handle, "reviewer");
        assert_eq!(agent.source, AgentSource::User);
    }

    #[test]
    fn test_allows() {
        let agent = AgentDefinition::new("coder", "m").with_tools(["shell", "todowrite"]);
        assert!(agent.allows("shell"));
        assert!(!agent.allows("planwrite"));

        let any = AgentDefinition::new("any", "m").with_tools(["*"]);
        assert!(any.allows("planwrite"));
    }

    #[test]
    fn test_catalog_sources() {
        let catalog = StaticCatalog::new()
            .with_agent(AgentDefinition::new("explore", "m").with_source(AgentSource::Builtin))
            .with_agent(AgentDefinition::new("lint", "m").with_source(AgentSource::Plugin))
            .with_agent(AgentDefinition::new("mine", "m"));

        assert!(catalog.is_builtin("@Explore"));
        assert!(catalog.is_plugin("lint"));
        assert!(!catalog.is_builtin("mine"));
        assert!(!catalog.is_plugin("mine"));
        assert!(!catalog.is_builtin("missing"));
        assert_eq!(catalog.list(), vec!["explore", "lint", "mine"]);
    }

    #[test]
    fn test_definition_deserializes_with_defaults() {
        let agent: AgentDefinition = serde_json::from_str(
            r#"{"handle": "coder", "model": "test/m", "source": "plugin"}"#,
        )
        .unwrap();
        assert_eq!(agent.source, AgentSource::Plugin);
        assert!(agent.allowed_tools.is_empty());
        assert!(!agent.memory_enabled);
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(AgentSource::parse("builtin"), Some(AgentSource::Builtin));
        assert_eq!(AgentSource::parse("other"), None);
    }
}
