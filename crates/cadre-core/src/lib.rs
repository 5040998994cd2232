//! Agent execution core for cadre.
//!
//! This crate drives agent turns on top of the tool and provider crates:
//! - [`Runner`]: chat and one-shot turns, tool dispatch, persistence
//! - [`stream`]: push-based progress events and their sinks
//! - [`cast`]: structured-output casting with retries
//! - [`delegation`]: `agent_call` through nested runners
//! - [`config`]: JSONC configuration loading

pub mod agent;
pub mod attachment;
pub mod cast;
pub mod config;
pub mod delegation;
pub mod error;
pub mod memory;
pub mod prompt;
pub mod runner;
pub mod session;
pub mod stream;
pub mod supervisor;

pub use agent::{AgentCatalog, AgentDefinition, AgentSource, SkillSource, StaticCatalog};
pub use attachment::Attachment;
pub use cast::Caster;
pub use config::RunnerConfig;
pub use error::{CastError, ConfigError, RunnerError, RunnerResult};
pub use memory::{DuplicateCheck, MemoryFormation, MemoryOutcome};
pub use runner::{Runner, RunnerServices, RunnerServicesBuilder};
pub use session::{ChatSession, SessionMap};
pub use stream::{
    ChannelWriter, NullWriter, PrintWriter, SharedWriter, StreamEvent, StreamWriter, ToolCallInfo,
    ToolResultInfo,
};
pub use supervisor::TaskSupervisor;
