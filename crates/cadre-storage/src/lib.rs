//! Storage layer for cadre.
//!
//! - [`ToolDb`]: a private SQLite file per stateful tool
//! - [`SessionStore`]: the persistence contract the runner and plan tool use
//! - [`MemorySessionStore`]: an in-memory implementation of it

pub mod error;
pub mod memory;
pub mod session;
pub mod tool_db;

pub use error::{StorageError, StorageResult};
pub use memory::MemorySessionStore;
pub use session::{SessionRecord, SessionStore};
pub use tool_db::ToolDb;
