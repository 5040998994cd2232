//! Testing utilities, fixtures, and scripted collaborators for cadre.
//!
//! - **Providers**: a scripted [`RecordingProvider`] and a [`ScriptedResolver`]
//! - **Memory**: an in-memory [`InMemoryMemoryService`]
//! - **Fixtures**: [`TestProject`] temp-dir projects with a ready sandbox
//!
//! ```rust,ignore
//! use cadre_test_utils::{RecordingProvider, ScriptedResolver};
//!
//! let provider = RecordingProvider::new()
//!     .with_tool_call("call_1", "shell", r#"{"command":"echo hi"}"#)
//!     .with_response("done");
//! let resolver = ScriptedResolver::new().with_model("test/model", provider.clone());
//! ```

pub mod fixtures;
pub mod memory;
pub mod providers;

pub use fixtures::{BuiltTestProject, TestProject};
pub use memory::InMemoryMemoryService;
pub use providers::{ProviderResponse, RecordedCall, RecordingProvider, ScriptedResolver};
