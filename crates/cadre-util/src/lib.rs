//! Shared utilities for cadre.
//!
//! - ULID-based identifier generation
//! - Logging setup with tracing
//! - Path confinement helpers
//! - UTF-8 safe truncation

pub mod id;
pub mod log;
pub mod path;
pub mod text;

pub use id::{IdPrefix, Identifier};
