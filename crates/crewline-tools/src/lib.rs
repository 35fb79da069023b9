//! Tool abstractions for Crewline agents.
//!
//! Tools are externally supplied capabilities an agent may invoke while
//! executing a task. This crate defines their interface and keeps the
//! catalog; dispatch, rate limiting, and auditing live in the orchestrator's
//! tool orchestrator.

/// Tool catalog.
pub mod registry;
/// Compiled parameter schemas.
pub mod schema;
/// The tool interface.
pub mod tool;

pub use registry::ToolRegistry;
pub use schema::ParameterSchema;
pub use tool::{Tool, ToolContext, ToolDescriptor};
