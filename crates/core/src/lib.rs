//! # Ironloop Core
//!
//! Domain types, traits, and error definitions for the Ironloop resilient
//! agent core. This crate has **zero framework dependencies** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait at the seam it
//! crosses: the decision oracle and the tools live here, and
//! implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod oracle;
pub mod run;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, LearningError, MemoryError, OracleError, ResilienceError, Result, ToolError};
pub use oracle::{ActionRequest, Decision, Oracle};
pub use run::{AgentRunResult, ExecutionStep, RunId, RunStatus, StepStatus};
pub use tool::{Tool, ToolRegistry};

/// The action name that terminates a run successfully.
pub const FINISH_TASK: &str = "finish_task";
