//! Tool dispatch with resilience policy.
//!
//! The dispatcher is the only path from the agent loop to a tool. It
//! classifies tools by name, retries transient network failures with
//! exponential backoff, wraps everything in the shared `tool_execution`
//! breaker, and exchanges parameter corrections and success records with
//! the learning store.

pub mod builtin;
pub mod classify;
pub mod dispatcher;

pub use builtin::FinishTaskTool;
pub use classify::{classify_tool, is_retryable, ToolClass, NETWORK_MARKERS, RETRYABLE_MARKERS};
pub use dispatcher::{ToolDispatcher, TOOL_EXECUTION_BREAKER};
