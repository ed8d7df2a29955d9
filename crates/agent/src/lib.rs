//! The agent loop.
//!
//! Plan (consult the oracle), act (dispatch the chosen tool), observe
//! (record the step), learn (feed failures and reviews back into the
//! learning store and the memory index). The loop is bounded on every
//! axis: parse attempts, consecutive failures, and total iterations.

pub mod decision;
pub mod loop_runner;

pub use decision::parse_decision;
pub use loop_runner::AgentLoop;
