//! Run history domain types.
//!
//! An agent run is a sequence of `ExecutionStep`s terminated by an
//! `AgentRunResult`. Steps are appended as they happen and never mutated
//! afterwards; the full history travels with the result so a caller can
//! reconstruct exactly what was tried and why the run stopped.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::oracle::ActionRequest;

/// Unique identifier for one agent run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Error,
}

/// One plan → act → observe iteration, recorded after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// 1-based step index within the run.
    pub step: usize,

    /// The oracle's reasoning for this step.
    pub thought: String,

    /// The action the oracle chose.
    pub action: ActionRequest,

    /// The tool output, or an error description prefixed with "Error:".
    pub result: String,

    /// Whether the step succeeded.
    pub status: StepStatus,
}

impl ExecutionStep {
    pub fn is_error(&self) -> bool {
        self.status == StepStatus::Error
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
    /// Reserved for flows where the oracle needs user input mid-run.
    RequiresInput,
}

/// The terminal value of one agent loop invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunResult {
    pub run_id: RunId,
    pub status: RunStatus,

    /// Human-readable explanation of why the run ended.
    pub message: String,

    /// Complete step history, in execution order. Length never exceeds
    /// the configured maximum loop count.
    pub history: Vec<ExecutionStep>,

    /// The final answer, set only on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<String>,
}

impl AgentRunResult {
    /// Count of trailing error-status steps since the last success.
    pub fn trailing_failures(&self) -> usize {
        self.history
            .iter()
            .rev()
            .take_while(|s| s.is_error())
            .count()
    }
}
