//! Oracle trait — the abstraction over the external decision source.
//!
//! The oracle (an LLM in production) is consulted once per loop iteration
//! to choose the next action. The core treats it as opaque: it receives the
//! goal, a textual history summary, and the tool catalog, and returns raw
//! text expected to contain a decision JSON object, optionally wrapped in a
//! fenced code block. Extraction and cleaning of that text is the agent
//! crate's job, not the oracle's.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::OracleError;

/// The action portion of a decision: which tool to call and with what.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Tool name; empty when the oracle produced an invalid action.
    #[serde(default)]
    pub name: String,

    /// Keyword parameters passed to the tool.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A parsed oracle decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Free-text reasoning.
    #[serde(default = "default_thought")]
    pub thought: String,

    /// The chosen action.
    #[serde(default)]
    pub action: Option<ActionRequest>,
}

fn default_thought() -> String {
    "No thought provided.".into()
}

impl Decision {
    /// The action name, if the oracle supplied a non-empty one.
    pub fn action_name(&self) -> Option<&str> {
        self.action
            .as_ref()
            .map(|a| a.name.as_str())
            .filter(|n| !n.is_empty())
    }
}

/// The external decision source.
///
/// `catalog` maps tool name → description so the oracle knows what it can
/// call. Implementations must not parse or validate their own output; they
/// return whatever text the underlying model produced.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// A short name for logging ("groq", "scripted", ...).
    fn name(&self) -> &str;

    /// Choose the next action given the goal and the run so far.
    async fn decide(
        &self,
        goal: &str,
        history_summary: &str,
        catalog: &BTreeMap<String, String>,
    ) -> Result<String, OracleError>;
}
