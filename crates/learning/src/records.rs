//! Durable record types for the learning file.
//!
//! The learning file is one JSON document with three named collections:
//! `knowledge` (successful tool results), `errors` (observed failures), and
//! `improvements` (derived fixes, corrections, and review plans). Records
//! are append-only; nothing in this core deletes history, with the single
//! exception of a parameter correction being consumed by the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mirrored successful tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub function_name: String,
    /// The successful result, stored verbatim.
    pub content: serde_json::Value,
}

/// One observed failure and its context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub error: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

/// A learned substitution applied to a tool call's params before invocation.
///
/// Matching is exact on `(tool_name, original_params)`: a correction is only
/// applied when the oracle repeats the very call that previously failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterCorrection {
    pub tool_name: String,
    pub original_params: serde_json::Value,
    pub corrected_params: serde_json::Value,
}

/// What kind of improvement a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementKind {
    /// A structural-rule hit: a concrete parameter substitution.
    ParameterCorrection,
    /// A textual fix suggested by the external fix source.
    SuggestedFix,
    /// A post-task review plan.
    ReviewPlan,
}

/// A derived improvement: a correction, a suggested fix, or a review plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: ImprovementKind,

    /// The error that triggered this improvement, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Textual fix or plan description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,

    /// How confident the store is in the fix, in [0, 1].
    pub confidence: f64,

    /// Whether the fix is cleared for automatic application.
    pub applied: bool,

    /// Present for `ParameterCorrection` records until consumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<ParameterCorrection>,
}

/// The whole durable document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningFile {
    #[serde(default)]
    pub knowledge: Vec<KnowledgeRecord>,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    #[serde(default)]
    pub improvements: Vec<ImprovementRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_deserializes_with_defaults() {
        let file: LearningFile = serde_json::from_str("{}").unwrap();
        assert!(file.knowledge.is_empty());
        assert!(file.errors.is_empty());
        assert!(file.improvements.is_empty());
    }

    #[test]
    fn file_round_trips() {
        let file = LearningFile {
            knowledge: vec![],
            errors: vec![ErrorRecord {
                timestamp: Utc::now(),
                error: "timeout".into(),
                context: serde_json::json!({"tool": "web_search"}),
            }],
            improvements: vec![],
        };
        let json = serde_json::to_string(&file).unwrap();
        let back: LearningFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.errors.len(), 1);
        assert_eq!(back.errors[0].error, "timeout");
    }
}
