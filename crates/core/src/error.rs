//! Error types for the Ironloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error enum; the taxonomy mirrors how failures propagate:
//! tool-level errors become step results, oracle parse exhaustion ends the
//! run, circuit-open failures fail fast without touching the wrapped call.

use thiserror::Error;

/// The top-level error type for all Ironloop operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Resilience error: {0}")]
    Resilience(#[from] ResilienceError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Learning error: {0}")]
    Learning(#[from] LearningError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures raised by tool lookup and invocation.
///
/// The dispatcher folds every one of these into a failed step result; none
/// of them may crash the agent loop.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Unknown tool name. Non-fatal: reported to the oracle as a step result.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Network/browser-class failure matching the retryable vocabulary.
    /// Retried with backoff inside the dispatcher before surfacing.
    #[error("Retryable failure in '{tool_name}': {message}")]
    Retryable { tool_name: String, message: String },

    /// Any other tool failure. Surfaces immediately, no retry.
    #[error("Tool '{tool_name}' failed: {message}")]
    Fatal { tool_name: String, message: String },

    /// The breaker guarding this operation is open; the tool was not invoked.
    #[error("Circuit '{0}' is open, call rejected")]
    CircuitOpen(String),

    /// Provider quota exhausted. Advances credentials or backs off upstream.
    #[error("Quota exceeded for '{0}'")]
    QuotaExceeded(String),

    /// The params object did not match the tool's schema.
    #[error("Invalid arguments for '{tool_name}': {message}")]
    InvalidArguments { tool_name: String, message: String },
}

impl ToolError {
    /// The message text inspected by the retryable-vocabulary classifier.
    pub fn message(&self) -> String {
        match self {
            ToolError::Retryable { message, .. } | ToolError::Fatal { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

/// Failures of the external decision source.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The oracle could not be reached or returned no text.
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    /// No decision JSON could be extracted after cleaning. Fatal for the
    /// run once all parse attempts are exhausted.
    #[error("Failed to parse oracle decision: {0}")]
    Parse(String),
}

/// Failures of circuit breakers and rate limiters.
#[derive(Debug, Clone, Error)]
pub enum ResilienceError {
    #[error("Circuit breaker '{name}' is open")]
    CircuitOpen { name: String },
}

/// Failures of the memory index.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Embedding credential rejected: {0}")]
    BadCredential(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Failures of the self-learning store.
#[derive(Debug, Error)]
pub enum LearningError {
    #[error("Learning store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Learning file is corrupt: {0}")]
    Corrupt(String),

    #[error("Fix lookup failed: {0}")]
    FixLookup(String),
}
