//! Tool and error classification.
//!
//! Two fixed vocabularies drive the dispatcher's retry policy. A tool whose
//! name carries a network marker is network-class and eligible for retries;
//! an error whose message carries a retryable marker is transient. Both
//! checks are case-insensitive substring matches, so wrapped foreign errors
//! classify correctly as long as their text survives.

/// Tool-name substrings that mark a tool as network-bound.
/// "browse" also covers "browser".
pub const NETWORK_MARKERS: &[&str] = &[
    "browse", "http", "fetch", "search", "request", "connect", "url", "download", "scrape", "api",
];

/// Error-message substrings that mark a failure as transient.
pub const RETRYABLE_MARKERS: &[&str] = &[
    "connection",
    "timeout",
    "timed out",
    "dns",
    "socket",
    "ssl",
    "tls",
    "gateway",
    "unreachable",
    "reset by peer",
    "stale element",
    "not interactable",
    "temporarily unavailable",
];

/// Whether a tool talks to the network or runs locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolClass {
    Network,
    Local,
}

/// Classify a tool by its name.
pub fn classify_tool(name: &str) -> ToolClass {
    let lower = name.to_lowercase();
    if NETWORK_MARKERS.iter().any(|m| lower.contains(m)) {
        ToolClass::Network
    } else {
        ToolClass::Local
    }
}

/// Whether an error message describes a transient, retry-worthy failure.
pub fn is_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_MARKERS.iter().any(|m| lower.contains(m))
}
