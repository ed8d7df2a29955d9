//! Configuration loading, validation, and management for Ironloop.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides. All resilience knobs live here and are consumed read-only by
//! the other crates; the core never mutates configuration at runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Circuit breaker and retry settings
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Agent loop bounds
    #[serde(default)]
    pub agent: AgentConfig,

    /// Per-provider rate limit quotas, keyed by provider name
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitConfig>,

    /// Embedding / memory index settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Self-learning store settings
    #[serde(default)]
    pub learning: LearningConfig,
}

/// Circuit breaker and dispatcher retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Consecutive failures before a breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Cooldown before an open breaker admits a probe call
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: f64,

    /// Retry attempts for network-class tool failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay; doubles per attempt
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,

    /// Cap on the exponential retry delay
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_recovery_timeout_secs() -> f64 {
    60.0
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_retry_delay_ms() -> u64 {
    1000
}
fn default_max_retry_delay_ms() -> u64 {
    30_000
}

/// Agent loop bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum oracle round-trips per run
    #[serde(default = "default_max_loops")]
    pub max_loops: usize,

    /// Trailing failed steps before the run aborts
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,

    /// Attempts to parse one oracle response
    #[serde(default = "default_parse_attempts")]
    pub parse_attempts: u32,

    /// Pause between parse attempts
    #[serde(default = "default_parse_retry_delay_ms")]
    pub parse_retry_delay_ms: u64,

    /// Memory documents recalled as context per run
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_loops: default_max_loops(),
            max_consecutive_failures: default_max_consecutive_failures(),
            parse_attempts: default_parse_attempts(),
            parse_retry_delay_ms: default_parse_retry_delay_ms(),
            recall_limit: default_recall_limit(),
        }
    }
}

fn default_max_loops() -> usize {
    15
}
fn default_max_consecutive_failures() -> usize {
    3
}
fn default_parse_attempts() -> u32 {
    3
}
fn default_parse_retry_delay_ms() -> u64 {
    500
}
fn default_recall_limit() -> usize {
    5
}

/// Sliding-window quota for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

fn default_max_requests() -> usize {
    60
}
fn default_window_seconds() -> u64 {
    60
}

/// Embedding provider and memory index settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Vector dimension; zero-vector fallbacks use this
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Document text beyond this is truncated before embedding
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Remote embedding model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// OpenAI-compatible base URL; empty disables the remote path
    #[serde(default)]
    pub base_url: String,

    /// Credentials tried in round-robin order
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Fall back to the local hash embedder when the remote path fails
    #[serde(default = "default_true")]
    pub local_fallback: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            max_input_chars: default_max_input_chars(),
            model: default_embedding_model(),
            base_url: String::new(),
            api_keys: Vec::new(),
            local_fallback: true,
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("dimension", &self.dimension)
            .field("max_input_chars", &self.max_input_chars)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_keys", &format!("[{} redacted]", self.api_keys.len()))
            .field("local_fallback", &self.local_fallback)
            .finish()
    }
}

fn default_dimension() -> usize {
    768
}
fn default_max_input_chars() -> usize {
    8000
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_true() -> bool {
    true
}

/// Self-learning store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Path of the durable learning file
    #[serde(default = "default_learning_path")]
    pub path: String,

    /// Master switch for fix lookup (structural rules always run)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fixes above this confidence are marked auto-appliable
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            path: default_learning_path(),
            enabled: true,
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_learning_path() -> String {
    "agent_memory.json".into()
}
fn default_confidence_threshold() -> f64 {
    0.75
}

impl AppConfig {
    /// Load from a TOML file, then apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides; used when no file exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(keys) = std::env::var("IRONLOOP_EMBEDDING_API_KEYS") {
            self.embedding.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(url) = std::env::var("IRONLOOP_EMBEDDING_BASE_URL") {
            self.embedding.base_url = url;
        }
        if let Ok(path) = std::env::var("IRONLOOP_LEARNING_PATH") {
            self.learning.path = path;
        }
        if let Ok(v) = std::env::var("IRONLOOP_MAX_LOOPS")
            && let Ok(n) = v.parse()
        {
            self.agent.max_loops = n;
        }
    }

    /// Reject configurations the core cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resilience.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "resilience.failure_threshold must be at least 1".into(),
            ));
        }
        if self.agent.max_loops == 0 {
            return Err(ConfigError::Invalid("agent.max_loops must be at least 1".into()));
        }
        if self.agent.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_consecutive_failures must be at least 1".into(),
            ));
        }
        if self.agent.parse_attempts == 0 {
            return Err(ConfigError::Invalid(
                "agent.parse_attempts must be at least 1".into(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid(
                "embedding.dimension must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.learning.confidence_threshold) {
            return Err(ConfigError::Invalid(
                "learning.confidence_threshold must be within [0, 1]".into(),
            ));
        }
        for (provider, rl) in &self.rate_limits {
            if rl.max_requests == 0 || rl.window_seconds == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rate_limits.{provider}: max_requests and window_seconds must be nonzero"
                )));
            }
        }
        Ok(())
    }

    /// Quota for a provider, falling back to the defaults.
    pub fn rate_limit_for(&self, provider: &str) -> RateLimitConfig {
        self.rate_limits
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("resilience", &self.resilience)
            .field("agent", &self.agent)
            .field("rate_limits", &self.rate_limits)
            .field("embedding", &self.embedding)
            .field("learning", &self.learning)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resilience.failure_threshold, 5);
        assert_eq!(config.agent.max_loops, 15);
        assert_eq!(config.embedding.dimension, 768);
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[resilience]
failure_threshold = 2

[agent]
max_loops = 5

[rate_limits.gemini]
max_requests = 30
window_seconds = 60
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.resilience.failure_threshold, 2);
        assert_eq!(config.agent.max_loops, 5);
        // Untouched sections keep defaults
        assert_eq!(config.resilience.max_retries, 3);
        assert_eq!(config.rate_limit_for("gemini").max_requests, 30);
        assert_eq!(config.rate_limit_for("unknown").max_requests, 60);
    }

    #[test]
    fn rejects_zero_failure_threshold() {
        let mut config = AppConfig::default();
        config.resilience.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let mut config = AppConfig::default();
        config.learning.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_api_keys() {
        let mut config = AppConfig::default();
        config.embedding.api_keys = vec!["sk-secret-key".into()];
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret-key"));
        assert!(debug.contains("redacted"));
    }
}
