//! The tool dispatcher.
//!
//! Single entry point between the agent loop and its tools. Every
//! invocation runs inside the shared `tool_execution` breaker; network-class
//! tools additionally get rate limiting and transient-error retries with
//! exponential backoff. Before dispatch the learning store is consulted for
//! a standing parameter correction, and successful results are mirrored
//! back into its knowledge cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use ironloop_config::{RateLimitConfig, ResilienceConfig};
use ironloop_core::error::ToolError;
use ironloop_core::{Tool, ToolRegistry};
use ironloop_learning::LearningStore;
use ironloop_resilience::{CircuitBreakerRegistry, CircuitError, RateLimiter};

use crate::builtin::FinishTaskTool;
use crate::classify::{classify_tool, is_retryable, ToolClass};

/// Name of the shared breaker wrapping every tool invocation.
pub const TOOL_EXECUTION_BREAKER: &str = "tool_execution";

pub struct ToolDispatcher {
    registry: ToolRegistry,
    breakers: Arc<CircuitBreakerRegistry>,
    limiter: Arc<RateLimiter>,
    learning: Arc<LearningStore>,
    resilience: ResilienceConfig,
    rate_limits: HashMap<String, RateLimitConfig>,
}

impl ToolDispatcher {
    /// Build a dispatcher. The `finish_task` tool is always registered.
    pub fn new(
        resilience: ResilienceConfig,
        rate_limits: HashMap<String, RateLimitConfig>,
        breakers: Arc<CircuitBreakerRegistry>,
        limiter: Arc<RateLimiter>,
        learning: Arc<LearningStore>,
    ) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FinishTaskTool));
        Self {
            registry,
            breakers,
            limiter,
            learning,
            resilience,
            rate_limits,
        }
    }

    pub fn register_tool(&mut self, tool: Box<dyn Tool>) {
        self.registry.register(tool);
    }

    /// Name → description map for the oracle prompt.
    pub fn catalog(&self) -> std::collections::BTreeMap<String, String> {
        self.registry.catalog()
    }

    /// Invoke a tool by name.
    ///
    /// Unknown names yield `ToolError::NotFound` without touching the
    /// breaker; an open breaker yields `ToolError::CircuitOpen` without
    /// invoking the tool. Either way the caller gets a failed step result,
    /// never a crash.
    pub async fn invoke(&self, tool_name: &str, params: Value) -> Result<String, ToolError> {
        let params = match self.learning.take_correction(tool_name, &params).await {
            Some(corrected) => {
                info!(tool = %tool_name, "Applying learned parameter correction");
                corrected
            }
            None => params,
        };

        let tool = self.registry.get(tool_name)?;

        let breaker = self.breakers.get_or_create(TOOL_EXECUTION_BREAKER);
        let result = breaker
            .call(|| self.execute_with_policy(tool, params))
            .await;

        match result {
            Ok(output) => {
                if let Err(e) = self
                    .learning
                    .cache_success(tool_name, "execute", &output)
                    .await
                {
                    warn!(tool = %tool_name, error = %e, "Failed to cache successful result");
                }
                Ok(output)
            }
            Err(CircuitError::Open(name)) => Err(ToolError::CircuitOpen(name)),
            Err(CircuitError::Inner(e)) => Err(e),
        }
    }

    /// Rate limiting, retries, and quota signaling for one invocation.
    async fn execute_with_policy(
        &self,
        tool: &dyn Tool,
        params: Value,
    ) -> Result<String, ToolError> {
        let class = classify_tool(tool.name());
        let limit = match class {
            ToolClass::Network => self.rate_limits.get(tool.name()),
            ToolClass::Local => None,
        };

        if let Some(limit) = limit {
            self.limiter
                .wait_if_needed(
                    tool.name(),
                    limit.max_requests,
                    Duration::from_secs(limit.window_seconds),
                )
                .await;
        }

        let max_retries = match class {
            ToolClass::Network => self.resilience.max_retries,
            ToolClass::Local => 0,
        };

        let mut attempt = 0u32;
        loop {
            match tool.execute(params.clone()).await {
                Ok(result) => {
                    if limit.is_some() {
                        self.limiter.record_success(tool.name()).await;
                    }
                    return Ok(result);
                }
                Err(ToolError::QuotaExceeded(msg)) => {
                    if limit.is_some() {
                        self.limiter.record_quota_exceeded(tool.name()).await;
                    }
                    return Err(ToolError::QuotaExceeded(msg));
                }
                Err(e) if attempt < max_retries && is_retryable(&e.message()) => {
                    let delay = self.retry_delay(attempt);
                    warn!(
                        tool = %tool.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e.message(),
                        "Transient tool failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(tool = %tool.name(), attempt, error = %e, "Tool failed");
                    return Err(e);
                }
            }
        }
    }

    /// `initial * 2^attempt`, capped.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        let millis = self
            .resilience
            .initial_retry_delay_ms
            .saturating_mul(factor)
            .min(self.resilience.max_retry_delay_ms);
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ironloop_config::LearningConfig;
    use ironloop_resilience::{CircuitBreaker, CircuitBreakerConfig};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FlakyTool {
        name: &'static str,
        calls: Arc<AtomicU32>,
        failures_before_success: u32,
        error_message: &'static str,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "fails a few times, then succeeds"
        }
        async fn execute(&self, _params: Value) -> Result<String, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(ToolError::Retryable {
                    tool_name: self.name.to_string(),
                    message: self.error_message.to_string(),
                })
            } else {
                Ok("done".to_string())
            }
        }
    }

    struct ParamCapture {
        name: &'static str,
        seen: Arc<StdMutex<Vec<Value>>>,
    }

    #[async_trait]
    impl Tool for ParamCapture {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "records the params it was called with"
        }
        async fn execute(&self, params: Value) -> Result<String, ToolError> {
            self.seen.lock().unwrap().push(params);
            Ok("captured".to_string())
        }
    }

    struct AlwaysFatal;

    #[async_trait]
    impl Tool for AlwaysFatal {
        fn name(&self) -> &str {
            "http_request"
        }
        fn description(&self) -> &str {
            "always fails with a non-retryable error"
        }
        async fn execute(&self, _params: Value) -> Result<String, ToolError> {
            Err(ToolError::Fatal {
                tool_name: "http_request".to_string(),
                message: "invalid argument: url is required".to_string(),
            })
        }
    }

    fn learning_store(dir: &tempfile::TempDir) -> Arc<LearningStore> {
        let config = LearningConfig {
            path: dir
                .path()
                .join("agent_memory.json")
                .to_string_lossy()
                .into_owned(),
            ..LearningConfig::default()
        };
        let breaker = Arc::new(CircuitBreaker::new(
            "learning",
            CircuitBreakerConfig::default(),
        ));
        Arc::new(LearningStore::open(config, breaker, None).unwrap())
    }

    fn dispatcher(dir: &tempfile::TempDir) -> ToolDispatcher {
        let resilience = ResilienceConfig {
            max_retries: 3,
            initial_retry_delay_ms: 1,
            max_retry_delay_ms: 10,
            ..ResilienceConfig::default()
        };
        ToolDispatcher::new(
            resilience,
            HashMap::new(),
            Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
            Arc::new(RateLimiter::default()),
            learning_store(dir),
        )
    }

    #[tokio::test]
    async fn retryable_failure_retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(&dir);
        let calls = Arc::new(AtomicU32::new(0));
        d.register_tool(Box::new(FlakyTool {
            name: "web_search",
            calls: calls.clone(),
            failures_before_success: 2,
            error_message: "connection reset by peer",
        }));

        let result = d.invoke("web_search", json!({"query": "rust"})).await;
        assert_eq!(result.unwrap(), "done");
        // Two failures plus the successful third attempt.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(&dir);
        d.register_tool(Box::new(AlwaysFatal));

        let err = d.invoke("http_request", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Fatal { .. }));
    }

    #[tokio::test]
    async fn local_tool_never_retries_even_with_retryable_message() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(&dir);
        let calls = Arc::new(AtomicU32::new(0));
        d.register_tool(Box::new(FlakyTool {
            name: "read_file",
            calls: calls.clone(),
            failures_before_success: 1,
            error_message: "connection reset by peer",
        }));

        let err = d.invoke("read_file", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Retryable { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(&dir);
        let err = d.invoke("no_such_tool", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn learned_correction_is_applied_and_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(&dir);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        d.register_tool(Box::new(ParamCapture {
            name: "browse_website",
            seen: seen.clone(),
        }));

        // A failed call with the known wrong param name seeds a correction.
        d.learning
            .log_error(
                "Invalid parameters",
                json!({"tool_name": "browse_website", "params": {"link": "https://example.com"}}),
            )
            .await
            .unwrap();

        d.invoke("browse_website", json!({"link": "https://example.com"}))
            .await
            .unwrap();
        // Correction consumed: the same wrong call goes through unchanged.
        d.invoke("browse_website", json!({"link": "https://example.com"}))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], json!({"url": "https://example.com"}));
        assert_eq!(seen[1], json!({"link": "https://example.com"}));
    }

    #[tokio::test]
    async fn open_breaker_fails_fast_without_invoking_tool() {
        let dir = tempfile::tempdir().unwrap();
        let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
        }));
        let mut d = ToolDispatcher::new(
            ResilienceConfig {
                max_retries: 0,
                initial_retry_delay_ms: 1,
                max_retry_delay_ms: 10,
                ..ResilienceConfig::default()
            },
            HashMap::new(),
            breakers,
            Arc::new(RateLimiter::default()),
            learning_store(&dir),
        );
        d.register_tool(Box::new(AlwaysFatal));
        let calls = Arc::new(AtomicU32::new(0));
        d.register_tool(Box::new(FlakyTool {
            name: "web_search",
            calls: calls.clone(),
            failures_before_success: 0,
            error_message: "",
        }));

        // One fatal failure trips the shared breaker.
        let _ = d.invoke("http_request", json!({})).await;

        let err = d.invoke("web_search", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::CircuitOpen(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_is_mirrored_into_knowledge_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = dispatcher(&dir);
        let calls = Arc::new(AtomicU32::new(0));
        d.register_tool(Box::new(FlakyTool {
            name: "web_search",
            calls,
            failures_before_success: 0,
            error_message: "",
        }));

        d.invoke("web_search", json!({"query": "rust"})).await.unwrap();
        let cached = d.learning.cached_success("web_search", "execute").await;
        assert_eq!(cached.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn finish_task_is_registered_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(&dir);
        let result = d
            .invoke("finish_task", json!({"final_answer": "all done"}))
            .await
            .unwrap();
        assert_eq!(result, "all done");
        assert!(d.catalog().contains_key("finish_task"));
    }

    #[tokio::test]
    async fn quota_error_raises_backoff_multiplier() {
        let dir = tempfile::tempdir().unwrap();
        let limiter = Arc::new(RateLimiter::default());
        let mut rate_limits = HashMap::new();
        rate_limits.insert(
            "api_call".to_string(),
            RateLimitConfig {
                max_requests: 100,
                window_seconds: 60,
            },
        );
        let mut d = ToolDispatcher::new(
            ResilienceConfig::default(),
            rate_limits,
            Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
            limiter.clone(),
            learning_store(&dir),
        );

        struct QuotaTool;
        #[async_trait]
        impl Tool for QuotaTool {
            fn name(&self) -> &str {
                "api_call"
            }
            fn description(&self) -> &str {
                "always over quota"
            }
            async fn execute(&self, _params: Value) -> Result<String, ToolError> {
                Err(ToolError::QuotaExceeded("429 too many requests".into()))
            }
        }
        d.register_tool(Box::new(QuotaTool));

        let err = d.invoke("api_call", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::QuotaExceeded(_)));
        assert!(limiter.backoff_multiplier("api_call").await > 1.0);
    }
}
