//! Self-learning feedback store for Ironloop.
//!
//! Turns observed failures into reusable corrections. The store keeps one
//! durable JSON document with three collections (knowledge, errors,
//! improvements), loaded at construction and rewritten in full after every
//! mutation. All state — the in-memory collections and the file flush —
//! lives behind a single `tokio::sync::Mutex`, so every read-modify-write
//! is one critical section and concurrent runs cannot lose updates.
//!
//! Learning itself is circuit-breaker-protected: if deriving fixes keeps
//! failing, learning is temporarily disabled instead of destabilizing the
//! agent loop that feeds it.

pub mod records;
pub mod rules;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ironloop_config::LearningConfig;
use ironloop_core::error::LearningError;
use ironloop_resilience::CircuitBreaker;

use records::{
    ErrorRecord, ImprovementKind, ImprovementRecord, KnowledgeRecord, LearningFile,
    ParameterCorrection,
};

/// External collaborator that suggests a textual fix for an error.
///
/// In production this is a web search over the error text; tests plug in
/// canned responses.
#[async_trait]
pub trait FixSource: Send + Sync {
    async fn lookup_fix(&self, error: &str) -> Result<String, LearningError>;
}

/// Counts of each collection, for the CLI and telemetry.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct LearningCounts {
    pub knowledge: usize,
    pub errors: usize,
    pub improvements: usize,
}

struct Inner {
    file: LearningFile,
    path: PathBuf,
}

impl Inner {
    /// Rewrite the durable file in full. Called inside the store mutex.
    fn flush(&self) -> Result<(), LearningError> {
        let json = serde_json::to_string_pretty(&self.file)
            .map_err(|e| LearningError::Corrupt(e.to_string()))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// The self-learning feedback store.
pub struct LearningStore {
    inner: Mutex<Inner>,
    config: LearningConfig,
    breaker: Arc<CircuitBreaker>,
    fix_source: Option<Arc<dyn FixSource>>,
}

impl LearningStore {
    /// Open the store, loading the durable file if it exists.
    pub fn open(
        config: LearningConfig,
        breaker: Arc<CircuitBreaker>,
        fix_source: Option<Arc<dyn FixSource>>,
    ) -> Result<Self, LearningError> {
        let path = PathBuf::from(&config.path);
        let file = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| LearningError::Corrupt(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LearningFile::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(
            path = %path.display(),
            errors = file.errors.len(),
            improvements = file.improvements.len(),
            "Learning store loaded"
        );
        Ok(Self {
            inner: Mutex::new(Inner { file, path }),
            config,
            breaker,
            fix_source,
        })
    }

    /// Record a failure and try to learn from it.
    ///
    /// The error record is always persisted; the learning step runs under
    /// the learning breaker and is skipped (not failed) while it is open.
    pub async fn log_error(
        &self,
        error: &str,
        context: serde_json::Value,
    ) -> Result<(), LearningError> {
        {
            let mut inner = self.inner.lock().await;
            inner.file.errors.push(ErrorRecord {
                timestamp: Utc::now(),
                error: error.to_string(),
                context: context.clone(),
            });
            inner.flush()?;
        }

        let learned = self
            .breaker
            .call(|| self.learn_from_error(error, &context))
            .await;
        match learned {
            Ok(()) => Ok(()),
            Err(ironloop_resilience::CircuitError::Open(name)) => {
                warn!(breaker = %name, "Learning temporarily disabled, circuit open");
                Ok(())
            }
            Err(ironloop_resilience::CircuitError::Inner(e)) => {
                warn!(error = %e, "Learning from error failed");
                Ok(())
            }
        }
    }

    /// Derive an improvement from one failure.
    ///
    /// Structural rules are tried first; a hit stores a parameter
    /// correction and returns without any external lookup. Otherwise, if
    /// learning is enabled and a fix source is wired, look up a textual
    /// fix, score it, and gate auto-application on the confidence
    /// threshold.
    async fn learn_from_error(
        &self,
        error: &str,
        context: &serde_json::Value,
    ) -> Result<(), LearningError> {
        if let Some(correction) = Self::structural_correction(context) {
            info!(
                tool = %correction.tool_name,
                "Structural rule matched, storing parameter correction"
            );
            let mut inner = self.inner.lock().await;
            inner.file.improvements.push(ImprovementRecord {
                timestamp: Utc::now(),
                kind: ImprovementKind::ParameterCorrection,
                error: Some(error.to_string()),
                fix: None,
                confidence: 0.95,
                applied: true,
                correction: Some(correction),
            });
            inner.flush()?;
            return Ok(());
        }

        if !self.config.enabled {
            return Ok(());
        }
        let Some(fix_source) = &self.fix_source else {
            return Ok(());
        };

        let fix = fix_source.lookup_fix(error).await?;
        let confidence = assess_confidence(&fix);
        let applied = confidence > self.config.confidence_threshold;

        let mut inner = self.inner.lock().await;
        inner.file.improvements.push(ImprovementRecord {
            timestamp: Utc::now(),
            kind: ImprovementKind::SuggestedFix,
            error: Some(error.to_string()),
            fix: Some(fix),
            confidence,
            applied,
            correction: None,
        });
        inner.flush()?;
        Ok(())
    }

    fn structural_correction(context: &serde_json::Value) -> Option<ParameterCorrection> {
        let tool = context.get("tool_name")?.as_str()?;
        let params = context.get("params")?;
        rules::match_rule(tool, params)
    }

    /// Take (consume) a standing parameter correction for this exact call.
    ///
    /// Returns the corrected params and removes the correction from the
    /// store; a correction is applied at most once.
    pub async fn take_correction(
        &self,
        tool_name: &str,
        params: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        let mut inner = self.inner.lock().await;
        let idx = inner.file.improvements.iter().position(|imp| {
            imp.applied
                && imp
                    .correction
                    .as_ref()
                    .is_some_and(|c| c.tool_name == tool_name && &c.original_params == params)
        })?;

        let record = inner.file.improvements.remove(idx);
        let corrected = record.correction.map(|c| c.corrected_params)?;
        if let Err(e) = inner.flush() {
            warn!(error = %e, "Failed to persist correction consumption");
        }
        debug!(tool = %tool_name, "Applied learned parameter correction");
        Some(corrected)
    }

    /// Mirror a successful tool result into the knowledge cache.
    pub async fn cache_success(
        &self,
        tool_name: &str,
        function_name: &str,
        result: &str,
    ) -> Result<(), LearningError> {
        let mut inner = self.inner.lock().await;
        inner.file.knowledge.push(KnowledgeRecord {
            timestamp: Utc::now(),
            tool_name: tool_name.to_string(),
            function_name: function_name.to_string(),
            content: serde_json::Value::String(result.to_string()),
        });
        inner.flush()
    }

    /// Most recent cached success for a tool/function pair.
    pub async fn cached_success(&self, tool_name: &str, function_name: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner
            .file
            .knowledge
            .iter()
            .rev()
            .find(|k| k.tool_name == tool_name && k.function_name == function_name)
            .and_then(|k| k.content.as_str().map(String::from))
    }

    /// Post-task review: always append an improvement plan, and feed the
    /// failure path when the task did not succeed.
    pub async fn post_task_review(
        &self,
        task: &str,
        success: bool,
        metrics: serde_json::Value,
    ) -> Result<(), LearningError> {
        let review = serde_json::json!({
            "task": task,
            "success": success,
            "metrics": metrics,
        });

        if !success {
            self.log_error("Task failed", review.clone()).await?;
        }

        let plan = if success {
            format!("Task '{task}' succeeded; keep the current approach.")
        } else {
            format!("Task '{task}' failed; review the failed steps and adjust tool usage.")
        };

        let mut inner = self.inner.lock().await;
        inner.file.improvements.push(ImprovementRecord {
            timestamp: Utc::now(),
            kind: ImprovementKind::ReviewPlan,
            error: None,
            fix: Some(plan),
            confidence: if success { 0.5 } else { 0.3 },
            applied: false,
            correction: None,
        });
        inner.flush()
    }

    pub async fn counts(&self) -> LearningCounts {
        let inner = self.inner.lock().await;
        LearningCounts {
            knowledge: inner.file.knowledge.len(),
            errors: inner.file.errors.len(),
            improvements: inner.file.improvements.len(),
        }
    }

    /// A full copy of the durable document, for the CLI.
    pub async fn dump(&self) -> LearningFile {
        self.inner.lock().await.file.clone()
    }
}

/// Heuristic confidence for a suggested fix.
///
/// Fixes that cite official documentation rank higher; everything stays
/// within [0, 1].
fn assess_confidence(fix: &str) -> f64 {
    let lower = fix.to_lowercase();
    let mut score: f64 = 0.6;
    if lower.contains("official") || lower.contains("documentation") {
        score += 0.2;
    }
    if lower.len() < 20 {
        score -= 0.2;
    }
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironloop_resilience::CircuitBreakerConfig;
    use serde_json::json;
    use std::time::Duration;

    struct CannedFixSource {
        fix: String,
    }

    #[async_trait]
    impl FixSource for CannedFixSource {
        async fn lookup_fix(&self, _error: &str) -> Result<String, LearningError> {
            Ok(self.fix.clone())
        }
    }

    struct FailingFixSource;

    #[async_trait]
    impl FixSource for FailingFixSource {
        async fn lookup_fix(&self, _error: &str) -> Result<String, LearningError> {
            Err(LearningError::FixLookup("search backend down".into()))
        }
    }

    fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "learning",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_secs(60),
            },
        ))
    }

    fn store_at(
        dir: &tempfile::TempDir,
        fix_source: Option<Arc<dyn FixSource>>,
    ) -> LearningStore {
        let config = LearningConfig {
            path: dir
                .path()
                .join("agent_memory.json")
                .to_string_lossy()
                .into_owned(),
            enabled: true,
            confidence_threshold: 0.75,
        };
        LearningStore::open(config, breaker(5), fix_source).unwrap()
    }

    #[tokio::test]
    async fn log_error_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = {
            let store = store_at(&dir, None);
            store
                .log_error("connection timeout", json!({"tool_name": "web_search"}))
                .await
                .unwrap();
            store.config.clone()
        };

        let reopened = LearningStore::open(config, breaker(5), None).unwrap();
        let counts = reopened.counts().await;
        assert_eq!(counts.errors, 1);
    }

    #[tokio::test]
    async fn structural_rule_creates_consumable_correction() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, None);

        let params = json!({"link": "https://example.com"});
        store
            .log_error(
                "unexpected keyword argument 'link'",
                json!({"tool_name": "browse_website", "params": params}),
            )
            .await
            .unwrap();

        let corrected = store.take_correction("browse_website", &params).await;
        assert_eq!(corrected, Some(json!({"url": "https://example.com"})));

        // Consumed: a second take finds nothing
        assert!(store.take_correction("browse_website", &params).await.is_none());
    }

    #[tokio::test]
    async fn correction_requires_exact_original_params() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, None);

        let params = json!({"link": "https://example.com"});
        store
            .log_error(
                "bad param",
                json!({"tool_name": "browse_website", "params": params}),
            )
            .await
            .unwrap();

        let different = json!({"link": "https://other.com"});
        assert!(store.take_correction("browse_website", &different).await.is_none());
    }

    #[tokio::test]
    async fn high_confidence_fix_is_marked_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(
            &dir,
            Some(Arc::new(CannedFixSource {
                fix: "Per the official documentation, increase the request timeout.".into(),
            })),
        );

        store
            .log_error("read timed out", json!({"tool_name": "http_request"}))
            .await
            .unwrap();

        let file = store.dump().await;
        let imp = &file.improvements[0];
        assert_eq!(imp.kind, ImprovementKind::SuggestedFix);
        assert!(imp.confidence > 0.75);
        assert!(imp.applied);
    }

    #[tokio::test]
    async fn low_confidence_fix_is_not_auto_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(
            &dir,
            Some(Arc::new(CannedFixSource {
                fix: "Maybe restart it and try again later sometime.".into(),
            })),
        );

        store.log_error("weird failure", json!({})).await.unwrap();

        let file = store.dump().await;
        assert!(!file.improvements[0].applied);
    }

    #[tokio::test]
    async fn failing_fix_source_trips_breaker_but_errors_still_logged() {
        let dir = tempfile::tempdir().unwrap();
        let config = LearningConfig {
            path: dir.path().join("mem.json").to_string_lossy().into_owned(),
            enabled: true,
            confidence_threshold: 0.75,
        };
        let store =
            LearningStore::open(config, breaker(2), Some(Arc::new(FailingFixSource))).unwrap();

        for i in 0..4 {
            store.log_error(&format!("error {i}"), json!({})).await.unwrap();
        }

        // All errors recorded even though every learn attempt failed and
        // the breaker opened after two of them.
        let counts = store.counts().await;
        assert_eq!(counts.errors, 4);
        assert_eq!(counts.improvements, 0);
    }

    #[tokio::test]
    async fn cache_success_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, None);

        store
            .cache_success("web_search", "search", "10 results for rust")
            .await
            .unwrap();
        store
            .cache_success("web_search", "search", "fresh results")
            .await
            .unwrap();

        // Most recent entry wins
        let cached = store.cached_success("web_search", "search").await;
        assert_eq!(cached.as_deref(), Some("fresh results"));
        assert!(store.cached_success("web_search", "other").await.is_none());
    }

    #[tokio::test]
    async fn post_task_review_always_appends_a_plan() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, None);

        store
            .post_task_review("summarize news", true, json!({"steps": 3}))
            .await
            .unwrap();
        let counts = store.counts().await;
        assert_eq!(counts.improvements, 1);
        assert_eq!(counts.errors, 0);

        store
            .post_task_review("book flight", false, json!({"steps": 7}))
            .await
            .unwrap();
        let counts = store.counts().await;
        assert_eq!(counts.improvements, 2);
        // The failed review also fed the error log
        assert_eq!(counts.errors, 1);
    }

    #[tokio::test]
    async fn no_lost_updates_under_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_at(&dir, None));

        let mut handles = Vec::new();
        for task in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    store
                        .log_error(&format!("task {task} error {i}"), json!({}))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let counts = store.counts().await;
        assert_eq!(counts.errors, 200, "concurrent writers lost updates");
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        for fix in ["", "x", "official documentation says so", "restart"] {
            let c = assess_confidence(fix);
            assert!((0.0..=1.0).contains(&c));
        }
    }
}
