//! The in-process embedding index.
//!
//! Documents are arbitrary JSON payloads stored alongside their embedding
//! vectors as co-indexed pairs. Recall is a brute-force cosine scan, which
//! is plenty for the run histories an agent accumulates in one process
//! lifetime.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use ironloop_config::EmbeddingConfig;
use ironloop_resilience::{CircuitBreaker, CircuitError};

use crate::embedder::{Embedder, HashEmbedder, RemoteEmbedder};

const COSINE_EPSILON: f64 = 1e-10;

/// One recall hit: `(distance, payload)`, smaller distance means closer.
pub type SearchHit = (f64, Value);

struct Store {
    documents: Vec<Value>,
    vectors: Vec<Vec<f32>>,
}

/// Embedding-based recall over JSON documents.
///
/// Every embed call runs through the index's circuit breaker. When the
/// remote embedder fails or the breaker is open, the index degrades to the
/// local hash embedder, and to a zero vector when even that is disabled.
/// Recall itself never raises: a ranking failure degrades to the most
/// recent documents.
pub struct MemoryIndex {
    store: Mutex<Store>,
    remote: Option<Arc<dyn Embedder>>,
    local: HashEmbedder,
    breaker: Arc<CircuitBreaker>,
    config: EmbeddingConfig,
}

impl MemoryIndex {
    pub fn new(
        config: EmbeddingConfig,
        remote: Option<Arc<dyn Embedder>>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            store: Mutex::new(Store {
                documents: Vec::new(),
                vectors: Vec::new(),
            }),
            local: HashEmbedder::new(config.dimension),
            remote,
            breaker,
            config,
        }
    }

    /// Build an index from config alone: the remote embedder is wired up
    /// only when a base URL and at least one credential are present.
    pub fn from_config(config: EmbeddingConfig, breaker: Arc<CircuitBreaker>) -> Self {
        let remote: Option<Arc<dyn Embedder>> =
            if !config.base_url.is_empty() && !config.api_keys.is_empty() {
                Some(Arc::new(RemoteEmbedder::new(
                    config.base_url.clone(),
                    config.model.clone(),
                    config.dimension,
                    config.api_keys.clone(),
                )))
            } else {
                None
            };
        Self::new(config, remote, breaker)
    }

    /// Embed and store a document. The payload is kept verbatim; only its
    /// serialized text (truncated to the configured cap) feeds the embedder.
    pub async fn add_document(&self, payload: Value) {
        let text = render_for_embedding(&payload, self.config.max_input_chars);
        let vector = self.embed_degraded(&text).await;

        let mut store = self.store.lock().await;
        store.documents.push(payload);
        store.vectors.push(vector);
        debug!(documents = store.documents.len(), "Document added to memory index");
    }

    /// Top-`k` nearest documents to `query` by cosine distance.
    ///
    /// Returns `(distance, payload)` pairs sorted nearest-first. Degrades to
    /// the `k` most recent documents (placeholder distance 1.0) rather than
    /// failing, so a broken embedding path never blocks recall entirely.
    pub async fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        let store = self.store.lock().await;
        if store.documents.is_empty() || k == 0 {
            return Vec::new();
        }
        drop(store);

        let query_vector = self.embed_degraded(query).await;

        let store = self.store.lock().await;
        if query_vector.iter().all(|v| *v == 0.0) {
            warn!("Query embedding degraded to zero vector, returning most recent documents");
            return most_recent(&store.documents, k);
        }

        let mut scored: Vec<(f64, usize)> = store
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (cosine_similarity(&query_vector, v), i))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(similarity, i)| (1.0 - similarity, store.documents[i].clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.store.lock().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.documents.is_empty()
    }

    /// Remote through the breaker, then local hash, then zero vector.
    async fn embed_degraded(&self, text: &str) -> Vec<f32> {
        if let Some(remote) = &self.remote {
            match self.breaker.call(|| remote.embed(text)).await {
                Ok(vector) => return vector,
                Err(CircuitError::Open(name)) => {
                    warn!(breaker = %name, "Embedding circuit open, using local fallback");
                }
                Err(CircuitError::Inner(e)) => {
                    warn!(error = %e, "Remote embedding failed, using local fallback");
                }
            }
        }

        if self.config.local_fallback {
            // The hash embedder cannot fail.
            match self.local.embed(text).await {
                Ok(vector) => return vector,
                Err(e) => warn!(error = %e, "Local embedding failed"),
            }
        }

        vec![0.0; self.config.dimension]
    }
}

fn render_for_embedding(payload: &Value, max_chars: usize) -> String {
    let text = match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect()
    } else {
        text
    }
}

fn most_recent(documents: &[Value], k: usize) -> Vec<SearchHit> {
    documents
        .iter()
        .rev()
        .take(k)
        .map(|d| (1.0, d.clone()))
        .collect()
}

/// Cosine similarity in f64, with an epsilon in the denominator so a zero
/// vector yields similarity 0 rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt() + COSINE_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ironloop_core::error::MemoryError;
    use ironloop_resilience::CircuitBreakerConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_index() -> MemoryIndex {
        let config = EmbeddingConfig {
            dimension: 64,
            ..EmbeddingConfig::default()
        };
        let breaker = Arc::new(CircuitBreaker::new(
            "embedding",
            CircuitBreakerConfig::default(),
        ));
        MemoryIndex::new(config, None, breaker)
    }

    struct FailingEmbedder {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            64
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(MemoryError::EmbeddingFailed("boom".into()))
        }
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, -0.7, 0.1, 0.5];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        let a = vec![0.0; 4];
        let b = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_of_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn single_document_comes_back_first() {
        let index = test_index();
        index
            .add_document(json!({"goal": "deploy web service", "status": "success"}))
            .await;

        let hits = index.search("deploy web service", 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1["goal"], "deploy web service");
        assert!(hits[0].0 < 0.5, "distance {} too large", hits[0].0);
    }

    #[tokio::test]
    async fn closer_document_ranks_ahead() {
        let index = test_index();
        index.add_document(json!("configure dns records for the domain")).await;
        index.add_document(json!("bake a chocolate cake recipe")).await;

        let hits = index.search("configure dns records", 2).await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].1, json!("configure dns records for the domain"));
        assert!(hits[0].0 <= hits[1].0);
    }

    #[tokio::test]
    async fn search_on_empty_index_returns_nothing() {
        let index = test_index();
        assert!(index.search("anything", 5).await.is_empty());
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn k_limits_result_count() {
        let index = test_index();
        for i in 0..10 {
            index.add_document(json!(format!("document number {i}"))).await;
        }
        assert_eq!(index.len().await, 10);
        assert_eq!(index.search("document", 3).await.len(), 3);
    }

    #[tokio::test]
    async fn remote_failure_degrades_to_local_embedder() {
        let config = EmbeddingConfig {
            dimension: 64,
            ..EmbeddingConfig::default()
        };
        let breaker = Arc::new(CircuitBreaker::new(
            "embedding",
            CircuitBreakerConfig::default(),
        ));
        let remote = Arc::new(FailingEmbedder {
            calls: AtomicU32::new(0),
        });
        let index = MemoryIndex::new(config, Some(remote.clone()), breaker);

        index.add_document(json!("remember the staging credentials")).await;
        let hits = index.search("staging credentials", 1).await;

        // The remote embedder failed both times but recall still works
        // through the local hash vectors.
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].0 < 0.5);
    }

    #[tokio::test]
    async fn repeated_remote_failures_open_the_breaker() {
        let config = EmbeddingConfig {
            dimension: 16,
            ..EmbeddingConfig::default()
        };
        let breaker = Arc::new(CircuitBreaker::new(
            "embedding",
            CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout: std::time::Duration::from_secs(60),
            },
        ));
        let remote = Arc::new(FailingEmbedder {
            calls: AtomicU32::new(0),
        });
        let index = MemoryIndex::new(config, Some(remote.clone()), breaker.clone());

        index.add_document(json!("first")).await;
        index.add_document(json!("second")).await;
        assert!(breaker.is_open());

        // Open breaker short-circuits: the remote embedder sees no new call.
        index.add_document(json!("third")).await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
        assert_eq!(index.len().await, 3);
    }

    #[tokio::test]
    async fn disabled_local_fallback_stores_zero_vector_and_degrades_search() {
        let config = EmbeddingConfig {
            dimension: 8,
            local_fallback: false,
            ..EmbeddingConfig::default()
        };
        let breaker = Arc::new(CircuitBreaker::new(
            "embedding",
            CircuitBreakerConfig::default(),
        ));
        let index = MemoryIndex::new(config, None, breaker);

        index.add_document(json!("oldest")).await;
        index.add_document(json!("newest")).await;

        let hits = index.search("anything", 1).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 1.0);
        assert_eq!(hits[0].1, json!("newest"));
    }

    #[tokio::test]
    async fn long_documents_are_truncated_before_embedding() {
        let config = EmbeddingConfig {
            dimension: 32,
            max_input_chars: 50,
            ..EmbeddingConfig::default()
        };
        let breaker = Arc::new(CircuitBreaker::new(
            "embedding",
            CircuitBreakerConfig::default(),
        ));
        let index = MemoryIndex::new(config, None, breaker);

        let long = "word ".repeat(10_000);
        index.add_document(json!(long)).await;
        assert_eq!(index.len().await, 1);
    }
}
