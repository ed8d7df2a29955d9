//! Embedding backends.
//!
//! Two implementations sit behind the [`Embedder`] trait: a remote
//! OpenAI-compatible `/embeddings` client with credential rotation, and a
//! deterministic hash embedder used as the local fallback when the remote
//! path is down or unconfigured.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use ironloop_core::error::MemoryError;

/// How often a connection-class failure is retried on the same credential
/// before giving up on it.
const CONNECT_RETRIES: u32 = 2;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);
const CONNECT_RETRY_DELAY_MAX: Duration = Duration::from_secs(4);

/// Turns text into a fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

// --- Remote embedder ---

/// An OpenAI-compatible embedding client.
///
/// Holds every configured API key and rotates through them: a quota, auth,
/// or bad-request response burns the current credential and moves to the
/// next, while a connection-class failure retries the same credential with
/// capped exponential backoff. The rotation start index advances per call so
/// load spreads across keys even when all of them are healthy.
pub struct RemoteEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    credentials: Vec<String>,
    next: AtomicUsize,
    client: reqwest::Client,
}

enum AttemptError {
    /// Transient transport failure: retry the same credential.
    Connection(String),
    /// The credential (or the request itself) was rejected: rotate.
    Rotate(MemoryError),
}

impl RemoteEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        credentials: Vec<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
            credentials,
            next: AtomicUsize::new(0),
            client,
        }
    }

    async fn request(&self, api_key: &str, text: &str) -> Result<Vec<f32>, AttemptError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
            "encoding_format": "float",
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    AttemptError::Connection(e.to_string())
                } else {
                    AttemptError::Rotate(MemoryError::EmbeddingFailed(e.to_string()))
                }
            })?;

        let status = response.status().as_u16();
        match status {
            200 => {}
            429 => {
                return Err(AttemptError::Rotate(MemoryError::QuotaExceeded(
                    "embedding quota exceeded (429)".into(),
                )));
            }
            401 | 403 => {
                return Err(AttemptError::Rotate(MemoryError::BadCredential(format!(
                    "credential rejected ({status})"
                ))));
            }
            400 => {
                let detail = response.text().await.unwrap_or_default();
                return Err(AttemptError::Rotate(MemoryError::BadCredential(format!(
                    "bad request: {detail}"
                ))));
            }
            502 | 503 | 504 => {
                return Err(AttemptError::Connection(format!(
                    "upstream unavailable ({status})"
                )));
            }
            _ => {
                let detail = response.text().await.unwrap_or_default();
                return Err(AttemptError::Rotate(MemoryError::EmbeddingFailed(
                    format!("unexpected status {status}: {detail}"),
                )));
            }
        }

        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            AttemptError::Rotate(MemoryError::EmbeddingFailed(format!(
                "failed to parse embedding response: {e}"
            )))
        })?;

        api_resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                AttemptError::Rotate(MemoryError::EmbeddingFailed(
                    "empty embedding response".into(),
                ))
            })
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn name(&self) -> &str {
        "remote"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        if self.credentials.is_empty() {
            return Err(MemoryError::BadCredential("no API keys configured".into()));
        }

        let start = self.next.fetch_add(1, Ordering::Relaxed) % self.credentials.len();
        let mut last_error = MemoryError::EmbeddingFailed("no credentials tried".into());

        for offset in 0..self.credentials.len() {
            let index = (start + offset) % self.credentials.len();
            let api_key = &self.credentials[index];

            let mut delay = CONNECT_RETRY_DELAY;
            let mut attempt = 0u32;
            loop {
                match self.request(api_key, text).await {
                    Ok(vector) => return Ok(vector),
                    Err(AttemptError::Connection(msg)) if attempt < CONNECT_RETRIES => {
                        warn!(
                            credential = index,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %msg,
                            "Embedding connection failed, retrying same credential"
                        );
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(CONNECT_RETRY_DELAY_MAX);
                        attempt += 1;
                    }
                    Err(AttemptError::Connection(msg)) => {
                        last_error = MemoryError::EmbeddingFailed(msg);
                        break;
                    }
                    Err(AttemptError::Rotate(err)) => {
                        debug!(credential = index, error = %err, "Rotating embedding credential");
                        last_error = err;
                        break;
                    }
                }
            }
        }

        Err(last_error)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

// --- Local fallback ---

/// Deterministic feature-hash embedder.
///
/// Each alphanumeric token is hashed into a bucket of the output vector
/// with a hash-derived sign, then the vector is L2-normalized. Not a
/// learned model, but stable: the same text always lands on the same
/// vector, so recall over locally-embedded documents stays coherent.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        // Split on punctuation as well so serialized JSON tokenizes cleanly.
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty());
        for token in tokens {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&digest[..8]);
            let hash = u64::from_le_bytes(raw);

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "local-hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        Ok(self.embed_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("deploy the web service").await.unwrap();
        let b = embedder.embed("deploy the web service").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn hash_embedder_output_is_normalized() {
        let embedder = HashEmbedder::new(32);
        let v = embedder.embed("some nonempty text").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hash_embedder_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn remote_embedder_without_credentials_errors() {
        let embedder =
            RemoteEmbedder::new("http://localhost:9", "test-model", 8, Vec::new());
        let err = embedder.embed("text").await.unwrap_err();
        assert!(matches!(err, MemoryError::BadCredential(_)));
    }
}
