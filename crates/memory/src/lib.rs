//! Embedding-based recall memory.
//!
//! Stores JSON documents (typically summarized agent runs) alongside their
//! embedding vectors and answers nearest-neighbor queries by cosine
//! distance. The embedding path is resilient by construction: remote
//! embedder behind a circuit breaker, local hash embedder as fallback, zero
//! vector as a last resort, and recall that degrades to recency instead of
//! failing.

pub mod embedder;
pub mod index;

pub use embedder::{Embedder, HashEmbedder, RemoteEmbedder};
pub use index::{cosine_similarity, MemoryIndex, SearchHit};
