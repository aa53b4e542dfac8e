//! Embedding back-end abstraction.
//!
//! Storage search embeds the query and every indexed item, then ranks by
//! similarity. The vector model lives behind [`Embedding`]; only the cosine
//! default is provided here.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::ids::EmbeddingName;

/// A dense vector produced by an embedding back-end.
pub type Embeddings = Vec<f32>;

/// An embedding back-end.
#[async_trait]
pub trait Embedding: Send + Sync {
    /// Embed a text into a dense vector.
    async fn create_embedding(&self, text: &str) -> Result<Embeddings>;

    /// Similarity of two vectors in `[-1, 1]`. Defaults to cosine.
    async fn calculate_similarity(&self, a: &Embeddings, b: &Embeddings) -> Result<f64> {
        Ok(cosine_similarity(a, b))
    }
}

/// A registered embedding back-end.
#[derive(Clone)]
pub struct EmbeddingSchema {
    /// Unique registry name.
    pub embedding_name: EmbeddingName,
    /// The back-end implementation.
    pub embedding: Arc<dyn Embedding>,
}

impl EmbeddingSchema {
    /// Register a back-end under a name.
    #[must_use]
    pub fn new(embedding_name: impl Into<EmbeddingName>, embedding: Arc<dyn Embedding>) -> Self {
        Self {
            embedding_name: embedding_name.into(),
            embedding,
        }
    }
}

impl std::fmt::Debug for EmbeddingSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingSchema")
            .field("embedding_name", &self.embedding_name)
            .finish_non_exhaustive()
    }
}

/// Cosine similarity of two vectors. Zero for mismatched or zero-norm
/// inputs.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
