//! Embedding provider trait for generating vector embeddings from text.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RetrievalError, Result};

/// What an embedding will be compared against.
///
/// Asymmetric embedding models produce different vectors for search queries
/// and for the passages being searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingIntent {
    /// A search query.
    Query,
    /// A stored or candidate passage.
    Passage,
}

impl fmt::Display for EmbeddingIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => f.write_str("query"),
            Self::Passage => f.write_str("passage"),
        }
    }
}

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (Jina, OpenAI, etc.)
/// behind a unified async interface. A batch either succeeds as a whole or
/// fails; partial batches are never returned.
///
/// # Example
///
/// ```rust,ignore
/// use adk_retrieval::{EmbeddingIntent, EmbeddingProvider};
///
/// let provider = MyEmbeddingProvider::new();
/// let vectors = provider.embed(&["hello", "world"], EmbeddingIntent::Passage).await?;
/// assert_eq!(vectors.len(), 2);
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate one embedding per input text, in input order.
    async fn embed(&self, texts: &[&str], intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>>;

    /// Generate an embedding for a single text.
    async fn embed_one(&self, text: &str, intent: EmbeddingIntent) -> Result<Vec<f32>> {
        self.embed(&[text], intent).await?.into_iter().next().ok_or_else(|| {
            RetrievalError::MalformedResponse("embedding provider returned no vectors".into())
        })
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector is empty or has zero magnitude. Vectors of
/// different lengths are compared over their common prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_are_maximally_similar() {
        let v = [0.3, -0.2, 0.9];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn zero_or_empty_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
