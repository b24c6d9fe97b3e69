//! Reranker trait for re-scoring retrieved texts against a query.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One reranked document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankHit {
    /// Index of the document in the request.
    pub index: usize,
    /// The document text as echoed by the reranker.
    pub text: String,
    /// Relevance of the document to the query (higher is more relevant).
    pub relevance_score: f32,
    /// Zero-based position in the reranked order.
    pub rank: usize,
}

/// A reranker that scores documents against a query.
///
/// Implementations can use cross-encoder models, LLM-based scoring, or
/// other strategies to improve precision beyond initial vector similarity.
/// Hits are returned best first; at most `top_n` of them.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank `documents` for `query`, returning at most `top_n` hits.
    async fn rerank(&self, query: &str, documents: &[&str], top_n: usize)
    -> Result<Vec<RerankHit>>;
}
