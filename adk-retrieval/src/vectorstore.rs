//! Vector store trait for similarity search over stored fragments.

use async_trait::async_trait;

use crate::error::Result;
use crate::fragment::Fragment;

/// A searchable store of embedded fragments, organised in named collections.
///
/// Implementations parse their raw payloads into [`Fragment`]s with
/// [`Fragment::from_payload`] so the pipeline never sees untyped records.
///
/// # Example
///
/// ```rust,ignore
/// use adk_retrieval::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// if store.exists("docs").await? {
///     let hits = store.search("docs", &query_embedding, 10, 0.5).await?;
/// }
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Whether the named collection exists.
    async fn exists(&self, collection: &str) -> Result<bool>;

    /// Search for at most `limit` fragments whose similarity to `embedding`
    /// is at least `min_score`.
    ///
    /// Returns fragments ordered by descending similarity score.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<Fragment>>;

    /// Fetch every fragment belonging to `source_id`, in no particular order.
    async fn fetch_source(&self, collection: &str, source_id: &str) -> Result<Vec<Fragment>>;
}
