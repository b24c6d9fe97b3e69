//! Multi-query, multi-collection search and rerank refinement.
//!
//! The orchestrator embeds each query once, searches every live collection
//! with it, and concatenates the hits. Failures are isolated per query and
//! per collection: a query whose embedding fails contributes nothing, and a
//! collection whose search fails is skipped for that query only.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::dedup::dedup_exact;
use crate::embedding::{EmbeddingIntent, EmbeddingProvider};
use crate::fragment::Fragment;
use crate::reranker::Reranker;
use crate::retry::RetryPolicy;
use crate::vectorstore::VectorStore;

/// One query to run, with the number of candidates to request per collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    pub text: String,
    pub limit: usize,
}

impl SubQuery {
    pub fn new(text: impl Into<String>, limit: usize) -> Self {
        Self { text: text.into(), limit: limit.max(1) }
    }
}

/// Runs sub-queries against the vector store and refines the merged pool.
pub struct MultiQuerySearch {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    reranker: Option<Arc<dyn Reranker>>,
    retry: RetryPolicy,
    min_similarity: f32,
    max_concurrency: usize,
}

impl MultiQuerySearch {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        reranker: Option<Arc<dyn Reranker>>,
        retry: RetryPolicy,
    ) -> Self {
        Self { embedder, store, reranker, retry, min_similarity: 0.5, max_concurrency: 4 }
    }

    /// Set the minimum similarity passed to every vector search.
    pub fn with_min_similarity(mut self, threshold: f32) -> Self {
        self.min_similarity = threshold;
        self
    }

    /// Set how many sub-queries may be in flight at once.
    pub fn with_max_concurrency(mut self, concurrency: usize) -> Self {
        self.max_concurrency = concurrency.max(1);
        self
    }

    /// The collections among `collections` that exist and are reachable.
    pub async fn live_collections<'a>(&self, collections: &'a [String]) -> Vec<&'a str> {
        let mut live = Vec::with_capacity(collections.len());
        for collection in collections {
            match self.retry.run("collection_exists", || self.store.exists(collection)).await {
                Ok(true) => live.push(collection.as_str()),
                Ok(false) => warn!(collection = %collection, "collection does not exist, skipping"),
                Err(e) => {
                    warn!(collection = %collection, error = %e, "collection check failed, skipping")
                }
            }
        }
        live
    }

    /// Run every sub-query against every live collection.
    ///
    /// The result is the concatenation of the per-query hit lists in query
    /// order. Duplicates across queries are expected and left in place.
    pub async fn search_all(&self, collections: &[String], queries: &[SubQuery]) -> Vec<Fragment> {
        let live = self.live_collections(collections).await;
        if live.is_empty() {
            warn!(requested = collections.len(), "no searchable collections");
            return Vec::new();
        }

        let fragments: Vec<Fragment> = stream::iter(queries)
            .map(|query| self.search_query(&live, query))
            .buffered(self.max_concurrency)
            .concat()
            .await;
        debug!(queries = queries.len(), fragments = fragments.len(), "multi-query search finished");
        fragments
    }

    async fn search_query(&self, collections: &[&str], query: &SubQuery) -> Vec<Fragment> {
        let embedding = match self
            .retry
            .run("embed_query", || self.embedder.embed_one(&query.text, EmbeddingIntent::Query))
            .await
        {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "query embedding failed, query contributes no results");
                return Vec::new();
            }
        };

        let mut fragments = Vec::new();
        for &collection in collections {
            let hits = self
                .retry
                .run("vector_search", || {
                    self.store.search(collection, &embedding, query.limit, self.min_similarity)
                })
                .await;
            match hits {
                Ok(hits) => {
                    let hits = dedup_exact(hits);
                    debug!(collection, hits = hits.len(), "collection searched");
                    fragments.extend(hits.into_iter().map(|mut fragment| {
                        fragment.collection = Some(collection.to_string());
                        fragment
                    }));
                }
                Err(e) => warn!(collection, error = %e, "vector search failed, skipping"),
            }
        }
        fragments
    }

    /// Reorder `fragments` by reranker position for `query`.
    ///
    /// Fragments are first ordered by descending similarity. When a reranker
    /// is configured and succeeds, ranked fragments move to the front in
    /// reranker order and carry their rerank score and position; unranked
    /// fragments follow in similarity order. On reranker failure the
    /// similarity order stands.
    pub async fn rerank(
        &self,
        query: &str,
        mut fragments: Vec<Fragment>,
        top_n: usize,
    ) -> Vec<Fragment> {
        fragments.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));

        let Some(reranker) = &self.reranker else {
            return fragments;
        };
        if fragments.len() < 2 {
            return fragments;
        }

        let texts: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
        let top_n = top_n.clamp(1, texts.len());
        let hits = match self.retry.run("rerank", || reranker.rerank(query, &texts, top_n)).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "reranking failed, keeping similarity order");
                return fragments;
            }
        };

        let mut position = 0;
        for hit in hits {
            let Some(fragment) = fragments.get_mut(hit.index) else {
                continue;
            };
            if fragment.rerank_position.is_some() {
                continue;
            }
            fragment.rerank_score = Some(hit.relevance_score);
            fragment.rerank_position = Some(position);
            position += 1;
        }
        debug!(ranked = position, pool = fragments.len(), "reranked pool");

        fragments.sort_by_key(|f| f.rerank_position.unwrap_or(usize::MAX));
        fragments
    }
}
