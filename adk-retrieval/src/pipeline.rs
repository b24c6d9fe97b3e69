//! Retrieval pipeline orchestrator.
//!
//! The [`RetrievalPipeline`] turns one topic into a bounded, deduplicated,
//! source-diverse and logically ordered list of [`Segment`]s by composing an
//! [`EmbeddingProvider`], a [`VectorStore`], a [`TextGenerator`] and an
//! optional [`Reranker`].
//!
//! # Example
//!
//! ```rust,ignore
//! use adk_retrieval::{InMemoryVectorStore, RetrievalConfig, RetrievalPipeline};
//!
//! let pipeline = RetrievalPipeline::builder()
//!     .config(RetrievalConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .text_generator(Arc::new(my_generator))
//!     .build()?;
//!
//! let result = pipeline.retrieve_optimized("ownership in Rust", 10).await;
//! for segment in &result.segments {
//!     println!("{}: {}", segment.source_id, segment.text);
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{Instrument, debug, info, warn};

use crate::config::RetrievalConfig;
use crate::consolidate::{consolidate, group_by_source};
use crate::context::RetrievalContext;
use crate::dedup::dedup_near;
use crate::diversity::DiversitySelector;
use crate::embedding::EmbeddingProvider;
use crate::error::{RetrievalError, Result};
use crate::fragment::{Fragment, RetrievalResult, Segment};
use crate::generator::TextGenerator;
use crate::orchestrator::{MultiQuerySearch, SubQuery};
use crate::planner::QueryPlanner;
use crate::reranker::Reranker;
use crate::sequencer::LogicalSequencer;
use crate::vectorstore::VectorStore;

/// Prefix of filter keys that address a metadata entry.
const METADATA_FILTER_PREFIX: &str = "metadata.";

/// The retrieval pipeline.
///
/// Every public entry point is infallible: collaborator failures degrade the
/// affected stage to its fallback, and a call that finds nothing returns an
/// empty result. Construct one via [`RetrievalPipeline::builder()`].
pub struct RetrievalPipeline {
    config: RetrievalConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    planner: QueryPlanner,
    search: MultiQuerySearch,
    diversity: DiversitySelector,
    sequencer: LogicalSequencer,
}

impl RetrievalPipeline {
    /// Create a new [`RetrievalPipelineBuilder`].
    pub fn builder() -> RetrievalPipelineBuilder {
        RetrievalPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Retrieve up to `limit` segments about `topic`.
    ///
    /// Plans query variations, searches every configured collection with the
    /// expanded topic and each expanded variation, removes near duplicates,
    /// reranks the pool against the original topic, consolidates same-source
    /// fragments, selects a diverse subset and puts it in reading order.
    /// A `limit` of zero is treated as one.
    pub async fn retrieve_optimized(&self, topic: &str, limit: usize) -> RetrievalResult {
        let ctx = RetrievalContext::new(topic);
        let span = ctx.span().clone();
        self.run_optimized(ctx, limit.max(1)).instrument(span).await
    }

    async fn run_optimized(&self, mut ctx: RetrievalContext, limit: usize) -> RetrievalResult {
        let topic = ctx.topic().to_string();

        let variations = self.planner.generate_variations(&topic).await;
        let queries = self.plan_queries(&topic, &variations, limit).await;
        debug!(queries = queries.len(), "planned sub-queries");

        let fragments = self.search.search_all(&self.config.collections, &queries).await;
        ctx.total_retrieved = fragments.len();
        if fragments.is_empty() {
            warn!("no fragments retrieved");
            return ctx.finish(Vec::new());
        }

        let unique = dedup_near(fragments);
        ctx.unique_retrieved = unique.len();
        debug!(total = ctx.total_retrieved, unique = ctx.unique_retrieved, "deduplicated pool");

        let pool_size = unique.len();
        let ranked = self.search.rerank(&topic, unique, pool_size).await;

        let segments = consolidate(group_by_source(ranked), self.config.max_segment_tokens);
        ctx.consolidated_count = segments.len();
        debug!(segments = segments.len(), "consolidated fragments");

        let selected = self.diversity.select(segments, &topic, limit).await;
        debug!(selected = selected.len(), limit, "selected segments");

        let ordered = self.sequencer.sequence(&topic, selected).await;
        let result = ctx.finish(ordered);
        info!(
            total_retrieved = result.total_retrieved,
            unique_retrieved = result.unique_retrieved,
            consolidated_count = result.consolidated_count,
            final_count = result.final_count,
            "retrieval completed"
        );
        result
    }

    async fn plan_queries(
        &self,
        topic: &str,
        variations: &[String],
        limit: usize,
    ) -> Vec<SubQuery> {
        let primary = self.planner.expand_query(topic).await;
        let expanded: Vec<String> = stream::iter(variations)
            .map(|variation| self.planner.expand_query(variation))
            .buffered(self.config.max_concurrency)
            .collect()
            .await;

        let variation_limit = (limit / 2).max(1);
        std::iter::once(SubQuery::new(primary, limit.saturating_mul(2)))
            .chain(expanded.into_iter().map(|q| SubQuery::new(q, variation_limit)))
            .collect()
    }

    /// Search every configured collection with `query` as-is.
    ///
    /// Skips planning, consolidation, selection and sequencing: the result is
    /// the deduplicated, reranked fragment list truncated to `limit`.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<Fragment> {
        self.search_in(&self.config.collections, query, limit).await
    }

    /// Like [`search`](Self::search), restricted to one collection.
    pub async fn search_collection(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Vec<Fragment> {
        self.search_in(&[collection.to_string()], query, limit).await
    }

    async fn search_in(&self, collections: &[String], query: &str, limit: usize) -> Vec<Fragment> {
        let ctx = RetrievalContext::new(query);
        let limit = limit.max(1);
        async {
            let queries = [SubQuery::new(query, limit.saturating_mul(2))];
            let unique = dedup_near(self.search.search_all(collections, &queries).await);
            let top_n = limit.min(unique.len());
            let mut ranked = self.search.rerank(query, unique, top_n).await;
            ranked.truncate(limit);
            info!(results = ranked.len(), "search completed");
            ranked
        }
        .instrument(ctx.span().clone())
        .await
    }

    /// Optimized retrieval followed by post-filtering.
    ///
    /// Retrieves up to `3 × limit` segments, keeps those matching every
    /// entry of `filters` and truncates to `limit`. A key `metadata.<k>`
    /// addresses the metadata entry `<k>`; `source_id`, `source_path` and
    /// `collection` address the segment fields; any other key is looked up in
    /// the metadata. An array value matches when any of its members is equal
    /// to the field; any other value must be equal.
    pub async fn filter_search(
        &self,
        query: &str,
        filters: &HashMap<String, Value>,
        limit: usize,
    ) -> Vec<Segment> {
        let limit = limit.max(1);
        let result = self.retrieve_optimized(query, limit.saturating_mul(3)).await;
        let before = result.segments.len();
        let matched: Vec<Segment> = result
            .segments
            .into_iter()
            .filter(|segment| segment_matches(segment, filters))
            .take(limit)
            .collect();
        debug!(before, after = matched.len(), filters = filters.len(), "filtered segments");
        matched
    }

    /// Every stored fragment of one source, in chunk order.
    ///
    /// Fragments without a chunk index sort as index zero. Store failures
    /// are logged and yield an empty list.
    pub async fn source_content(&self, collection: &str, source_id: &str) -> Vec<Fragment> {
        let fetched = self
            .config
            .retry
            .run("fetch_source", || self.vector_store.fetch_source(collection, source_id))
            .await;
        match fetched {
            Ok(mut fragments) => {
                fragments.sort_by_key(|f| f.chunk_index.unwrap_or(0));
                debug!(collection, source_id, fragments = fragments.len(), "fetched source");
                fragments
            }
            Err(e) => {
                warn!(collection, source_id, error = %e, "failed to fetch source content");
                Vec::new()
            }
        }
    }

    /// Whether `collection` exists. Errors count as absent.
    pub async fn check_collection(&self, collection: &str) -> bool {
        let exists = self
            .config
            .retry
            .run("collection_exists", || self.vector_store.exists(collection))
            .await;
        match exists {
            Ok(exists) => exists,
            Err(e) => {
                warn!(collection, error = %e, "collection check failed");
                false
            }
        }
    }
}

fn segment_matches(segment: &Segment, filters: &HashMap<String, Value>) -> bool {
    filters.iter().all(|(key, expected)| {
        let actual = match key.as_str() {
            "source_id" => Some(Value::String(segment.source_id.clone())),
            "source_path" => segment.source_path.clone().map(Value::String),
            "collection" => segment.collection.clone().map(Value::String),
            other => {
                let name = other.strip_prefix(METADATA_FILTER_PREFIX).unwrap_or(other);
                segment.metadata.get(name).cloned()
            }
        };
        let Some(actual) = actual else {
            return false;
        };
        match expected {
            Value::Array(options) => options.contains(&actual),
            value => *value == actual,
        }
    })
}

/// Builder for constructing a [`RetrievalPipeline`].
///
/// All fields except `reranker` are required. Call
/// [`build()`](RetrievalPipelineBuilder::build) to validate and produce the
/// pipeline.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RetrievalPipeline::builder()
///     .config(RetrievalConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .text_generator(Arc::new(generator))
///     .reranker(Arc::new(reranker))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RetrievalPipelineBuilder {
    config: Option<RetrievalConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    text_generator: Option<Arc<dyn TextGenerator>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RetrievalPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the text generator used for planning and sequencing.
    pub fn text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.text_generator = Some(generator);
        self
    }

    /// Set an optional reranker for post-search result reordering.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Build the [`RetrievalPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if any required field is missing.
    pub fn build(self) -> Result<RetrievalPipeline> {
        let config =
            self.config.ok_or_else(|| RetrievalError::Config("config is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RetrievalError::Config("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RetrievalError::Config("vector_store is required".to_string()))?;
        let text_generator = self
            .text_generator
            .ok_or_else(|| RetrievalError::Config("text_generator is required".to_string()))?;

        let retry = config.retry.clone();
        let planner = QueryPlanner::new(
            text_generator.clone(),
            retry.clone(),
            config.max_variations,
            config.expansion_terms,
        );
        let search = MultiQuerySearch::new(
            embedding_provider.clone(),
            vector_store.clone(),
            self.reranker,
            retry.clone(),
        )
        .with_min_similarity(config.min_similarity)
        .with_max_concurrency(config.max_concurrency);
        let diversity = DiversitySelector::new(embedding_provider.clone(), retry.clone())
            .with_batching(config.embedding_batch_size, config.max_concurrency)
            .with_weights(config.relevance_weight, config.redundancy_weight);
        let sequencer = LogicalSequencer::new(text_generator, retry);

        Ok(RetrievalPipeline {
            config,
            embedding_provider,
            vector_store,
            planner,
            search,
            diversity,
            sequencer,
        })
    }
}
