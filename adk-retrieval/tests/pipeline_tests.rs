use std::collections::HashMap;
use std::sync::Arc;

use adk_retrieval::{
    EmbeddingIntent, EmbeddingProvider, Fragment, InMemoryVectorStore, IndexedPoint, RerankHit,
    Reranker, Result, RetrievalConfig, RetrievalError, RetrievalPipeline, RetrievalResult,
    RetryPolicy, TextGenerator, VectorStore,
};
use async_trait::async_trait;
use serde_json::json;

const VOCAB: &[&str] = &["rust", "ownership", "borrow", "lifetime", "garden", "tomato"];

/// Bag-of-words vector over a fixed vocabulary plus a constant bias term.
fn vectorize(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; VOCAB.len() + 1];
    vector[VOCAB.len()] = 0.2;
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if let Some(i) = VOCAB.iter().position(|v| *v == word) {
            vector[i] += 1.0;
        }
    }
    vector
}

#[derive(Default)]
struct Keywords {
    offline: bool,
    passages_offline: bool,
}

#[async_trait]
impl EmbeddingProvider for Keywords {
    async fn embed(&self, texts: &[&str], intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>> {
        if self.offline || (self.passages_offline && intent == EmbeddingIntent::Passage) {
            return Err(RetrievalError::Embedding {
                provider: "keywords".into(),
                message: "offline".into(),
            });
        }
        Ok(texts.iter().map(|t| vectorize(t)).collect())
    }
}

/// Answers each prompt kind with a fixed reply; `None` fails the call.
#[derive(Default)]
struct Scripted {
    variations: Option<&'static str>,
    expansion: Option<&'static str>,
    sequence: Option<&'static str>,
}

impl Scripted {
    fn sequencing(order: &'static str) -> Self {
        Self { variations: Some(""), expansion: Some(""), sequence: Some(order) }
    }
}

#[async_trait]
impl TextGenerator for Scripted {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let reply = if prompt.contains("Segment 1:") {
            self.sequence
        } else if prompt.contains("expand this search query") {
            self.expansion
        } else {
            self.variations
        };
        reply.map(str::to_string).ok_or_else(|| RetrievalError::Generation {
            provider: "scripted".into(),
            message: "offline".into(),
        })
    }
}

/// Ranks documents in reverse input order.
struct Reverse;

#[async_trait]
impl Reranker for Reverse {
    async fn rerank(
        &self,
        _query: &str,
        documents: &[&str],
        top_n: usize,
    ) -> Result<Vec<RerankHit>> {
        Ok((0..documents.len())
            .rev()
            .take(top_n)
            .enumerate()
            .map(|(rank, index)| RerankHit {
                index,
                text: documents[index].to_string(),
                relevance_score: 1.0 - rank as f32 * 0.1,
                rank: rank + 1,
            })
            .collect())
    }
}

struct Unavailable;

#[async_trait]
impl Reranker for Unavailable {
    async fn rerank(&self, _: &str, _: &[&str], _: usize) -> Result<Vec<RerankHit>> {
        Err(RetrievalError::Reranker { reranker: "unavailable".into(), message: "503".into() })
    }
}

/// Delegates to an in-memory store, except that `offline` cannot even be
/// checked and `broken` exists but fails every read.
struct Partitioned {
    inner: InMemoryVectorStore,
}

fn store_down(collection: &str) -> RetrievalError {
    RetrievalError::VectorStore {
        backend: "partitioned".into(),
        message: format!("{collection} unreachable"),
    }
}

#[async_trait]
impl VectorStore for Partitioned {
    async fn exists(&self, collection: &str) -> Result<bool> {
        match collection {
            "offline" => Err(store_down(collection)),
            "broken" => Ok(true),
            _ => self.inner.exists(collection).await,
        }
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<Fragment>> {
        if collection == "broken" {
            return Err(store_down(collection));
        }
        self.inner.search(collection, embedding, limit, min_score).await
    }

    async fn fetch_source(&self, collection: &str, source_id: &str) -> Result<Vec<Fragment>> {
        if collection == "broken" {
            return Err(store_down(collection));
        }
        self.inner.fetch_source(collection, source_id).await
    }
}

// Similarity to "Rust ownership": a ≈ 0.95, b ≈ 0.82, c ≈ 0.58, garden ≈ 0.02.
const A: &str = "Rust ownership means each value has one ownership root";
const B: &str = "Rust ownership lets you borrow values";
const C: &str = "Rust ownership ties every lifetime to a scope lifetime";
const GARDEN: &str = "A garden tomato needs sun";
// Similarity ≈ 0.42.
const ARCHIVE: &str = "Notes on borrow and lifetime rules in Rust";

fn point(id: &str, source: &str, chunk: u64, text: &str) -> IndexedPoint {
    IndexedPoint::new(id, vectorize(text))
        .with_field("text", text)
        .with_field("source_id", source)
        .with_field("source_path", format!("library/{source}.md"))
        .with_field("chunk_index", chunk)
}

async fn library() -> InMemoryVectorStore {
    let store = InMemoryVectorStore::new();
    store.create_collection("primary").await;
    store
        .upsert(
            "primary",
            vec![
                point("a0", "a", 0, A).with_field("metadata", json!({"source_type": ".md"})),
                point("b0", "b", 0, B),
                point("c0", "c", 0, C),
                point("g0", "garden", 0, GARDEN),
            ],
        )
        .await
        .unwrap();
    store.create_collection("archive").await;
    store.upsert("archive", vec![point("d0", "d", 0, ARCHIVE)]).await.unwrap();
    store
}

fn pipeline(
    store: Arc<dyn VectorStore>,
    generator: Scripted,
    embedder: Keywords,
    reranker: Option<Arc<dyn Reranker>>,
    collections: &[&str],
) -> RetrievalPipeline {
    let config = RetrievalConfig::builder()
        .collections(collections.iter().copied())
        .min_similarity(0.3)
        .retry(RetryPolicy::none())
        .build()
        .unwrap();
    let mut builder = RetrievalPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(embedder))
        .vector_store(store)
        .text_generator(Arc::new(generator));
    if let Some(reranker) = reranker {
        builder = builder.reranker(reranker);
    }
    builder.build().unwrap()
}

async fn primary_only(generator: Scripted) -> RetrievalPipeline {
    pipeline(Arc::new(library().await), generator, Keywords::default(), None, &["primary"])
}

async fn retrieve(generator: Scripted, limit: usize) -> RetrievalResult {
    primary_only(generator).await.retrieve_optimized("Rust ownership", limit).await
}

fn sources<T>(items: &[T], source: impl Fn(&T) -> &str) -> Vec<String> {
    items.iter().map(|item| source(item).to_string()).collect()
}

#[tokio::test]
async fn valid_reading_order_is_applied() {
    let result = retrieve(Scripted::sequencing("3,2,1"), 3).await;

    assert_eq!(sources(&result.segments, |s| &s.source_id), vec!["c", "b", "a"]);
    // One primary query (limit 6) plus three templated variations (limit 1 each).
    assert_eq!(result.total_retrieved, 6);
    assert_eq!(result.unique_retrieved, 3);
    assert_eq!(result.consolidated_count, 3);
    assert_eq!(result.final_count, 3);
    assert_eq!(result.topic, "Rust ownership");
}

#[tokio::test]
async fn incomplete_reading_order_keeps_relevance_order() {
    let result = retrieve(Scripted::sequencing("3,1"), 3).await;

    assert_eq!(sources(&result.segments, |s| &s.source_id), vec!["a", "b", "c"]);
    let scores: Vec<f32> = result.segments.iter().filter_map(|s| s.relevance_score).collect();
    assert_eq!(scores.len(), 3);
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn generator_outage_still_returns_results() {
    let result = retrieve(Scripted::default(), 3).await;

    assert_eq!(sources(&result.segments, |s| &s.source_id), vec!["a", "b", "c"]);
    assert!(result.segments.iter().all(|s| s.relevance_score.is_some()));
    assert!(result.segments.iter().all(|s| s.rerank_score.is_some()));
    assert!(result.segments.iter().all(|s| s.source_id != "garden"));
}

#[tokio::test]
async fn limit_bounds_output_and_keeps_core_tier() {
    let result = retrieve(Scripted::default(), 2).await;

    assert_eq!(result.final_count, 2);
    assert_eq!(result.consolidated_count, 3);
    assert_eq!(sources(&result.segments, |s| &s.source_id), vec!["a", "b"]);
}

#[tokio::test]
async fn diversity_falls_back_to_relevance_when_passages_cannot_be_embedded() {
    let embedder = Keywords { passages_offline: true, ..Keywords::default() };
    let store = Arc::new(library().await);
    let result = pipeline(store, Scripted::default(), embedder, None, &["primary"])
        .retrieve_optimized("Rust ownership", 2)
        .await;

    assert_eq!(sources(&result.segments, |s| &s.source_id), vec!["a", "b"]);
}

#[tokio::test]
async fn zero_limit_is_treated_as_one() {
    let result = retrieve(Scripted::default(), 0).await;
    assert_eq!(result.final_count, 1);
    assert_eq!(result.segments[0].source_id, "a");
}

#[tokio::test]
async fn reranker_order_drives_consolidation() {
    let store = Arc::new(library().await);
    let result = pipeline(
        store,
        Scripted::sequencing("not an order"),
        Keywords::default(),
        Some(Arc::new(Reverse)),
        &["primary"],
    )
    .retrieve_optimized("Rust ownership", 3)
    .await;

    assert_eq!(sources(&result.segments, |s| &s.source_id), vec!["c", "b", "a"]);
    let top = result.segments[0].relevance_score.unwrap();
    assert!((top - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn reranker_failure_keeps_similarity_order() {
    let store = Arc::new(library().await);
    let result = pipeline(
        store,
        Scripted::default(),
        Keywords::default(),
        Some(Arc::new(Unavailable)),
        &["primary"],
    )
    .retrieve_optimized("Rust ownership", 3)
    .await;

    assert_eq!(sources(&result.segments, |s| &s.source_id), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn failing_collections_do_not_affect_healthy_ones() {
    let store = Arc::new(Partitioned { inner: library().await });
    let pipeline = pipeline(
        store,
        Scripted::default(),
        Keywords::default(),
        None,
        &["primary", "missing", "offline", "broken", "archive"],
    );
    let result = pipeline.retrieve_optimized("Rust ownership", 10).await;

    let mut found = sources(&result.segments, |s| &s.source_id);
    found.sort();
    assert_eq!(found, vec!["a", "b", "c", "d"]);
    let archive = result.segments.iter().find(|s| s.source_id == "d").unwrap();
    assert_eq!(archive.collection.as_deref(), Some("archive"));
    assert_eq!(archive.source_path.as_deref(), Some("library/d.md"));
}

#[tokio::test]
async fn no_live_collection_yields_empty_result() {
    let store = Arc::new(library().await);
    let result = pipeline(store, Scripted::default(), Keywords::default(), None, &["missing"])
        .retrieve_optimized("Rust ownership", 5)
        .await;

    assert!(result.segments.is_empty());
    assert_eq!(result.total_retrieved, 0);
    assert_eq!(result.final_count, 0);
}

#[tokio::test]
async fn embedding_outage_yields_empty_result() {
    let embedder = Keywords { offline: true, ..Keywords::default() };
    let store = Arc::new(library().await);
    let result = pipeline(store, Scripted::default(), embedder, None, &["primary"])
        .retrieve_optimized("Rust ownership", 5)
        .await;

    assert!(result.segments.is_empty());
    assert_eq!(result.unique_retrieved, 0);
}

#[tokio::test]
async fn search_returns_ranked_fragments_across_collections() {
    let store = Arc::new(library().await);
    let pipeline =
        pipeline(store, Scripted::default(), Keywords::default(), None, &["primary", "archive"]);

    let hits = pipeline.search("Rust ownership", 10).await;
    assert_eq!(sources(&hits, |f| &f.source_id), vec!["a", "b", "c", "d"]);
    assert!(hits.windows(2).all(|w| w[0].similarity_score >= w[1].similarity_score));
    assert_eq!(hits[3].collection.as_deref(), Some("archive"));

    let top = pipeline.search("Rust ownership", 2).await;
    assert_eq!(sources(&top, |f| &f.source_id), vec!["a", "b"]);
}

#[tokio::test]
async fn search_collection_is_restricted_to_one_collection() {
    let store = Arc::new(library().await);
    let pipeline =
        pipeline(store, Scripted::default(), Keywords::default(), None, &["primary", "archive"]);

    let hits = pipeline.search_collection("archive", "Rust ownership", 5).await;
    assert_eq!(sources(&hits, |f| &f.source_id), vec!["d"]);
    assert!(pipeline.search_collection("missing", "Rust ownership", 5).await.is_empty());
}

#[tokio::test]
async fn search_applies_reranker_order() {
    let store = Arc::new(library().await);
    let pipeline = pipeline(
        store,
        Scripted::default(),
        Keywords::default(),
        Some(Arc::new(Reverse)),
        &["primary"],
    );

    let hits = pipeline.search("Rust ownership", 3).await;
    assert_eq!(sources(&hits, |f| &f.source_id), vec!["c", "b", "a"]);
    assert_eq!(hits[0].rerank_position, Some(0));
}

#[tokio::test]
async fn filter_search_keeps_matching_segments() {
    let pipeline = primary_only(Scripted::default()).await;

    let by_source = HashMap::from([("source_id".to_string(), json!("b"))]);
    let segments = pipeline.filter_search("Rust ownership", &by_source, 5).await;
    assert_eq!(sources(&segments, |s| &s.source_id), vec!["b"]);

    let by_metadata = HashMap::from([("metadata.source_type".to_string(), json!(".md"))]);
    let segments = pipeline.filter_search("Rust ownership", &by_metadata, 5).await;
    assert_eq!(sources(&segments, |s| &s.source_id), vec!["a"]);

    let any_of = HashMap::from([("source_id".to_string(), json!(["a", "c"]))]);
    let segments = pipeline.filter_search("Rust ownership", &any_of, 1).await;
    assert_eq!(segments.len(), 1);
}

#[tokio::test]
async fn source_content_is_returned_in_chunk_order() {
    let inner = library().await;
    inner
        .upsert(
            "primary",
            vec![
                point("a2", "a", 2, "Third part about ownership"),
                point("a1", "a", 1, "Second part about ownership"),
            ],
        )
        .await
        .unwrap();
    let store = Arc::new(Partitioned { inner });
    let pipeline = pipeline(store, Scripted::default(), Keywords::default(), None, &["primary"]);

    let fragments = pipeline.source_content("primary", "a").await;
    let chunks: Vec<Option<u64>> = fragments.iter().map(|f| f.chunk_index).collect();
    assert_eq!(chunks, vec![Some(0), Some(1), Some(2)]);
    assert!(fragments.iter().all(|f| f.source_id == "a"));

    assert!(pipeline.source_content("primary", "nope").await.is_empty());
    assert!(pipeline.source_content("broken", "a").await.is_empty());
}

#[tokio::test]
async fn check_collection_reports_existence() {
    let store = Arc::new(Partitioned { inner: library().await });
    let pipeline = pipeline(store, Scripted::default(), Keywords::default(), None, &["primary"]);

    assert!(pipeline.check_collection("primary").await);
    assert!(pipeline.check_collection("archive").await);
    assert!(!pipeline.check_collection("missing").await);
    assert!(!pipeline.check_collection("offline").await);
}
