//! Relevance-versus-redundancy selection of consolidated segments.
//!
//! Selection keeps a core tier of the highest-scoring segments untouched and
//! fills the remaining slots from a pool reordered by topic similarity minus
//! a penalty that grows with every additional segment of the same source.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::embedding::{EmbeddingIntent, EmbeddingProvider, cosine_similarity};
use crate::error::{RetrievalError, Result};
use crate::fragment::Segment;
use crate::retry::RetryPolicy;

/// Segments longer than this many words are embedded from a sample.
const SAMPLE_THRESHOLD_WORDS: usize = 600;

/// Words taken from each end of a long segment when sampling.
const SAMPLE_EDGE_WORDS: usize = 300;

/// Selects a bounded, source-diverse subset of segments.
pub struct DiversitySelector {
    embedder: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    batch_size: usize,
    max_concurrency: usize,
    relevance_weight: f32,
    redundancy_weight: f32,
}

impl DiversitySelector {
    /// Create a selector using `embedder` for topic-similarity refinement.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, retry: RetryPolicy) -> Self {
        Self {
            embedder,
            retry,
            batch_size: 20,
            max_concurrency: 4,
            relevance_weight: 0.7,
            redundancy_weight: 0.3,
        }
    }

    /// Set the embedding batch size and the number of batches in flight.
    pub fn with_batching(mut self, batch_size: usize, max_concurrency: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Set the weights of the composite diversity key.
    pub fn with_weights(mut self, relevance: f32, redundancy: f32) -> Self {
        self.relevance_weight = relevance;
        self.redundancy_weight = redundancy;
        self
    }

    /// Select at most `limit` segments.
    ///
    /// Below capacity the input is returned unchanged. Otherwise the top
    /// `ceil(limit / 3)` segments by relevance are kept first, and the rest
    /// of the output comes from the remainder ranked by
    /// [`rank_by_diversity`]. If topic embeddings cannot be obtained the
    /// remainder is ranked by relevance alone.
    pub async fn select(&self, segments: Vec<Segment>, topic: &str, limit: usize) -> Vec<Segment> {
        if segments.len() <= limit {
            return segments;
        }

        let (mut selected, mut remainder) = split_core_tier(segments, limit);
        debug!(core = selected.len(), remainder = remainder.len(), "split core tier");

        match self.topic_similarities(topic, &remainder).await {
            Ok(similarities) => {
                for (segment, similarity) in remainder.iter_mut().zip(similarities) {
                    segment.topic_similarity = Some(similarity);
                }
                remainder =
                    rank_by_diversity(remainder, self.relevance_weight, self.redundancy_weight);
            }
            Err(e) => {
                warn!(error = %e, "topic similarity refinement failed, ranking by relevance");
                sort_by_relevance(&mut remainder);
            }
        }

        let room = limit.saturating_sub(selected.len());
        selected.extend(remainder.into_iter().take(room));
        selected
    }

    async fn topic_similarities(&self, topic: &str, segments: &[Segment]) -> Result<Vec<f32>> {
        let topic_vector = self
            .retry
            .run("embed_topic", || self.embedder.embed_one(topic, EmbeddingIntent::Query))
            .await?;

        let samples: Vec<String> = segments.iter().map(|s| sample_for_embedding(&s.text)).collect();
        let batches: Vec<Result<Vec<Vec<f32>>>> = stream::iter(samples.chunks(self.batch_size))
            .map(|batch| self.embed_batch(batch))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut similarities = Vec::with_capacity(segments.len());
        for batch in batches {
            for vector in batch? {
                similarities.push(cosine_similarity(&topic_vector, &vector));
            }
        }
        Ok(similarities)
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<&str> = batch.iter().map(String::as_str).collect();
        let vectors = self
            .retry
            .run("embed_segments", || self.embedder.embed(&texts, EmbeddingIntent::Passage))
            .await?;
        if vectors.len() != texts.len() {
            return Err(RetrievalError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

/// Split off the core tier: the top `ceil(limit / 3)` segments by relevance.
///
/// Returns `(core, remainder)`; ties keep their input order.
pub fn split_core_tier(mut segments: Vec<Segment>, limit: usize) -> (Vec<Segment>, Vec<Segment>) {
    sort_by_relevance(&mut segments);
    let core = limit.div_ceil(3).min(segments.len());
    let remainder = segments.split_off(core);
    (segments, remainder)
}

/// Rank segments by `similarity * relevance_weight - redundancy * redundancy_weight`.
///
/// Segments are first ordered by descending topic similarity. Scanning in
/// that order, each segment's redundancy is the number of segments of its
/// source seen so far, itself included, so the second segment of a source
/// is penalised more than the first.
pub fn rank_by_diversity(
    mut segments: Vec<Segment>,
    relevance_weight: f32,
    redundancy_weight: f32,
) -> Vec<Segment> {
    segments.sort_by(|a, b| similarity(b).total_cmp(&similarity(a)));

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut keyed: Vec<(f32, Segment)> = segments
        .into_iter()
        .map(|segment| {
            let count = seen.entry(segment.source_id.clone()).or_insert(0);
            *count += 1;
            let key = similarity(&segment) * relevance_weight - *count as f32 * redundancy_weight;
            (key, segment)
        })
        .collect();

    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    keyed.into_iter().map(|(_, segment)| segment).collect()
}

/// The text embedded for a segment: the first and last 300 words of long
/// segments, the whole text otherwise.
pub fn sample_for_embedding(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= SAMPLE_THRESHOLD_WORDS {
        return text.to_string();
    }
    let head = &words[..SAMPLE_EDGE_WORDS];
    let tail = &words[words.len() - SAMPLE_EDGE_WORDS..];
    head.iter().chain(tail).copied().collect::<Vec<_>>().join(" ")
}

fn similarity(segment: &Segment) -> f32 {
    segment.topic_similarity.unwrap_or(0.0)
}

fn sort_by_relevance(segments: &mut [Segment]) {
    segments.sort_by(|a, b| b.ranking_score().total_cmp(&a.ranking_score()));
}
