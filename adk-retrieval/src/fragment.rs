//! Data types for fragments, consolidated segments, and retrieval results.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Source identifier used when a payload carries none.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// A single vector-search hit, the smallest retrievable unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fragment {
    /// The text content of the fragment.
    pub text: String,
    /// Similarity between the query vector and this fragment's vector.
    pub similarity_score: f32,
    /// Opaque identifier of the source document. Never empty.
    pub source_id: String,
    /// Path of the source document, empty when unknown.
    pub source_path: String,
    /// Position of the fragment within its source.
    pub chunk_index: Option<u64>,
    /// Topic keywords attached at ingestion time.
    pub keywords: BTreeSet<String>,
    /// Remaining payload metadata.
    pub metadata: HashMap<String, Value>,
    /// The collection the fragment was retrieved from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Score assigned by the reranker, when reranking succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    /// Position assigned by the reranker, when reranking succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_position: Option<usize>,
}

impl Fragment {
    /// Create a fragment with the given text, score and source, and no other data.
    pub fn new(
        text: impl Into<String>,
        similarity_score: f32,
        source_id: impl Into<String>,
    ) -> Self {
        let source_id = source_id.into();
        Self {
            text: text.into(),
            similarity_score,
            source_id: if source_id.is_empty() { UNKNOWN_SOURCE.to_string() } else { source_id },
            source_path: String::new(),
            chunk_index: None,
            keywords: BTreeSet::new(),
            metadata: HashMap::new(),
            collection: None,
            rerank_score: None,
            rerank_position: None,
        }
    }

    /// Set the chunk index.
    pub fn with_chunk_index(mut self, index: u64) -> Self {
        self.chunk_index = Some(index);
        self
    }

    /// Set the source path.
    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = path.into();
        self
    }

    /// Add topic keywords.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.extend(keywords.into_iter().map(Into::into));
        self
    }

    /// Parse a raw vector-store payload into a fragment.
    ///
    /// Returns `None` when the payload has no usable `text`. A missing or
    /// empty `source_id` becomes [`UNKNOWN_SOURCE`]; a missing `source_path`
    /// becomes the empty string. Keywords are read from `topic_keywords` or
    /// `keywords`; `chunk_index` may be a number or a numeric string. The
    /// `metadata` object, when present, becomes the fragment metadata.
    pub fn from_payload(payload: &Map<String, Value>, similarity_score: f32) -> Option<Self> {
        let text = payload.get("text").and_then(Value::as_str).filter(|t| !t.trim().is_empty())?;

        let source_id = payload.get("source_id").and_then(scalar_to_string).unwrap_or_default();
        let source_path = payload.get("source_path").and_then(scalar_to_string).unwrap_or_default();

        let chunk_index = payload.get("chunk_index").and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        let keywords = payload
            .get("topic_keywords")
            .or_else(|| payload.get("keywords"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let metadata = payload
            .get("metadata")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let mut fragment = Self::new(text, similarity_score, source_id);
        fragment.source_path = source_path;
        fragment.chunk_index = chunk_index;
        fragment.keywords = keywords;
        fragment.metadata = metadata;
        Some(fragment)
    }

    /// The score used for consolidation: the rerank score when present,
    /// otherwise the similarity score. Non-finite scores count as absent.
    pub fn effective_score(&self) -> Option<f32> {
        self.rerank_score
            .filter(|s| s.is_finite())
            .or_else(|| Some(self.similarity_score).filter(|s| s.is_finite()))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A consolidated, presentation-ready merge of same-source fragments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    /// Constituent fragment texts in fragment order, blank-line separated.
    pub text: String,
    /// The single source all constituents share.
    pub source_id: String,
    /// Path of the source, taken from the first constituent that has one.
    pub source_path: Option<String>,
    /// The collection of the first constituent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Estimated token count of the constituents.
    pub token_estimate: f32,
    /// Union of the constituents' keywords.
    pub keywords: BTreeSet<String>,
    /// Union of the constituents' metadata; earlier constituents win on conflict.
    pub metadata: HashMap<String, Value>,
    /// Number of fragments merged into this segment.
    pub member_fragment_count: usize,
    /// Aggregate relevance of the constituents.
    pub relevance_score: Option<f32>,
    /// Alias of `relevance_score` kept for consumers that read rerank scores.
    pub rerank_score: Option<f32>,
    /// Whether the scores are the neutral default rather than a real aggregate.
    pub score_is_defaulted: bool,
    /// Cosine similarity to the topic, set during diversity selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_similarity: Option<f32>,
}

impl Segment {
    /// Create an unscored segment holding a single block of text.
    pub fn new(text: impl Into<String>, source_id: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            token_estimate: crate::consolidate::estimate_tokens(&text),
            text,
            source_id: source_id.into(),
            source_path: None,
            collection: None,
            keywords: BTreeSet::new(),
            metadata: HashMap::new(),
            member_fragment_count: 1,
            relevance_score: None,
            rerank_score: None,
            score_is_defaulted: false,
            topic_similarity: None,
        }
    }

    /// Set both score fields.
    pub fn with_score(mut self, score: f32) -> Self {
        self.relevance_score = Some(score);
        self.rerank_score = Some(score);
        self
    }

    /// The score used for ranking, treating an absent score as zero.
    pub fn ranking_score(&self) -> f32 {
        self.relevance_score.or(self.rerank_score).unwrap_or(0.0)
    }
}

/// The output envelope of one optimized retrieval call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Identifier of the call, also recorded on its tracing span.
    pub request_id: Uuid,
    /// The topic the call retrieved content for.
    pub topic: String,
    /// Final segments in reading order.
    pub segments: Vec<Segment>,
    /// Fragments returned by all sub-queries before deduplication.
    pub total_retrieved: usize,
    /// Fragments left after deduplication.
    pub unique_retrieved: usize,
    /// Segments produced by consolidation.
    pub consolidated_count: usize,
    /// Segments returned to the caller.
    pub final_count: usize,
    /// When the call finished.
    pub completed_at: DateTime<Utc>,
}
