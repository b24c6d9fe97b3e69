//! Configuration for the retrieval pipeline.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RetrievalError, Result};
use crate::retry::RetryPolicy;

/// The collection searched when none is configured.
pub const DEFAULT_COLLECTION: &str = "content_library";

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    /// Collections searched for every query. The first one is the primary collection.
    pub collections: Vec<String>,
    /// Result limit used when a caller does not supply one.
    pub default_limit: usize,
    /// Token budget for a consolidated segment.
    pub max_segment_tokens: usize,
    /// Minimum similarity score requested from the vector store.
    pub min_similarity: f32,
    /// Maximum number of expansion terms appended to a query.
    pub expansion_terms: usize,
    /// Maximum number of query variations kept from the generator.
    pub max_variations: usize,
    /// Number of texts per embedding request during diversity selection.
    pub embedding_batch_size: usize,
    /// Maximum number of concurrent sub-queries or embedding batches.
    pub max_concurrency: usize,
    /// Weight of topic similarity in the diversity composite key.
    pub relevance_weight: f32,
    /// Weight of the same-source redundancy penalty in the diversity composite key.
    pub redundancy_weight: f32,
    /// Retry and timeout policy for collaborator calls.
    pub retry: RetryPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collections: vec![DEFAULT_COLLECTION.to_string()],
            default_limit: 20,
            max_segment_tokens: 4000,
            min_similarity: 0.5,
            expansion_terms: 100,
            max_variations: 8,
            embedding_batch_size: 20,
            max_concurrency: 4,
            relevance_weight: 0.7,
            redundancy_weight: 0.3,
            retry: RetryPolicy::default(),
        }
    }
}

impl RetrievalConfig {
    /// Create a new builder for constructing a [`RetrievalConfig`].
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// Load configuration from process environment variables.
    ///
    /// See [`from_lookup`](Self::from_lookup) for the recognised variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Recognised keys: `COLLECTION_NAME`, `COLLECTIONS` (comma-separated),
    /// `DEFAULT_RESULT_LIMIT`, `MAX_CONSOLIDATED_TOKENS`, `MIN_SIMILARITY`,
    /// `EXPANSION_TERMS`, `EMBEDDING_BATCH_SIZE`, `MAX_CONCURRENCY`,
    /// `MAX_RETRIES`, `REQUEST_TIMEOUT_SECS`. Values that fail to parse are
    /// ignored with a warning and the default is kept.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if the resulting configuration is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Self::builder();

        let mut collections = Vec::new();
        if let Some(primary) = lookup("COLLECTION_NAME").filter(|v| !v.trim().is_empty()) {
            collections.push(primary.trim().to_string());
        }
        if let Some(extra) = lookup("COLLECTIONS") {
            for name in extra.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if !collections.iter().any(|c| c == name) {
                    collections.push(name.to_string());
                }
            }
        }
        if !collections.is_empty() {
            builder = builder.collections(collections);
        }

        builder = builder
            .default_limit(parse_or(&lookup, "DEFAULT_RESULT_LIMIT", defaults.default_limit))
            .max_segment_tokens(parse_or(
                &lookup,
                "MAX_CONSOLIDATED_TOKENS",
                defaults.max_segment_tokens,
            ))
            .min_similarity(parse_or(&lookup, "MIN_SIMILARITY", defaults.min_similarity))
            .expansion_terms(parse_or(&lookup, "EXPANSION_TERMS", defaults.expansion_terms))
            .embedding_batch_size(parse_or(
                &lookup,
                "EMBEDDING_BATCH_SIZE",
                defaults.embedding_batch_size,
            ))
            .max_concurrency(parse_or(&lookup, "MAX_CONCURRENCY", defaults.max_concurrency));

        let max_attempts = parse_or(&lookup, "MAX_RETRIES", defaults.retry.max_attempts);
        let timeout_secs =
            parse_or(&lookup, "REQUEST_TIMEOUT_SECS", defaults.retry.timeout.as_secs());
        let retry = defaults
            .retry
            .with_max_attempts(max_attempts)
            .with_timeout(Duration::from_secs(timeout_secs));

        builder.retry(retry).build()
    }

    /// The collection searched by single-collection operations.
    pub fn primary_collection(&self) -> &str {
        self.collections.first().map(String::as_str).unwrap_or(DEFAULT_COLLECTION)
    }
}

fn parse_or<T: FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparseable configuration value");
            default
        }),
        None => default,
    }
}

/// Builder for constructing a validated [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    /// Set the collections to search.
    pub fn collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.collections = collections.into_iter().map(Into::into).collect();
        self
    }

    /// Set the default result limit.
    pub fn default_limit(mut self, limit: usize) -> Self {
        self.config.default_limit = limit;
        self
    }

    /// Set the token budget for consolidated segments.
    pub fn max_segment_tokens(mut self, tokens: usize) -> Self {
        self.config.max_segment_tokens = tokens;
        self
    }

    /// Set the minimum similarity threshold for vector search.
    pub fn min_similarity(mut self, threshold: f32) -> Self {
        self.config.min_similarity = threshold;
        self
    }

    /// Set the maximum number of expansion terms.
    pub fn expansion_terms(mut self, terms: usize) -> Self {
        self.config.expansion_terms = terms;
        self
    }

    /// Set the maximum number of query variations.
    pub fn max_variations(mut self, variations: usize) -> Self {
        self.config.max_variations = variations;
        self
    }

    /// Set the embedding batch size used during diversity selection.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set the concurrency bound for sub-queries and embedding batches.
    pub fn max_concurrency(mut self, concurrency: usize) -> Self {
        self.config.max_concurrency = concurrency;
        self
    }

    /// Set the relevance and redundancy weights of the diversity composite key.
    pub fn diversity_weights(mut self, relevance: f32, redundancy: f32) -> Self {
        self.config.relevance_weight = relevance;
        self.config.redundancy_weight = redundancy;
        self
    }

    /// Set the retry policy applied to every collaborator call.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Build the [`RetrievalConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if:
    /// - `collections` is empty or contains a blank name
    /// - `max_segment_tokens`, `embedding_batch_size` or `max_concurrency` is zero
    /// - `min_similarity` or either diversity weight is not finite
    pub fn build(self) -> Result<RetrievalConfig> {
        let config = self.config;
        if config.collections.is_empty() {
            return Err(RetrievalError::Config("at least one collection is required".into()));
        }
        if config.collections.iter().any(|c| c.trim().is_empty()) {
            return Err(RetrievalError::Config("collection names must not be blank".into()));
        }
        if config.max_segment_tokens == 0 {
            return Err(RetrievalError::Config(
                "max_segment_tokens must be greater than zero".into(),
            ));
        }
        if config.embedding_batch_size == 0 {
            return Err(RetrievalError::Config(
                "embedding_batch_size must be greater than zero".into(),
            ));
        }
        if config.max_concurrency == 0 {
            return Err(RetrievalError::Config("max_concurrency must be greater than zero".into()));
        }
        if !config.min_similarity.is_finite() {
            return Err(RetrievalError::Config(format!(
                "min_similarity ({}) must be finite",
                config.min_similarity
            )));
        }
        if !config.relevance_weight.is_finite() || !config.redundancy_weight.is_finite() {
            return Err(RetrievalError::Config("diversity weights must be finite".into()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = RetrievalConfig::default();
        assert_eq!(config.collections, vec!["content_library".to_string()]);
        assert_eq!(config.max_segment_tokens, 4000);
        assert_eq!(config.default_limit, 20);
        assert_eq!(config.embedding_batch_size, 20);
        assert!((config.min_similarity - 0.5).abs() < f32::EPSILON);
        assert!((config.relevance_weight - 0.7).abs() < f32::EPSILON);
        assert!((config.redundancy_weight - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn builder_rejects_zero_budget() {
        let err = RetrievalConfig::builder().max_segment_tokens(0).build().unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));
    }

    #[test]
    fn builder_rejects_empty_collections() {
        let err = RetrievalConfig::builder().collections(Vec::<String>::new()).build().unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));
    }

    #[test]
    fn builder_rejects_nan_threshold() {
        assert!(RetrievalConfig::builder().min_similarity(f32::NAN).build().is_err());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = RetrievalConfig::from_lookup(lookup_from(&[
            ("COLLECTION_NAME", "papers"),
            ("COLLECTIONS", "papers, notes ,,blogs"),
            ("MAX_CONSOLIDATED_TOKENS", "1200"),
            ("DEFAULT_RESULT_LIMIT", "7"),
            ("REQUEST_TIMEOUT_SECS", "15"),
            ("MAX_RETRIES", "5"),
        ]))
        .unwrap();

        assert_eq!(config.collections, vec!["papers", "notes", "blogs"]);
        assert_eq!(config.primary_collection(), "papers");
        assert_eq!(config.max_segment_tokens, 1200);
        assert_eq!(config.default_limit, 7);
        assert_eq!(config.retry.timeout, Duration::from_secs(15));
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn unparseable_values_keep_defaults() {
        let config =
            RetrievalConfig::from_lookup(lookup_from(&[("MAX_CONSOLIDATED_TOKENS", "lots")]))
                .unwrap();
        assert_eq!(config.max_segment_tokens, 4000);
    }

    #[test]
    fn empty_lookup_keeps_retry_defaults() {
        let config = RetrievalConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config, RetrievalConfig::default());
    }
}
