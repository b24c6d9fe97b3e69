//! Query planning: topic variations and query expansion.
//!
//! Both operations ask the [`TextGenerator`] for help and treat its answer
//! as untrusted input. Every failure path, including a well-formed but
//! useless answer, degrades to a deterministic alternative.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::generator::TextGenerator;
use crate::retry::RetryPolicy;

/// Words that mark a generated line as a question even without a `?`.
const INTERROGATIVES: &[&str] = &["how", "what", "why", "when", "where", "which", "who"];

/// Generated lines this short are never treated as questions.
const MIN_VARIATION_CHARS: usize = 10;

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]+|\d+[.)])\s*").expect("list marker pattern is valid")
});

/// Turns one topic into a set of query strings.
pub struct QueryPlanner {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    max_variations: usize,
    expansion_terms: usize,
}

impl QueryPlanner {
    /// Create a planner backed by `generator`.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        retry: RetryPolicy,
        max_variations: usize,
        expansion_terms: usize,
    ) -> Self {
        Self { generator, retry, max_variations, expansion_terms }
    }

    /// Ask the generator for distinct questions about different facets of `topic`.
    ///
    /// Falls back to [`fallback_variations`] when generation fails or no
    /// generated line looks like a question. Never fails.
    pub async fn generate_variations(&self, topic: &str) -> Vec<String> {
        let prompt = variations_prompt(topic);
        match self.retry.run("generate_variations", || self.generator.generate(&prompt)).await {
            Ok(response) => {
                let variations = parse_variations(&response, self.max_variations);
                if variations.is_empty() {
                    warn!(topic, "generator produced no usable variations, using templates");
                    fallback_variations(topic)
                } else {
                    debug!(count = variations.len(), "generated query variations");
                    variations
                }
            }
            Err(e) => {
                warn!(topic, error = %e, "variation generation failed, using templates");
                fallback_variations(topic)
            }
        }
    }

    /// Append generated related terms to `query`.
    ///
    /// Returns `query` unchanged when generation fails or yields no terms.
    pub async fn expand_query(&self, query: &str) -> String {
        let prompt = expansion_prompt(query, self.expansion_terms);
        match self.retry.run("expand_query", || self.generator.generate(&prompt)).await {
            Ok(response) => {
                let terms = parse_expansion_terms(&response, self.expansion_terms);
                if terms.is_empty() {
                    return query.to_string();
                }
                debug!(terms = terms.len(), "expanded query");
                format!("{query} {}", terms.join(" "))
            }
            Err(e) => {
                warn!(error = %e, "query expansion failed, using original query");
                query.to_string()
            }
        }
    }
}

/// The three templated variations used when generation is unavailable.
pub fn fallback_variations(topic: &str) -> Vec<String> {
    vec![format!("What is {topic}?"), format!("History of {topic}"), format!("Examples of {topic}")]
}

/// Keep the generated lines that look like genuine questions.
///
/// A line qualifies when, after trimming and removing a leading list marker,
/// it is longer than ten characters and contains `?` or an interrogative
/// word. Case-insensitive duplicates are dropped and at most `max` are kept.
pub fn parse_variations(response: &str, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    response
        .lines()
        .map(|line| LIST_MARKER.replace(line.trim(), "").trim().to_string())
        .filter(|line| line.chars().count() > MIN_VARIATION_CHARS && looks_like_question(line))
        .filter(|line| seen.insert(line.to_lowercase()))
        .take(max)
        .collect()
}

fn looks_like_question(line: &str) -> bool {
    line.contains('?')
        || line
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| INTERROGATIVES.iter().any(|q| word.eq_ignore_ascii_case(q)))
}

/// Split a generated term list into at most `cap` terms.
///
/// Comma-separated output is split on commas; otherwise on whitespace.
pub fn parse_expansion_terms(response: &str, cap: usize) -> Vec<String> {
    let response = response.trim();
    let terms: Vec<&str> = if response.contains(',') {
        response.split(',').collect()
    } else {
        response.split_whitespace().collect()
    };
    terms
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .take(cap)
        .map(str::to_string)
        .collect()
}

fn variations_prompt(topic: &str) -> String {
    format!(
        "I need to create comprehensive content about \"{topic}\".\n\n\
         Please generate 5-8 specific questions that would help retrieve diverse, \
         relevant content about different aspects of this topic.\n\n\
         Format as a simple list with one question per line.\n\
         For example, if the topic is \"Machine Learning\", your response might be:\n\
         What is machine learning?\n\
         How did machine learning algorithms evolve?\n\
         How is machine learning applied in healthcare?\n\
         What distinguishes machine learning from deep learning?\n\
         What are the ethical risks of machine learning systems?"
    )
}

fn expansion_prompt(query: &str, terms: usize) -> String {
    format!(
        "I need to expand this search query for a vector database lookup:\n\n\
         QUERY: {query}\n\n\
         Please generate around {terms} related terms, synonyms, and concepts that would \
         help improve retrieval.\n\
         Format the result as a comma-separated list of terms.\n\
         Focus on semantic relationships and domain-specific terminology.\n\
         Return ONLY the comma-separated terms without explanations or other text."
    )
}
