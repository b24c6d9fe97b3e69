//! Reading-order sequencing of the final segments.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::fragment::Segment;
use crate::generator::TextGenerator;
use crate::retry::RetryPolicy;

/// Score filled in for segments that reach the caller with no score at all.
pub const SEQUENCED_DEFAULT_SCORE: f32 = 0.75;

const SNIPPET_HEAD_WORDS: usize = 100;
const SNIPPET_TAIL_WORDS: usize = 50;
const SNIPPET_THRESHOLD_WORDS: usize = 150;

/// Reorders segments into a reading-friendly sequence chosen by a generator.
pub struct LogicalSequencer {
    generator: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
}

impl LogicalSequencer {
    pub fn new(generator: Arc<dyn TextGenerator>, retry: RetryPolicy) -> Self {
        Self { generator, retry }
    }

    /// Return `segments` in the order proposed by the generator.
    ///
    /// Any generation failure or invalid permutation leaves the input order
    /// untouched. The output always holds exactly the input segments, each
    /// with its scores filled in by [`ensure_scores`].
    pub async fn sequence(&self, topic: &str, mut segments: Vec<Segment>) -> Vec<Segment> {
        if segments.len() >= 2 {
            segments = self.reorder(topic, segments).await;
        }
        segments.iter_mut().for_each(ensure_scores);
        segments
    }

    async fn reorder(&self, topic: &str, segments: Vec<Segment>) -> Vec<Segment> {
        let prompt = sequencing_prompt(topic, &segments);
        let response =
            match self.retry.run("sequence_segments", || self.generator.generate(&prompt)).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "sequencing failed, keeping relevance order");
                    return segments;
                }
            };

        match parse_permutation(&response, segments.len()) {
            Some(order) => {
                debug!(?order, "applied reading order");
                apply_permutation(segments, &order)
            }
            None => {
                warn!(response = response.trim(), "invalid reading order, keeping relevance order");
                segments
            }
        }
    }
}

/// Parse a 1-based permutation of `1..=n` into 0-based indices.
///
/// Numbers may be separated by commas and/or whitespace. Returns `None`
/// unless every number of `1..=n` appears exactly once and nothing else does.
pub fn parse_permutation(response: &str, n: usize) -> Option<Vec<usize>> {
    let mut seen = vec![false; n];
    let mut order = Vec::with_capacity(n);

    for token in response.split(|c: char| c == ',' || c.is_whitespace()) {
        if token.is_empty() {
            continue;
        }
        let index = token.parse::<usize>().ok()?.checked_sub(1)?;
        if index >= n || std::mem::replace(&mut seen[index], true) {
            return None;
        }
        order.push(index);
    }

    (order.len() == n).then_some(order)
}

fn apply_permutation(segments: Vec<Segment>, order: &[usize]) -> Vec<Segment> {
    let mut slots: Vec<Option<Segment>> = segments.into_iter().map(Some).collect();
    order.iter().filter_map(|&i| slots[i].take()).collect()
}

/// The text shown to the generator for one segment: its first 100 words,
/// plus `...` and its last 50 words when it runs past 150 words.
pub fn build_snippet(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= SNIPPET_THRESHOLD_WORDS {
        return words[..words.len().min(SNIPPET_HEAD_WORDS)].join(" ");
    }
    let head = words[..SNIPPET_HEAD_WORDS].join(" ");
    let tail = words[words.len() - SNIPPET_TAIL_WORDS..].join(" ");
    format!("{head} ... {tail}")
}

/// Make sure both score fields are populated.
///
/// A missing field copies the other one; a segment with neither gets
/// [`SEQUENCED_DEFAULT_SCORE`].
pub fn ensure_scores(segment: &mut Segment) {
    match (segment.relevance_score, segment.rerank_score) {
        (None, None) => {
            segment.relevance_score = Some(SEQUENCED_DEFAULT_SCORE);
            segment.rerank_score = Some(SEQUENCED_DEFAULT_SCORE);
        }
        (Some(score), None) => segment.rerank_score = Some(score),
        (None, Some(score)) => segment.relevance_score = Some(score),
        (Some(_), Some(_)) => {}
    }
}

fn sequencing_prompt(topic: &str, segments: &[Segment]) -> String {
    let listing = segments
        .iter()
        .enumerate()
        .map(|(i, segment)| format!("Segment {}:\n{}", i + 1, build_snippet(&segment.text)))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "I have {count} content segments about \"{topic}\". Put them in the order a reader \
         should see them: foundational material first, then details, then advanced or \
         applied material.\n\n\
         {listing}\n\n\
         Return ONLY the segment numbers in the best reading order as a comma-separated \
         list, for example: 3,1,2",
        count = segments.len(),
    )
}
