//! Source grouping and token-budgeted consolidation.
//!
//! Individual fragments are often too small to carry meaning on their own.
//! Fragments from the same source are grouped, put back in source order, and
//! merged left to right into [`Segment`]s that stay within a token budget.

use std::collections::HashMap;

use crate::fragment::{Fragment, Segment};

/// Approximate tokens per whitespace-separated word.
pub const TOKENS_PER_WORD: f32 = 1.3;

/// Score given to a segment none of whose fragments carried a score.
pub const DEFAULT_SEGMENT_SCORE: f32 = 0.5;

/// Separator placed between merged fragment texts.
pub const SEGMENT_SEPARATOR: &str = "\n\n";

/// Estimate the token cost of `text` without a tokenizer.
pub fn estimate_tokens(text: &str) -> f32 {
    text.split_whitespace().count() as f32 * TOKENS_PER_WORD
}

/// Fragments of one source, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceGroup {
    /// The shared source identifier.
    pub source_id: String,
    /// The fragments of that source.
    pub fragments: Vec<Fragment>,
}

/// Partition fragments by `source_id`.
///
/// Groups appear in order of their source's first fragment. Within a group,
/// fragments are stably sorted by `chunk_index`. A fragment without an index
/// sorts as index zero, ahead of later chunks, and ties keep arrival order.
pub fn group_by_source(fragments: Vec<Fragment>) -> Vec<SourceGroup> {
    let mut groups: Vec<SourceGroup> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for fragment in fragments {
        match positions.get(&fragment.source_id) {
            Some(&idx) => groups[idx].fragments.push(fragment),
            None => {
                positions.insert(fragment.source_id.clone(), groups.len());
                groups.push(SourceGroup {
                    source_id: fragment.source_id.clone(),
                    fragments: vec![fragment],
                });
            }
        }
    }

    for group in &mut groups {
        group.fragments.sort_by_key(|f| f.chunk_index.unwrap_or(0));
    }
    groups
}

/// Merge each group's fragments into segments of at most `max_tokens`.
///
/// A single pass keeps a running segment per group. When the next fragment
/// would push a non-empty running segment over the budget, the running
/// segment is closed and a new one starts with that fragment. A fragment
/// that alone exceeds the budget becomes a segment of its own; fragments are
/// never split.
pub fn consolidate(groups: Vec<SourceGroup>, max_tokens: usize) -> Vec<Segment> {
    let budget = max_tokens as f32;
    let mut segments = Vec::new();

    for group in groups {
        let mut running = RunningSegment::new(&group.source_id);
        for fragment in group.fragments {
            let tokens = estimate_tokens(&fragment.text);
            if !running.is_empty() && running.segment.token_estimate + tokens > budget {
                let full = std::mem::replace(&mut running, RunningSegment::new(&group.source_id));
                segments.push(full.finish());
            }
            running.push(fragment, tokens);
        }
        if !running.is_empty() {
            segments.push(running.finish());
        }
    }

    segments
}

struct RunningSegment {
    segment: Segment,
    scores: Vec<f32>,
}

impl RunningSegment {
    fn new(source_id: &str) -> Self {
        let mut segment = Segment::new(String::new(), source_id);
        segment.member_fragment_count = 0;
        segment.token_estimate = 0.0;
        Self { segment, scores: Vec::new() }
    }

    fn is_empty(&self) -> bool {
        self.segment.member_fragment_count == 0
    }

    fn push(&mut self, fragment: Fragment, tokens: f32) {
        let segment = &mut self.segment;
        if !segment.text.is_empty() {
            segment.text.push_str(SEGMENT_SEPARATOR);
        }
        segment.text.push_str(&fragment.text);
        segment.member_fragment_count += 1;
        segment.token_estimate += tokens;

        if let Some(score) = fragment.effective_score() {
            self.scores.push(score);
        }
        segment.keywords.extend(fragment.keywords);
        for (key, value) in fragment.metadata {
            segment.metadata.entry(key).or_insert(value);
        }
        if segment.source_path.is_none() && !fragment.source_path.is_empty() {
            segment.source_path = Some(fragment.source_path);
        }
        if segment.collection.is_none() {
            segment.collection = fragment.collection;
        }
    }

    fn finish(self) -> Segment {
        let mut segment = self.segment;

        let score = if self.scores.is_empty() {
            segment.score_is_defaulted = true;
            DEFAULT_SEGMENT_SCORE
        } else {
            let sum: f64 = self.scores.iter().map(|&s| f64::from(s)).sum();
            (sum / self.scores.len() as f64) as f32
        };
        segment.relevance_score = Some(score);
        segment.rerank_score = Some(score);
        segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn token_estimate_uses_word_count() {
        assert!((estimate_tokens("one two  three\nfour") - 5.2).abs() < 1e-4);
        assert_eq!(estimate_tokens("   "), 0.0);
    }

    #[test]
    fn groups_in_first_seen_order_and_sorts_by_chunk_index() {
        let groups = group_by_source(vec![
            Fragment::new("b2", 0.5, "b").with_chunk_index(2),
            Fragment::new("a", 0.5, "a"),
            Fragment::new("b-none", 0.5, "b"),
            Fragment::new("b0", 0.5, "b").with_chunk_index(0),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].source_id, "b");
        let order: Vec<&str> = groups[0].fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(order, vec!["b-none", "b0", "b2"]);
    }

    #[test]
    fn unindexed_fragment_leads_its_source() {
        let groups = group_by_source(vec![
            Fragment::new("intro", 0.5, "c"),
            Fragment::new("c1", 0.5, "c").with_chunk_index(1),
            Fragment::new("c0", 0.5, "c").with_chunk_index(0),
        ]);
        let order: Vec<&str> = groups[0].fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(order, vec!["intro", "c0", "c1"]);
    }

    #[test]
    fn one_segment_per_source_with_mean_scores() {
        let fragments = [("A", 0.9), ("A", 0.85), ("B", 0.3), ("C", 0.7), ("C", 0.6)]
            .into_iter()
            .enumerate()
            .map(|(i, (source, score))| {
                Fragment::new(format!("fragment {i}"), score, source).with_chunk_index(i as u64)
            })
            .collect();
        let segments = consolidate(group_by_source(fragments), 4000);

        assert_eq!(segments.len(), 3);
        let scores: Vec<(&str, f32)> = segments
            .iter()
            .map(|s| (s.source_id.as_str(), s.relevance_score.unwrap()))
            .collect();
        let expected = [("A", 0.875), ("B", 0.3), ("C", 0.65)];
        for ((source, score), (want_source, want_score)) in scores.into_iter().zip(expected) {
            assert_eq!(source, want_source);
            assert!((score - want_score).abs() < 1e-6, "{source}: {score}");
        }
    }

    #[test]
    fn merges_same_source_within_budget() {
        let groups = group_by_source(vec![
            Fragment::new("first part", 0.9, "a").with_chunk_index(0).with_keywords(["x"]),
            Fragment::new("second part", 0.85, "a").with_chunk_index(1).with_keywords(["y"]),
        ]);
        let segments = consolidate(groups, 1000);
        assert_eq!(segments.len(), 1);
        let segment = &segments[0];
        assert_eq!(segment.text, "first part\n\nsecond part");
        assert_eq!(segment.member_fragment_count, 2);
        assert_eq!(segment.keywords.len(), 2);
        assert!((segment.relevance_score.unwrap() - 0.875).abs() < 1e-6);
        assert_eq!(segment.rerank_score, segment.relevance_score);
        assert!(!segment.score_is_defaulted);
    }

    #[test]
    fn splits_when_budget_would_be_exceeded() {
        // 10 words = 13 tokens each; budget 30 fits two.
        let fragments = (0..5)
            .map(|i| Fragment::new(words(10), 0.5, "a").with_chunk_index(i))
            .collect();
        let segments = consolidate(group_by_source(fragments), 30);
        let counts: Vec<usize> = segments.iter().map(|s| s.member_fragment_count).collect();
        assert_eq!(counts, vec![2, 2, 1]);
        assert!(segments.iter().all(|s| s.token_estimate <= 30.0));
    }

    #[test]
    fn oversized_fragment_stands_alone() {
        let fragments = vec![
            Fragment::new(words(5), 0.5, "a").with_chunk_index(0),
            Fragment::new(words(100), 0.5, "a").with_chunk_index(1),
            Fragment::new(words(5), 0.5, "a").with_chunk_index(2),
        ];
        let segments = consolidate(group_by_source(fragments), 20);
        let counts: Vec<usize> = segments.iter().map(|s| s.member_fragment_count).collect();
        assert_eq!(counts, vec![1, 1, 1]);
        assert!(segments[1].token_estimate > 20.0);
    }

    #[test]
    fn unscored_segment_gets_flagged_default() {
        let fragments = vec![Fragment::new("lonely", f32::NAN, "a")];
        let segments = consolidate(group_by_source(fragments), 100);
        assert_eq!(segments[0].relevance_score, Some(DEFAULT_SEGMENT_SCORE));
        assert!(segments[0].score_is_defaulted);
    }

    #[test]
    fn keeps_first_source_path() {
        let fragments = vec![
            Fragment::new("one", 0.5, "a"),
            Fragment::new("two", 0.5, "a").with_source_path("docs/a.md"),
            Fragment::new("three", 0.5, "a").with_source_path("docs/other.md"),
        ];
        let segments = consolidate(group_by_source(fragments), 100);
        assert_eq!(segments[0].source_path.as_deref(), Some("docs/a.md"));
    }
}
