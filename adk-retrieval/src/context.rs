//! Per-call retrieval context.
//!
//! Each pipeline call owns one [`RetrievalContext`]. Stages record their
//! cardinalities on it and the context is folded into the returned
//! [`RetrievalResult`], so nothing is accumulated in shared state.

use chrono::Utc;
use tracing::{Span, info_span};
use uuid::Uuid;

use crate::fragment::{RetrievalResult, Segment};

/// Working state for a single retrieval call.
#[derive(Debug)]
pub struct RetrievalContext {
    request_id: Uuid,
    topic: String,
    span: Span,
    /// Fragments returned by all sub-queries before deduplication.
    pub total_retrieved: usize,
    /// Fragments left after deduplication.
    pub unique_retrieved: usize,
    /// Segments produced by consolidation.
    pub consolidated_count: usize,
}

impl RetrievalContext {
    /// Start a new context for `topic` with a fresh request id.
    pub fn new(topic: &str) -> Self {
        let request_id = Uuid::new_v4();
        let span = info_span!("retrieval", %request_id, topic);
        Self {
            request_id,
            topic: topic.to_string(),
            span,
            total_retrieved: 0,
            unique_retrieved: 0,
            consolidated_count: 0,
        }
    }

    /// The identifier of this call.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The topic of this call.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The tracing span all stage logs of this call are recorded under.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Finish the call, producing the result envelope.
    pub fn finish(self, segments: Vec<Segment>) -> RetrievalResult {
        RetrievalResult {
            request_id: self.request_id,
            final_count: segments.len(),
            topic: self.topic,
            segments,
            total_retrieved: self.total_retrieved,
            unique_retrieved: self.unique_retrieved,
            consolidated_count: self.consolidated_count,
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_carries_counters_and_identity() {
        let mut ctx = RetrievalContext::new("ownership");
        ctx.total_retrieved = 9;
        ctx.unique_retrieved = 6;
        ctx.consolidated_count = 4;
        let id = ctx.request_id();

        let result = ctx.finish(vec![Segment::new("a", "s1"), Segment::new("b", "s2")]);
        assert_eq!(result.request_id, id);
        assert_eq!(result.topic, "ownership");
        assert_eq!(
            (result.total_retrieved, result.unique_retrieved, result.consolidated_count),
            (9, 6, 4)
        );
        assert_eq!(result.final_count, 2);
    }

    #[test]
    fn each_call_gets_a_fresh_request_id() {
        let first = RetrievalContext::new("t").request_id();
        assert_ne!(first, RetrievalContext::new("t").request_id());
    }
}
