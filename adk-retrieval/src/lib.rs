//! Retrieval optimization for Rust Agent Development Kit (ADK-Rust) agents.
//!
//! Turns one topic string into a bounded, deduplicated, source-diverse and
//! logically ordered set of content segments, using only a vector search
//! capability and a text generation capability as building blocks.
//!
//! The [`RetrievalPipeline`] runs these stages in order:
//!
//! 1. [`planner`]: generate topic variations and expand each query.
//! 2. [`orchestrator`]: search every collection with every query, then
//!    rerank the merged pool.
//! 3. [`dedup`]: drop exact and near-duplicate fragments.
//! 4. [`consolidate`]: merge same-source fragments into token-budgeted segments.
//! 5. [`diversity`]: keep the most relevant segments while limiting
//!    same-source redundancy.
//! 6. [`sequencer`]: put the selection into reading order.
//!
//! Every stage degrades to a deterministic fallback when a collaborator
//! fails, so retrieval calls always return a well-formed result.
//!
//! # Features
//!
//! - `jina`: Jina embeddings and reranker
//! - `gemini`: Gemini text generator
//! - `openai`: OpenAI embeddings and text generator
//! - `qdrant`: Qdrant vector store
//! - `full`: all of the above

pub mod config;
pub mod consolidate;
pub mod context;
pub mod dedup;
pub mod diversity;
pub mod embedding;
pub mod error;
pub mod fragment;
pub mod generator;
pub mod inmemory;
pub mod orchestrator;
pub mod pipeline;
pub mod planner;
pub mod reranker;
pub mod retry;
pub mod sequencer;
pub mod vectorstore;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "jina")]
pub mod jina;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use config::{DEFAULT_COLLECTION, RetrievalConfig, RetrievalConfigBuilder};
pub use context::RetrievalContext;
pub use embedding::{EmbeddingIntent, EmbeddingProvider, cosine_similarity};
pub use error::{Result, RetrievalError};
pub use fragment::{Fragment, RetrievalResult, Segment, UNKNOWN_SOURCE};
pub use generator::TextGenerator;
pub use inmemory::{InMemoryVectorStore, IndexedPoint};
pub use pipeline::{RetrievalPipeline, RetrievalPipelineBuilder};
pub use reranker::{RerankHit, Reranker};
pub use retry::RetryPolicy;
pub use vectorstore::VectorStore;
