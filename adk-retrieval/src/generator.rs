//! Text generation trait used for query planning and sequencing.

use async_trait::async_trait;

use crate::error::Result;

/// A free-form text generator (usually an LLM).
///
/// The pipeline builds every prompt and validates every response itself;
/// implementations only move text back and forth.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
