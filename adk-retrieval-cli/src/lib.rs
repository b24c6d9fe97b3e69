//! Command-line launcher for optimized retrieval.
//!
//! Loads configuration from the environment (and a `.env` file), wires the
//! Qdrant store with Jina or OpenAI embeddings, a Gemini or OpenAI text
//! generator and an optional Jina reranker, then prints results as JSON.

use std::collections::HashMap;
use std::sync::Arc;

use adk_retrieval::gemini::GeminiTextGenerator;
use adk_retrieval::jina::{JinaEmbeddingProvider, JinaReranker};
use adk_retrieval::openai::{OpenAIEmbeddingProvider, OpenAITextGenerator};
use adk_retrieval::qdrant::{self, QdrantVectorStore};
use adk_retrieval::{
    EmbeddingProvider, Reranker, RetrievalConfig, RetrievalPipeline, TextGenerator,
};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "adk-retrieve", version, about = "Optimized retrieval over Qdrant collections")]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,

    /// Qdrant gRPC URL.
    #[arg(long, env = "QDRANT_URL", default_value = qdrant::DEFAULT_URL, global = true)]
    pub qdrant_url: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Retrieve deduplicated, diverse and ordered segments about a topic.
    Retrieve {
        #[arg(long)]
        topic: String,
        /// Defaults to DEFAULT_RESULT_LIMIT.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run a single vector search without planning or consolidation.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        /// Search only this collection instead of all configured ones.
        #[arg(long)]
        collection: Option<String>,
    },
    /// Retrieve segments and keep those matching every filter.
    Filter {
        #[arg(long)]
        query: String,
        /// KEY=VALUE; VALUE is parsed as JSON when possible.
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, Value)>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print every fragment of one source in chunk order.
    Source {
        #[arg(long)]
        collection: String,
        #[arg(long)]
        source_id: String,
    },
    /// Check whether a collection exists.
    Check {
        /// Defaults to the primary configured collection.
        #[arg(long)]
        collection: Option<String>,
    },
}

/// Parse a `KEY=VALUE` filter argument.
pub fn parse_filter(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) =
        raw.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty filter key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Build the log filter from `RUST_LOG`, else `LOG_LEVEL`, else `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global tracing subscriber. Logs go to stderr so stdout stays JSON.
pub fn init_tracing(json: bool) {
    let builder =
        tracing_subscriber::fmt().with_env_filter(env_filter()).with_writer(std::io::stderr);
    if json {
        builder.json().with_target(true).init();
    } else {
        builder.with_target(false).init();
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn embedding_provider() -> Result<Arc<dyn EmbeddingProvider>> {
    if let Some(key) = env_var("JINA_API_KEY") {
        let mut provider = JinaEmbeddingProvider::new(key)?;
        if let Some(model) = env_var("JINA_EMBEDDING_MODEL") {
            provider = provider.with_model(model);
        }
        return Ok(Arc::new(provider));
    }
    if let Some(key) = env_var("OPENAI_API_KEY") {
        return Ok(Arc::new(OpenAIEmbeddingProvider::new(key)?));
    }
    bail!("set JINA_API_KEY or OPENAI_API_KEY to choose an embedding provider")
}

fn text_generator() -> Result<Arc<dyn TextGenerator>> {
    if let Some(key) = env_var("GEMINI_API_KEY") {
        let mut generator = GeminiTextGenerator::new(key)?;
        if let Some(model) = env_var("GEMINI_MODEL") {
            generator = generator.with_model(model);
        }
        return Ok(Arc::new(generator));
    }
    if let Some(key) = env_var("OPENAI_API_KEY") {
        return Ok(Arc::new(OpenAITextGenerator::new(key)?));
    }
    bail!("set GEMINI_API_KEY or OPENAI_API_KEY to choose a text generator")
}

fn reranker() -> Result<Option<Arc<dyn Reranker>>> {
    let Some(key) = env_var("JINA_API_KEY") else {
        return Ok(None);
    };
    let mut reranker = JinaReranker::new(key)?;
    if let Some(model) = env_var("JINA_RERANKER_MODEL") {
        reranker = reranker.with_model(model);
    }
    Ok(Some(Arc::new(reranker)))
}

/// Wire the pipeline from environment credentials.
pub fn build_pipeline(config: RetrievalConfig, qdrant_url: &str) -> Result<RetrievalPipeline> {
    let store = QdrantVectorStore::new(qdrant_url)
        .with_context(|| format!("failed to create Qdrant client for {qdrant_url}"))?;

    let mut builder = RetrievalPipeline::builder()
        .config(config)
        .vector_store(Arc::new(store))
        .embedding_provider(embedding_provider()?)
        .text_generator(text_generator()?);
    if let Some(reranker) = reranker()? {
        builder = builder.reranker(reranker);
    }
    Ok(builder.build()?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute one parsed command.
pub async fn run(cli: Cli) -> Result<()> {
    let config = RetrievalConfig::from_env().context("invalid retrieval configuration")?;
    let pipeline = build_pipeline(config, &cli.qdrant_url)?;
    let default_limit = pipeline.config().default_limit;

    match cli.command {
        Command::Retrieve { topic, limit } => {
            let result = pipeline.retrieve_optimized(&topic, limit.unwrap_or(default_limit)).await;
            info!(request_id = %result.request_id, segments = result.final_count, "done");
            print_json(&result)
        }
        Command::Search { query, limit, collection } => {
            let limit = limit.unwrap_or(default_limit);
            let fragments = match collection {
                Some(collection) => pipeline.search_collection(&collection, &query, limit).await,
                None => pipeline.search(&query, limit).await,
            };
            print_json(&fragments)
        }
        Command::Filter { query, filters, limit } => {
            let filters: HashMap<String, Value> = filters.into_iter().collect();
            let segments =
                pipeline.filter_search(&query, &filters, limit.unwrap_or(default_limit)).await;
            print_json(&segments)
        }
        Command::Source { collection, source_id } => {
            print_json(&pipeline.source_content(&collection, &source_id).await)
        }
        Command::Check { collection } => {
            let collection =
                collection.unwrap_or_else(|| pipeline.config().primary_collection().to_string());
            let exists = pipeline.check_collection(&collection).await;
            print_json(&json!({ "collection": collection, "exists": exists }))
        }
    }
}
