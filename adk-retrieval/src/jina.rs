//! Jina AI embedding provider and reranker.
//!
//! This module is only available when the `jina` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use adk_retrieval::jina::{JinaEmbeddingProvider, JinaReranker};
//!
//! let embedder = JinaEmbeddingProvider::from_env()?;
//! let reranker = JinaReranker::from_env()?;
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::{EmbeddingIntent, EmbeddingProvider};
use crate::error::{RetrievalError, Result, http_status_error};
use crate::reranker::{RerankHit, Reranker};

/// The Jina embeddings API endpoint.
const JINA_EMBEDDINGS_URL: &str = "https://api.jina.ai/v1/embeddings";

/// The Jina rerank API endpoint.
const JINA_RERANK_URL: &str = "https://api.jina.ai/v1/rerank";

/// The default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "jina-embeddings-v3";

/// The default reranker model.
pub const DEFAULT_RERANKER_MODEL: &str = "jina-reranker-v2-base-multilingual";

const PROVIDER: &str = "Jina";

fn api_key_from_env() -> std::result::Result<String, String> {
    std::env::var("JINA_API_KEY").map_err(|_| "JINA_API_KEY environment variable not set".into())
}

/// The Jina task name for an embedding intent.
fn task_for(intent: EmbeddingIntent) -> &'static str {
    match intent {
        EmbeddingIntent::Query => "retrieval.query",
        EmbeddingIntent::Passage => "retrieval.passage",
    }
}

/// An [`EmbeddingProvider`] backed by the Jina embeddings API.
///
/// Query and passage embeddings use the `retrieval.query` and
/// `retrieval.passage` tasks of the asymmetric `jina-embeddings-v3` model.
pub struct JinaEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl JinaEmbeddingProvider {
    /// Create a new provider with the given API key and the default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(embedding_error("API key must not be empty".into()));
        }
        Ok(Self { client: reqwest::Client::new(), api_key, model: DEFAULT_EMBEDDING_MODEL.into() })
    }

    /// Create a new provider using the `JINA_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env().map_err(embedding_error)?)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// A [`Reranker`] backed by the Jina rerank API.
pub struct JinaReranker {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl JinaReranker {
    /// Create a new reranker with the given API key and the default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(reranker_error("API key must not be empty".into()));
        }
        Ok(Self { client: reqwest::Client::new(), api_key, model: DEFAULT_RERANKER_MODEL.into() })
    }

    /// Create a new reranker using the `JINA_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env().map_err(reranker_error)?)
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

// ── Jina API request/response types ────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    task: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [&'a str],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
    #[serde(default)]
    document: Option<RerankDocument>,
}

#[derive(Deserialize)]
struct RerankDocument {
    text: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    detail: String,
}

fn embedding_error(message: String) -> RetrievalError {
    RetrievalError::Embedding { provider: PROVIDER.into(), message }
}

fn reranker_error(message: String) -> RetrievalError {
    RetrievalError::Reranker { reranker: PROVIDER.into(), message }
}

/// POST `body` to `url` and decode the JSON reply, mapping failures with `wrap`.
async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &B,
    wrap: fn(String) -> RetrievalError,
) -> Result<R>
where
    B: Serialize,
    R: DeserializeOwned,
{
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .header(reqwest::header::ACCEPT, "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| {
            error!(provider = PROVIDER, error = %e, "request failed");
            wrap(format!("request failed: {e}"))
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.detail).unwrap_or(body);

        error!(provider = PROVIDER, %status, "API error");
        let message = format!("API returned {status}: {detail}");
        return Err(http_status_error(PROVIDER, status.as_u16(), message, wrap));
    }

    response.json().await.map_err(|e| {
        error!(provider = PROVIDER, error = %e, "failed to parse response");
        RetrievalError::MalformedResponse(format!("{PROVIDER} response: {e}"))
    })
}

/// Turn rerank results into hits, dropping out-of-range indices.
fn into_hits(results: Vec<RerankResult>, documents: &[&str]) -> Vec<RerankHit> {
    results
        .into_iter()
        .filter(|r| r.index < documents.len())
        .enumerate()
        .map(|(rank, r)| RerankHit {
            index: r.index,
            text: r.document.map(|d| d.text).unwrap_or_else(|| documents[r.index].to_string()),
            relevance_score: r.relevance_score,
            rank,
        })
        .collect()
}

// ── Trait implementations ──────────────────────────────────────────

#[async_trait]
impl EmbeddingProvider for JinaEmbeddingProvider {
    async fn embed(&self, texts: &[&str], intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            %intent,
            "embedding batch"
        );

        let request = EmbeddingRequest { model: &self.model, task: task_for(intent), input: texts };
        let response: EmbeddingResponse =
            post_json(&self.client, JINA_EMBEDDINGS_URL, &self.api_key, &request, embedding_error)
                .await?;

        let mut data = response.data;
        if data.len() != texts.len() {
            return Err(RetrievalError::MalformedResponse(format!(
                "{PROVIDER} returned {} embeddings for {} inputs",
                data.len(),
                texts.len()
            )));
        }
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Reranker for JinaReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[&str],
        top_n: usize,
    ) -> Result<Vec<RerankHit>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let top_n = top_n.clamp(1, documents.len());
        debug!(
            provider = PROVIDER,
            documents = documents.len(),
            top_n,
            model = %self.model,
            "reranking"
        );

        let request = RerankRequest { model: &self.model, query, documents, top_n };
        let response: RerankResponse =
            post_json(&self.client, JINA_RERANK_URL, &self.api_key, &request, reranker_error)
                .await?;

        Ok(into_hits(response.results, documents))
    }
}
