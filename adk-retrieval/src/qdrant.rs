//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! # Example
//!
//! ```rust,ignore
//! use adk_retrieval::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334")?;
//! if store.exists("content_library").await? {
//!     let hits = store.search("content_library", &query_embedding, 20, 0.5).await?;
//! }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, Filter, ScrollPointsBuilder, SearchPointsBuilder, Value as QdrantValue,
};
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::error::{RetrievalError, Result};
use crate::fragment::Fragment;
use crate::vectorstore::VectorStore;

/// The default Qdrant gRPC URL.
pub const DEFAULT_URL: &str = "http://localhost:6334";

/// Points fetched per scroll page.
const SCROLL_PAGE_SIZE: u32 = 256;

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// Payloads are converted to JSON and parsed with
/// [`Fragment::from_payload`]; points without text are skipped.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Create a new Qdrant vector store with default URL (`http://localhost:6334`).
    pub fn default_url() -> Result<Self> {
        Self::new(DEFAULT_URL)
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RetrievalError {
        RetrievalError::VectorStore { backend: "qdrant".to_string(), message: e.to_string() }
    }
}

/// Convert a Qdrant payload into a JSON object.
fn payload_to_json(payload: HashMap<String, QdrantValue>) -> Map<String, Value> {
    payload.into_iter().map(|(k, v)| (k, value_to_json(v))).collect()
}

fn value_to_json(value: QdrantValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => Number::from_f64(d).map_or(Value::Null, Value::Number),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(payload_to_json(s.fields)),
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn exists(&self, collection: &str) -> Result<bool> {
        self.client.collection_exists(collection).await.map_err(Self::map_err)
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<Fragment>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, embedding.to_vec(), limit as u64)
                    .score_threshold(min_score)
                    .with_payload(true),
            )
            .await
            .map_err(Self::map_err)?;

        let fragments: Vec<Fragment> = response
            .result
            .into_iter()
            .filter_map(|scored| {
                Fragment::from_payload(&payload_to_json(scored.payload), scored.score)
            })
            .collect();

        debug!(collection, hits = fragments.len(), "qdrant search");
        Ok(fragments)
    }

    async fn fetch_source(&self, collection: &str, source_id: &str) -> Result<Vec<Fragment>> {
        let filter = Filter::must([Condition::matches("source_id", source_id.to_string())]);
        let mut fragments = Vec::new();
        let mut offset = None;

        loop {
            let mut request = ScrollPointsBuilder::new(collection)
                .filter(filter.clone())
                .limit(SCROLL_PAGE_SIZE)
                .with_payload(true)
                .with_vectors(false);
            if let Some(offset) = offset.take() {
                request = request.offset(offset);
            }

            let page = self.client.scroll(request).await.map_err(Self::map_err)?;
            fragments.extend(page.result.into_iter().filter_map(|point| {
                Fragment::from_payload(&payload_to_json(point.payload), 0.0)
            }));

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        debug!(collection, source_id, fragments = fragments.len(), "qdrant scroll");
        Ok(fragments)
    }
}
