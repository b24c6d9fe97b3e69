//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a zero-dependency vector store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and small corpora.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::{RetrievalError, Result};
use crate::fragment::Fragment;
use crate::vectorstore::VectorStore;

const BACKEND: &str = "InMemory";

/// A stored vector together with its raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPoint {
    /// Unique point identifier within its collection.
    pub id: String,
    /// The stored vector.
    pub embedding: Vec<f32>,
    /// The raw payload, parsed into a [`Fragment`] on retrieval.
    pub payload: Map<String, Value>,
}

impl IndexedPoint {
    /// Create a point with an empty payload.
    pub fn new(id: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self { id: id.into(), embedding, payload: Map::new() }
    }

    /// Set one payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Replace the whole payload.
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }
}

/// An in-memory vector store using cosine similarity for search.
///
/// Collections are stored as nested `HashMap`s: collection name → point ID → point.
/// All operations are async-safe via `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use adk_retrieval::{IndexedPoint, InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs").await;
/// store.upsert("docs", vec![
///     IndexedPoint::new("p1", vec![0.1, 0.9])
///         .with_field("text", "hello")
///         .with_field("source_id", "a"),
/// ]).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, HashMap<String, IndexedPoint>>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection if it does not exist yet.
    pub async fn create_collection(&self, name: &str) {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default();
    }

    /// Remove a collection and all its points.
    pub async fn delete_collection(&self, name: &str) {
        let mut collections = self.collections.write().await;
        collections.remove(name);
    }

    /// Insert or replace points by id.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::VectorStore`] if the collection does not exist.
    pub async fn upsert(&self, collection: &str, points: Vec<IndexedPoint>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        for point in points {
            store.insert(point.id.clone(), point);
        }
        Ok(())
    }
}

fn missing(collection: &str) -> RetrievalError {
    RetrievalError::VectorStore {
        backend: BACKEND.to_string(),
        message: format!("collection '{collection}' does not exist"),
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(collection))
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<Fragment>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut scored: Vec<Fragment> = store
            .values()
            .filter_map(|point| {
                let score = cosine_similarity(&point.embedding, embedding);
                if score < min_score {
                    return None;
                }
                Fragment::from_payload(&point.payload, score)
            })
            .collect();

        scored.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn fetch_source(&self, collection: &str, source_id: &str) -> Result<Vec<Fragment>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        Ok(store
            .values()
            .filter_map(|point| Fragment::from_payload(&point.payload, 0.0))
            .filter(|fragment| fragment.source_id == source_id)
            .collect())
    }
}
