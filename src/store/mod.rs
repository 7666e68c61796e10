//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the capability the rest of the crate needs
//! from an embedding-backed nearest-neighbour database: named collections
//! of documents plus metadata, embedded by the store itself, queried by
//! text with optional metadata predicates.
//!
//! | Backend | Module | Persistence |
//! |---------|--------|-------------|
//! | `sqlite` | [`sqlite`] | One SQLite file per project |
//! | `memory` | [`memory`] | Process lifetime only |
//!
//! The backend is chosen once at startup by [`open_vector_store`].

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use crate::config::Config;
use crate::embedding::{self, cosine_similarity};
use crate::models::Document;

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// SQLite file name inside a project's vectors directory.
pub const STORE_FILE: &str = "collection.sqlite";

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("embedding error: {0}")]
    Embedding(String),
}

/// A document as handed to the store: text plus flat metadata.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl From<&Document> for Record {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            content: doc.content.clone(),
            metadata: doc.metadata(),
        }
    }
}

/// A query hit with its raw distance under the store's metric.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub id: String,
    pub content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub distance: f32,
}

/// Equality predicate on a metadata field.
#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub value: String,
}

/// Conjunction of metadata predicates evaluated by the store during a query.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub must: Vec<FieldCondition>,
}

impl MetadataFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            must: vec![FieldCondition {
                field: field.into(),
                value: value.into(),
            }],
        }
    }

    pub fn matches(&self, metadata: &serde_json::Map<String, serde_json::Value>) -> bool {
        self.must.iter().all(|cond| {
            metadata
                .get(&cond.field)
                .and_then(|v| v.as_str())
                .is_some_and(|v| v == cond.value)
        })
    }
}

/// How the store measures distance between a query and a stored vector.
///
/// Relevance is derived as `1 - distance`, which is only meaningful when
/// "similar" means a distance below 1. That holds for `cosine` over the
/// non-negative hashed embeddings and approximately for normalized model
/// embeddings; `l2` and `ip` are offered for stores tuned that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`, in `[0, 2]`.
    #[default]
    Cosine,
    /// Squared Euclidean distance.
    L2,
    /// `1 - a·b`.
    Ip,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::Ip => "ip",
        }
    }

    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
            DistanceMetric::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum(),
            DistanceMetric::Ip => 1.0 - a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>(),
        }
    }
}

/// Abstract embedding-backed vector database.
///
/// Implementations embed document and query text themselves; callers only
/// ever pass text and metadata.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent. Existing metadata is left as is.
    async fn ensure_collection(
        &self,
        name: &str,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), VectorStoreError>;

    /// Delete the collection and all its entries.
    ///
    /// Returns `true` if it existed. Absence is not an error.
    async fn delete_collection_if_exists(&self, name: &str) -> Result<bool, VectorStoreError>;

    /// Insert or replace records by id. The collection must exist.
    async fn upsert(&self, name: &str, records: &[Record]) -> Result<(), VectorStoreError>;

    /// Return up to `k` nearest records to `query`, closest first.
    ///
    /// `filter` is evaluated by the store before ranking, so `k` results are
    /// returned whenever at least `k` records match it.
    async fn query(
        &self,
        name: &str,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Neighbor>, VectorStoreError>;

    /// Number of records in the collection (0 if it does not exist).
    async fn count(&self, name: &str) -> Result<u64, VectorStoreError>;
}

/// Build the configured store backend for one project's storage directory.
///
/// Fails with an actionable message when the embedding backend cannot be
/// initialized (missing API key, feature not compiled in, ...).
pub async fn open_vector_store(config: &Config, storage_dir: &Path) -> Result<Box<dyn VectorStore>> {
    let embedder = embedding::create_embedder(&config.embedding)?;
    let metric = config.store.metric;

    match config.store.backend.as_str() {
        "sqlite" => {
            let store = SqliteVectorStore::open(&storage_dir.join(STORE_FILE), embedder, metric)
                .await?;
            Ok(Box::new(store))
        }
        "memory" => Ok(Box::new(InMemoryVectorStore::new(embedder, metric))),
        other => bail!("Unknown store backend: {}", other),
    }
}

/// Sort ascending by distance, ties by id, and keep the first `k`.
pub(crate) fn rank(mut neighbors: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    neighbors.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    neighbors.truncate(k);
    neighbors
}
