//! In-memory [`VectorStore`] implementation.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Search is a
//! brute-force scan over the entries that pass the filter. Nothing survives
//! the process, which makes this backend useful for tests and dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::Embedder;

use super::{rank, DistanceMetric, MetadataFilter, Neighbor, Record, VectorStore, VectorStoreError};

struct StoredEntry {
    content: String,
    metadata: serde_json::Map<String, serde_json::Value>,
    vector: Vec<f32>,
}

#[derive(Default)]
struct StoredCollection {
    _metadata: serde_json::Map<String, serde_json::Value>,
    entries: BTreeMap<String, StoredEntry>,
}

pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, StoredCollection>>,
    embedder: Box<dyn Embedder>,
    metric: DistanceMetric,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Box<dyn Embedder>, metric: DistanceMetric) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            embedder,
            metric,
        }
    }
}

fn poisoned<T>(_: T) -> VectorStoreError {
    VectorStoreError::Connection("in-memory store lock poisoned".into())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(
        &self,
        name: &str,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        collections
            .entry(name.to_string())
            .or_insert_with(|| StoredCollection {
                _metadata: metadata.clone(),
                entries: BTreeMap::new(),
            });
        Ok(())
    }

    async fn delete_collection_if_exists(&self, name: &str) -> Result<bool, VectorStoreError> {
        let mut collections = self.collections.write().map_err(poisoned)?;
        Ok(collections.remove(name).is_some())
    }

    async fn upsert(&self, name: &str, records: &[Record]) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let exists = {
            let collections = self.collections.read().map_err(poisoned)?;
            collections.contains_key(name)
        };
        if !exists {
            return Err(VectorStoreError::Upsert(format!(
                "collection {} not found",
                name
            )));
        }

        // Embed outside the lock; the guard is not Send across the await.
        let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| VectorStoreError::Embedding(format!("{:#}", e)))?;
        if vectors.len() != records.len() {
            return Err(VectorStoreError::Embedding(format!(
                "expected {} vectors from {}, got {}",
                records.len(),
                self.embedder.model_name(),
                vectors.len()
            )));
        }

        let mut collections = self.collections.write().map_err(poisoned)?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| VectorStoreError::Upsert(format!("collection {} not found", name)))?;
        for (record, vector) in records.iter().zip(vectors) {
            collection.entries.insert(
                record.id.clone(),
                StoredEntry {
                    content: record.content.clone(),
                    metadata: record.metadata.clone(),
                    vector,
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Neighbor>, VectorStoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| VectorStoreError::Embedding(format!("{:#}", e)))?
            .into_iter()
            .next()
            .unwrap_or_default();

        let collections = self.collections.read().map_err(poisoned)?;
        let Some(collection) = collections.get(name) else {
            return Ok(Vec::new());
        };

        let neighbors = collection
            .entries
            .iter()
            .filter(|(_, e)| filter.map_or(true, |f| f.matches(&e.metadata)))
            .map(|(id, e)| Neighbor {
                id: id.clone(),
                content: e.content.clone(),
                metadata: e.metadata.clone(),
                distance: self.metric.distance(&query_vec, &e.vector),
            })
            .collect();

        Ok(rank(neighbors, k))
    }

    async fn count(&self, name: &str) -> Result<u64, VectorStoreError> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(name)
            .map(|c| c.entries.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;

    fn store() -> InMemoryVectorStore {
        InMemoryVectorStore::new(Box::new(HashedEmbedder::new(64)), DistanceMetric::Cosine)
    }

    fn record(id: &str, content: &str, doc_type: &str) -> Record {
        let mut metadata = serde_json::Map::new();
        metadata.insert("type".into(), doc_type.into());
        Record {
            id: id.into(),
            content: content.into(),
            metadata,
        }
    }

    /// Returns one vector fewer than requested.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0, 0.0, 0.0]; texts.len().saturating_sub(1)])
        }
    }

    #[tokio::test]
    async fn test_upsert_rejects_missing_vectors() {
        let s = InMemoryVectorStore::new(Box::new(ShortEmbedder), DistanceMetric::Cosine);
        s.ensure_collection("c", &serde_json::Map::new()).await.unwrap();
        let err = s
            .upsert("c", &[record("a", "alpha", "code"), record("b", "beta", "code")])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Embedding(_)));
        assert_eq!(s.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ensure_collection_keeps_entries() {
        let s = store();
        s.ensure_collection("c", &serde_json::Map::new()).await.unwrap();
        s.upsert("c", &[record("a", "alpha", "code")]).await.unwrap();
        s.ensure_collection("c", &serde_json::Map::new()).await.unwrap();
        assert_eq!(s.count("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_missing_collection_is_empty() {
        let s = store();
        assert!(s.query("nope", "x", 5, None).await.unwrap().is_empty());
        assert_eq!(s.count("nope").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_exact_match_ranks_first() {
        let s = store();
        s.ensure_collection("c", &serde_json::Map::new()).await.unwrap();
        s.upsert(
            "c",
            &[
                record("a", "alpha beta", "code"),
                record("b", "gamma delta", "code"),
                record("c", "gamma", "doc"),
            ],
        )
        .await
        .unwrap();

        let hits = s.query("c", "gamma", 3, None).await.unwrap();
        assert_eq!(hits[0].id, "c");
        assert!(hits[0].distance.abs() < 1e-5);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

        let docs_only = s
            .query("c", "gamma", 3, Some(&MetadataFilter::eq("type", "code")))
            .await
            .unwrap();
        assert_eq!(docs_only.len(), 2);
        assert!(docs_only.iter().all(|n| n.metadata["type"] == "code"));
    }
}
