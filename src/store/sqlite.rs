//! SQLite-backed [`VectorStore`].
//!
//! Each project gets its own SQLite file. Vectors are stored as BLOBs and
//! ranked by brute force over the rows that pass the metadata filter; the
//! filter itself is evaluated by SQLite via `json_extract`.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::debug;

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob, Embedder};
use crate::migrate;

use super::{rank, DistanceMetric, MetadataFilter, Neighbor, Record, VectorStore, VectorStoreError};

pub struct SqliteVectorStore {
    pool: SqlitePool,
    embedder: Box<dyn Embedder>,
    metric: DistanceMetric,
}

impl SqliteVectorStore {
    /// Open the store file, creating it and its schema if needed.
    pub async fn open(
        path: &Path,
        embedder: Box<dyn Embedder>,
        metric: DistanceMetric,
    ) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            embedder,
            metric,
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorStoreError> {
        let vectors = self
            .embedder
            .embed(texts)
            .await
            .map_err(|e| VectorStoreError::Embedding(format!("{:#}", e)))?;
        if vectors.len() != texts.len() {
            return Err(VectorStoreError::Embedding(format!(
                "expected {} vectors from {}, got {}",
                texts.len(),
                self.embedder.model_name(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, VectorStoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collections WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        Ok(n > 0)
    }
}

fn parse_metadata(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_collection(
        &self,
        name: &str,
        metadata: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), VectorStoreError> {
        let mut metadata = metadata.clone();
        metadata.insert("metric".into(), self.metric.as_str().into());
        metadata.insert("embedder".into(), self.embedder.model_name().into());
        metadata.insert("dims".into(), self.embedder.dims().into());
        let metadata_json = serde_json::to_string(&metadata)
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;

        sqlx::query(
            "INSERT INTO collections (name, metadata_json, created_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(&metadata_json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| VectorStoreError::Collection(e.to_string()))?;

        Ok(())
    }

    async fn delete_collection_if_exists(&self, name: &str) -> Result<bool, VectorStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM entries WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;

        let removed = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;

        debug!(collection = name, existed = removed > 0, "deleted collection");
        Ok(removed > 0)
    }

    async fn upsert(&self, name: &str, records: &[Record]) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }
        if !self.collection_exists(name).await? {
            return Err(VectorStoreError::Upsert(format!(
                "collection {} not found",
                name
            )));
        }

        let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let vectors = self.embed(&texts).await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        for (record, vector) in records.iter().zip(vectors.iter()) {
            let metadata_json = serde_json::to_string(&record.metadata)
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO entries (collection, id, content, metadata_json, embedding)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    content = excluded.content,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(name)
            .bind(&record.id)
            .bind(&record.content)
            .bind(&metadata_json)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;

        debug!(collection = name, records = records.len(), "upserted batch");
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
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let mut sql =
            String::from("SELECT id, content, metadata_json, embedding FROM entries WHERE collection = ?");
        let conditions = filter.map(|f| f.must.as_slice()).unwrap_or_default();
        for _ in conditions {
            sql.push_str(" AND json_extract(metadata_json, ?) = ?");
        }

        let mut q = sqlx::query(&sql).bind(name);
        for cond in conditions {
            q = q
                .bind(format!("$.\"{}\"", cond.field))
                .bind(cond.value.clone());
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Query(e.to_string()))?;

        let neighbors = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let metadata_json: String = row.get("metadata_json");
                Neighbor {
                    id: row.get("id"),
                    content: row.get("content"),
                    metadata: parse_metadata(&metadata_json),
                    distance: self.metric.distance(&query_vec, &blob_to_vec(&blob)),
                }
            })
            .collect();

        Ok(rank(neighbors, k))
    }

    async fn count(&self, name: &str) -> Result<u64, VectorStoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE collection = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::Query(e.to_string()))?;
        Ok(n as u64)
    }
}
