//! One project's named collection inside a [`VectorStore`].
//!
//! A project maps to exactly one collection, `project_<id>`, stored under
//! `<vectors_dir>/<id>/`. Indexing always rebuilds the collection from
//! scratch so entries from deleted sources never linger.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::{Config, ProjectConfig};
use crate::ingest::batches;
use crate::models::{CollectionStats, Document};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::sources;
use crate::store::{open_vector_store, Record, VectorStore, STORE_FILE};

/// Collection name for a project id.
pub fn collection_name(project_id: &str) -> String {
    format!("project_{}", project_id)
}

pub struct CollectionStore {
    store: Box<dyn VectorStore>,
    project_id: String,
    project: ProjectConfig,
    storage_path: PathBuf,
}

impl CollectionStore {
    pub fn new(
        store: Box<dyn VectorStore>,
        project_id: &str,
        project: ProjectConfig,
        storage_path: PathBuf,
    ) -> Self {
        Self {
            store,
            project_id: project_id.to_string(),
            project,
            storage_path,
        }
    }

    /// Open the configured store backend for `project_id` and load its
    /// `config.json`.
    pub async fn open(config: &Config, project_id: &str) -> Result<Self> {
        let project = sources::load_project_config(&config.paths, project_id)?;
        Self::open_for(config, project_id, project).await
    }

    /// Like [`CollectionStore::open`] with an already loaded project config.
    pub async fn open_for(config: &Config, project_id: &str, project: ProjectConfig) -> Result<Self> {
        let dir = config.paths.project_vectors_dir(project_id);
        let store = open_vector_store(config, &dir)
            .await
            .with_context(|| format!("Failed to open vector store for project {}", project_id))?;
        Ok(Self::new(store, project_id, project, dir.join(STORE_FILE)))
    }

    pub fn name(&self) -> String {
        collection_name(&self.project_id)
    }

    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    fn metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut meta = serde_json::Map::new();
        meta.insert(
            "project".into(),
            self.project.display_name(&self.project_id).into(),
        );
        meta
    }

    /// Ensure the collection exists. Idempotent; never clears entries.
    pub async fn get_or_create(&self) -> Result<()> {
        self.store
            .ensure_collection(&self.name(), &self.metadata())
            .await
            .with_context(|| format!("Failed to create collection {}", self.name()))?;
        Ok(())
    }

    /// Replace the collection's contents with `documents`.
    ///
    /// Deletes the collection if present, recreates it, then upserts in
    /// batches of `batch_size`, reporting a [`ProgressEvent::Batch`] after
    /// each one. Returns the number of documents written.
    pub async fn rebuild(
        &self,
        documents: &[Document],
        batch_size: usize,
        reporter: &dyn ProgressReporter,
    ) -> Result<u64> {
        let name = self.name();
        let existed = match self.store.delete_collection_if_exists(&name).await {
            Ok(existed) => existed,
            Err(e) => {
                warn!(collection = %name, error = %e, "could not delete collection, recreating anyway");
                false
            }
        };
        self.get_or_create().await?;

        let total = documents.len() as u64;
        let mut indexed = 0u64;
        for batch in batches(documents, batch_size) {
            let records: Vec<Record> = batch.iter().map(Record::from).collect();
            self.store
                .upsert(&name, &records)
                .await
                .with_context(|| format!("Failed to index batch into {}", name))?;
            indexed += batch.len() as u64;
            reporter.report(ProgressEvent::Batch { indexed, total });
        }

        info!(collection = %name, replaced = existed, documents = indexed, "rebuilt collection");
        Ok(indexed)
    }

    /// Entry count and location of the collection.
    pub async fn stats(&self) -> Result<CollectionStats> {
        let total_items = self
            .store
            .count(&self.name())
            .await
            .with_context(|| format!("Failed to count collection {}", self.name()))?;
        Ok(CollectionStats {
            project_id: self.project_id.clone(),
            project_name: self.project.reported_name().to_string(),
            total_items,
            storage_path: self.storage_path.display().to_string(),
        })
    }
}
