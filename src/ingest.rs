//! Ingestion pipeline orchestration.
//!
//! Turns a project's raw content sources into [`Document`]s and rebuilds
//! the project's collection from them:
//!
//! ```text
//! index.json + docs.jsonl ──► merge ──► batches ──► CollectionStore::rebuild
//! project dir + docs.jsonl ──► directory_documents ─┘
//! ```
//!
//! Document ids are derived only from provenance, so indexing unchanged
//! sources twice yields the same ids.

use anyhow::Result;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::chunk::chunk_text;
use crate::collection::CollectionStore;
use crate::config::Config;
use crate::connector_fs::{self, ScannedFile};
use crate::models::{CodeChunk, Document, DocumentSource, Locator, ManualDoc};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::sources;

/// Result of `index` / `sync`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The collection was rebuilt with this many documents.
    Indexed { documents: u64 },
    /// No source produced any content; the collection was left as is.
    Empty,
}

/// Result of `index-dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirIndexOutcome {
    Indexed {
        files: usize,
        manual_docs: usize,
        documents: u64,
    },
    Empty,
    /// `config.json` has no `path`, or it does not exist.
    MissingPath(String),
}

/// Make an id fragment safe as a store key: `/` and `#` become `_`.
pub fn sanitize_id(raw: &str) -> String {
    raw.replace(['/', '#'], "_")
}

/// Merge code chunks and manual docs into one ordered document sequence.
///
/// Code chunks come first, then manual docs, each in source order. Records
/// whose content is empty after trimming are skipped.
pub fn merge(chunks: &[CodeChunk], manual_docs: &[ManualDoc]) -> Vec<Document> {
    let code = chunks
        .iter()
        .filter(|c| !c.content.trim().is_empty())
        .map(|c| Document {
            id: format!("code_{}", sanitize_id(&c.id)),
            content: c.content.clone(),
            doc_type: "code".to_string(),
            locator: Locator::Path(c.path.clone()),
            source: DocumentSource::ShellIndex,
        });

    let mut documents: Vec<Document> = code.chain(manual_documents(manual_docs)).collect();
    dedupe_ids(&mut documents);
    documents
}

fn manual_documents(manual_docs: &[ManualDoc]) -> impl Iterator<Item = Document> + '_ {
    manual_docs
        .iter()
        .filter(|d| !d.content.trim().is_empty())
        .map(|d| Document {
            id: format!("doc_{}", sanitize_id(&d.id)),
            content: d.content.clone(),
            doc_type: d.doc_type.clone().unwrap_or_else(|| "doc".to_string()),
            locator: Locator::Title(d.title.clone()),
            source: DocumentSource::Manual,
        })
}

/// Suffix repeated ids with `~2`, `~3`, ... in order of appearance.
///
/// Distinct raw ids can sanitize to the same key (`a/b` and `a_b`), and
/// hand-written docs can repeat an id; every document must still get its
/// own entry. A suffixed id is never one already assigned, including a
/// raw id that happens to end in `~N`.
fn dedupe_ids(documents: &mut [Document]) {
    let mut assigned: HashSet<String> = HashSet::with_capacity(documents.len());
    for doc in documents.iter_mut() {
        if assigned.contains(&doc.id) {
            let mut n = 2;
            let mut renamed = format!("{}~{}", doc.id, n);
            while assigned.contains(&renamed) {
                n += 1;
                renamed = format!("{}~{}", doc.id, n);
            }
            warn!(id = %doc.id, renamed = %renamed, "duplicate document id");
            doc.id = renamed;
        }
        assigned.insert(doc.id.clone());
    }
}

/// Split documents into upsert batches of at most `size`.
pub fn batches(documents: &[Document], size: usize) -> std::slice::Chunks<'_, Document> {
    documents.chunks(size.max(1))
}

/// Chunk scanned files into code documents.
pub fn directory_documents(files: &[ScannedFile], max_tokens: usize) -> Vec<Document> {
    files
        .iter()
        .flat_map(|file| {
            chunk_text(&file.body, max_tokens)
                .into_iter()
                .map(move |chunk| Document {
                    id: format!("file_{}_{}", sanitize_id(&file.relative_path), chunk.index),
                    content: chunk.text,
                    doc_type: "code".to_string(),
                    locator: Locator::Path(file.relative_path.clone()),
                    source: DocumentSource::DirectoryScan,
                })
        })
        .collect()
}

/// Read `index.json` and `docs.jsonl` for a project and merge them.
pub fn load_documents(config: &Config, project_id: &str) -> Result<Vec<Document>> {
    let index = sources::load_project_index(&config.paths, project_id)?;
    let docs = sources::load_project_docs(&config.paths, project_id)?;
    info!(
        project = project_id,
        chunks = index.chunks.len(),
        manual_docs = docs.len(),
        "loaded sources"
    );
    Ok(merge(&index.chunks, &docs))
}

/// `ctxv index` / `ctxv sync`: rebuild the collection from the shell index
/// and manual docs.
pub async fn run_index(
    config: &Config,
    project_id: &str,
    reporter: &dyn ProgressReporter,
) -> Result<IndexOutcome> {
    println!("Indexing project {}...", project_id);
    reporter.report(ProgressEvent::Loading {
        phase: "reading sources".to_string(),
    });

    let documents = load_documents(config, project_id)?;
    if documents.is_empty() {
        println!("No content to index");
        return Ok(IndexOutcome::Empty);
    }

    let collection = CollectionStore::open(config, project_id).await?;
    let n = collection
        .rebuild(&documents, config.ingest.batch_size, reporter)
        .await?;
    println!("Indexed {} items into {}", n, collection.name());
    Ok(IndexOutcome::Indexed { documents: n })
}

/// `ctxv index-dir`: rebuild the collection from the project directory
/// configured in `config.json`, plus manual docs.
///
/// A missing project path is reported on stderr and leaves the collection
/// untouched; it is not an error.
pub async fn run_index_dir(
    config: &Config,
    project_id: &str,
    reporter: &dyn ProgressReporter,
) -> Result<DirIndexOutcome> {
    let project = sources::load_project_config(&config.paths, project_id)?;
    let root = match project.path.as_deref() {
        Some(p) if p.exists() => p.to_path_buf(),
        other => {
            let shown = other
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string());
            eprintln!("Error: Project path not found: {}", shown);
            return Ok(DirIndexOutcome::MissingPath(shown));
        }
    };

    println!("Indexing {}...", root.display());
    reporter.report(ProgressEvent::Loading {
        phase: format!("scanning {}", root.display()),
    });

    let files = connector_fs::scan_project_dir(&root, &project)?;
    println!("Loaded {} documents", files.len());
    let mut documents = directory_documents(&files, config.ingest.max_tokens);

    let manual = sources::load_project_docs(&config.paths, project_id)?;
    if !manual.is_empty() {
        documents.extend(manual_documents(&manual));
        println!("Added {} manual documents", manual.len());
    }
    dedupe_ids(&mut documents);

    if documents.is_empty() {
        println!("No content to index");
        return Ok(DirIndexOutcome::Empty);
    }

    let collection = CollectionStore::open_for(config, project_id, project).await?;
    let n = collection
        .rebuild(&documents, config.ingest.batch_size, reporter)
        .await?;
    println!("Indexed {} documents into {}", n, collection.name());
    Ok(DirIndexOutcome::Indexed {
        files: files.len(),
        manual_docs: manual.len(),
        documents: n,
    })
}
