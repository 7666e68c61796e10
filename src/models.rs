//! Core data models used throughout the crate.
//!
//! These types represent the raw source records, the uniform documents
//! that get indexed, and the results that flow back out of retrieval.

use serde::{Deserialize, Serialize};

/// One code chunk from the shell-generated `index.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodeChunk {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub content: String,
}

/// The shell-generated `index.json`. Only `chunks` is consumed here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellIndex {
    #[serde(default)]
    pub files: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub chunks: Vec<CodeChunk>,
}

/// One manually authored doc, rule, note or prompt from `docs.jsonl`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManualDoc {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub title: String,
}

/// Ids are written by hand in `docs.jsonl`, so numeric ids are accepted too.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Provenance of an indexed [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    ShellIndex,
    Manual,
    DirectoryScan,
}

impl DocumentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSource::ShellIndex => "shell_index",
            DocumentSource::Manual => "manual",
            DocumentSource::DirectoryScan => "directory_scan",
        }
    }
}

/// Where a document came from, for display only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// File path of a code chunk or scanned file.
    Path(String),
    /// Title of a manual document.
    Title(String),
}

/// The unit of indexing: one entry in a project's collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub doc_type: String,
    pub locator: Locator,
    pub source: DocumentSource,
}

impl Document {
    /// Metadata stored alongside the document in the vector store.
    ///
    /// Code locators are stored under `path`, manual ones under `title`.
    pub fn metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut meta = serde_json::Map::new();
        meta.insert("type".into(), self.doc_type.clone().into());
        meta.insert("source".into(), self.source.as_str().into());
        match &self.locator {
            Locator::Path(p) => meta.insert("path".into(), p.clone().into()),
            Locator::Title(t) => meta.insert("title".into(), t.clone().into()),
        };
        meta
    }
}

/// A ranked similarity-search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub content: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Path or title of the matched document.
    #[serde(rename = "path")]
    pub locator: String,
    /// Derived score in `[0.0, 1.0]`, rounded to 3 decimals.
    pub relevance: f64,
}

/// A synthesized answer plus the fragments it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

/// Size and location of one project's collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub project_id: String,
    pub project_name: String,
    pub total_items: u64,
    #[serde(rename = "db_path")]
    pub storage_path: String,
}
