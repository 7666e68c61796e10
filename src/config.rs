//! Configuration parsing and validation.
//!
//! Two layers of configuration exist:
//!
//! - [`Config`]: the tool configuration, read from a TOML file. Every
//!   section is optional and falls back to documented defaults, so the
//!   tool runs without any file at all.
//! - [`ProjectConfig`]: the per-project `config.json` written by the
//!   upstream shell tooling (display name, project path, directory-scan
//!   filters).
//!
//! ## Example
//!
//! ```toml
//! [paths]
//! context_root = "/home/me/.opencode/context"
//!
//! [ingest]
//! batch_size = 100
//!
//! [embedding]
//! provider = "hashed"
//! dims = 384
//!
//! [store]
//! backend = "sqlite"
//! metric = "cosine"
//!
//! [rag]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::store::DistanceMetric;

/// File name looked up under the context root when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "vectors.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rag: RagConfig,
}

/// Filesystem layout shared with the shell tooling.
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_context_root")]
    pub context_root: PathBuf,
    #[serde(default)]
    pub projects_dir: Option<PathBuf>,
    #[serde(default)]
    pub docs_dir: Option<PathBuf>,
    #[serde(default)]
    pub vectors_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            context_root: default_context_root(),
            projects_dir: None,
            docs_dir: None,
            vectors_dir: None,
        }
    }
}

impl PathsConfig {
    /// Directory holding `<project_id>/index.json` and `<project_id>/config.json`.
    pub fn projects_dir(&self) -> PathBuf {
        self.projects_dir
            .clone()
            .unwrap_or_else(|| self.context_root.join("projects"))
    }

    /// Directory holding `<project_id>/docs.jsonl`.
    pub fn docs_dir(&self) -> PathBuf {
        self.docs_dir
            .clone()
            .unwrap_or_else(|| self.context_root.join("docs"))
    }

    /// Directory holding one collection store per project.
    pub fn vectors_dir(&self) -> PathBuf {
        self.vectors_dir
            .clone()
            .unwrap_or_else(|| self.context_root.join("vectors"))
    }

    /// On-disk storage location of a project's collection.
    pub fn project_vectors_dir(&self, project_id: &str) -> PathBuf {
        self.vectors_dir().join(project_id)
    }

    /// Create the vectors directory if it does not exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        let dir = self.vectors_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))
    }
}

fn default_context_root() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".opencode").join("context")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Documents per upsert call to the vector store.
    #[serde(default = "default_ingest_batch_size")]
    pub batch_size: usize,
    /// Chunk size used when scanning a project directory.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_ingest_batch_size(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_ingest_batch_size() -> usize {
    100
}
fn default_max_tokens() -> usize {
    700
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_embedding_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hashed".to_string()
}
fn default_embedding_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default)]
    pub metric: DistanceMetric,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            metric: DistanceMetric::default(),
        }
    }
}

fn default_store_backend() -> String {
    "sqlite".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    /// Characters of content shown per result in text-mode search output.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    /// Characters kept per source fragment returned with a RAG answer.
    #[serde(default = "default_source_chars")]
    pub source_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            preview_chars: default_preview_chars(),
            source_chars: default_source_chars(),
        }
    }
}

fn default_k() -> usize {
    5
}
fn default_preview_chars() -> usize {
    500
}
fn default_source_chars() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    #[serde(default = "default_rag_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_rag_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            provider: default_rag_provider(),
            model: None,
            url: None,
            system_prompt: None,
            max_retries: default_max_retries(),
            timeout_secs: default_rag_timeout_secs(),
        }
    }
}

fn default_rag_provider() -> String {
    "disabled".to_string()
}
fn default_rag_timeout_secs() -> u64 {
    120
}

impl RagConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Resolve and load the tool configuration.
///
/// An explicit path must exist. Without one, `<context_root>/vectors.toml`
/// is used when present and built-in defaults otherwise.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None => {
            let candidate = PathsConfig::default().context_root.join(DEFAULT_CONFIG_FILE);
            if candidate.exists() {
                load_config(&candidate)
            } else {
                let config = Config::default();
                validate(&config)?;
                Ok(config)
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.ingest.batch_size == 0 {
        bail!("ingest.batch_size must be > 0");
    }
    if config.ingest.max_tokens == 0 {
        bail!("ingest.max_tokens must be > 0");
    }

    if config.retrieval.default_k < 1 {
        bail!("retrieval.default_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "hashed" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hashed, local, openai, or ollama.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    match config.store.backend.as_str() {
        "sqlite" | "memory" => {}
        other => bail!(
            "Unknown store backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    match config.rag.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown rag provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}

/// Per-project settings from `<projects_dir>/<project_id>/config.json`.
///
/// Keys the shell tooling writes but this crate does not use are ignored.
#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "default_include_extensions")]
    pub include_extensions: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: None,
            path: None,
            exclude_patterns: default_exclude_patterns(),
            include_extensions: default_include_extensions(),
        }
    }
}

impl ProjectConfig {
    /// Name recorded in the collection metadata.
    pub fn display_name<'a>(&'a self, project_id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(project_id)
    }

    /// Name reported by `stats`.
    pub fn reported_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

fn default_exclude_patterns() -> Vec<String> {
    ["node_modules", ".git", "dist", "build"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_include_extensions() -> Vec<String> {
    [".py", ".js", ".ts", ".jsx", ".tsx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
