//! # Context Vectors CLI (`ctxv`)
//!
//! Builds and queries one semantic collection per project.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctxv index <project>` | Rebuild from `index.json` and `docs.jsonl` |
//! | `ctxv sync <project>` | Alias of `index` |
//! | `ctxv index-dir <project>` | Rebuild from the project directory and `docs.jsonl` |
//! | `ctxv search <project> "<query>"` | Similarity search |
//! | `ctxv query <project> "<question>"` | Synthesized answer with sources |
//! | `ctxv stats <project>` | Collection size and location |

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use context_vectors::progress::ProgressMode;
use context_vectors::{config, ingest, logging, search, stats};

/// Context Vectors: per-project semantic search over code chunks and
/// hand-written docs.
#[derive(Parser)]
#[command(
    name = "ctxv",
    about = "Per-project semantic index over code chunks and manual docs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `<context_root>/vectors.toml` when present, otherwise
    /// built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug diagnostics to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Indexing progress on stderr.
    #[arg(long, global = true, value_enum, default_value = "auto")]
    progress: ProgressMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the project's collection from the shell index and manual docs.
    Index { project_id: String },

    /// Same as `index`.
    Sync { project_id: String },

    /// Rebuild the project's collection by scanning its directory.
    ///
    /// Uses `path`, `include_extensions` and `exclude_patterns` from the
    /// project's `config.json`. Manual docs are added as well.
    IndexDir { project_id: String },

    /// Similarity search over the project's collection.
    Search {
        project_id: String,

        /// Search text.
        query: Option<String>,

        /// Number of results.
        #[arg(short = 'n', long = "num-results")]
        num_results: Option<usize>,

        /// Only return documents of this type (code, doc, rule, note, prompt).
        #[arg(short = 't', long = "type")]
        doc_type: Option<String>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the project's collection.
    Query {
        project_id: String,

        /// Question text.
        query: Option<String>,

        /// Number of supporting fragments.
        #[arg(short = 'n', long = "num-results")]
        num_results: Option<usize>,

        /// Print the answer as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show collection statistics.
    Stats {
        project_id: String,

        /// Print statistics as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn required(query: Option<String>, message: &str) -> anyhow::Result<String> {
    match query {
        Some(q) if !q.trim().is_empty() => Ok(q),
        _ => bail!("{}", message),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::resolve_config(cli.config.as_deref())?;
    cfg.paths.ensure_dirs()?;
    let reporter = cli.progress.reporter();

    match cli.command {
        Commands::Index { project_id } | Commands::Sync { project_id } => {
            ingest::run_index(&cfg, &project_id, reporter.as_ref()).await?;
        }
        Commands::IndexDir { project_id } => {
            ingest::run_index_dir(&cfg, &project_id, reporter.as_ref()).await?;
        }
        Commands::Search {
            project_id,
            query,
            num_results,
            doc_type,
            json,
        } => {
            let query = required(query, "Search query required")?;
            let k = num_results.unwrap_or(cfg.retrieval.default_k);
            search::run_search(&cfg, &project_id, &query, k, doc_type.as_deref(), json).await?;
        }
        Commands::Query {
            project_id,
            query,
            num_results,
            json,
        } => {
            let query = required(query, "Query required")?;
            let k = num_results.unwrap_or(cfg.retrieval.default_k);
            search::run_query(&cfg, &project_id, &query, k, json).await?;
        }
        Commands::Stats { project_id, json } => {
            stats::run_stats(&cfg, &project_id, json).await?;
        }
    }

    Ok(())
}
