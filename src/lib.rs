//! # Context Vectors
//!
//! A per-project semantic index over content produced by shell tooling.
//!
//! Each project contributes code chunks (`index.json`) and hand-written
//! docs, rules, notes and prompts (`docs.jsonl`). They are merged into
//! uniform documents, embedded, and stored in one named collection per
//! project, which can then be searched by similarity or asked questions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────────────┐
//! │   Sources    │──▶│   Ingest   │──▶│ CollectionStore  │
//! │ index/docs/  │   │ merge+batch│   │  VectorStore     │
//! │ project dir  │   └────────────┘   │ (SQLite/memory)  │
//! └──────────────┘                    └────────┬─────────┘
//!                                              │
//!                                    ┌─────────▼─────────┐
//!                                    │  RetrievalEngine  │
//!                                    │  search / answer  │
//!                                    └───────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ctxv index my-project                 # rebuild from index.json + docs.jsonl
//! ctxv search my-project "retry logic" -n 3
//! ctxv search my-project "deploy" -t rule --json
//! ctxv query my-project "how are embeddings batched?"
//! ctxv stats my-project
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and per-project `config.json` |
//! | [`sources`] | Readers for `index.json`, `docs.jsonl`, `config.json` |
//! | [`connector_fs`] | Project directory scanner for `index-dir` |
//! | [`chunk`] | Paragraph chunker for scanned files |
//! | [`models`] | Source records, documents, results |
//! | [`ingest`] | Merge, id derivation, batching, index commands |
//! | [`collection`] | One project's collection lifecycle |
//! | [`store`] | Vector store trait and backends |
//! | [`embedding`] | Embedding providers |
//! | [`search`] | Similarity search and answers |
//! | [`rag`] | Answer synthesis engines |
//! | [`stats`] | `stats` command |
//! | [`progress`] | Indexing progress reporting |
//! | [`logging`] | Diagnostic logging setup |

pub mod chunk;
pub mod collection;
pub mod config;
pub mod connector_fs;
pub mod db;
pub mod embedding;
mod http;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod rag;
pub mod search;
pub mod sources;
pub mod stats;
pub mod store;
