//! Similarity search and answer synthesis over one project's collection.
//!
//! [`RetrievalEngine::search`] ranks documents by ascending distance from
//! the store's nearest-neighbour query and derives a relevance score:
//!
//! ```text
//! relevance = round(max(0, 1 - distance), 3)
//! ```
//!
//! which is meaningful as long as "similar" means a distance below 1 under
//! the configured metric (see [`DistanceMetric`](crate::store::DistanceMetric)).
//!
//! [`RetrievalEngine::answer`] hands the engine itself, as a [`Retriever`],
//! to the configured [`RagEngine`]. Without one it returns
//! [`UNAVAILABLE_ANSWER`] instead of failing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::collection::CollectionStore;
use crate::config::Config;
use crate::models::{QueryAnswer, SearchResult};
use crate::rag::{create_rag_engine, RagEngine, Retriever};
use crate::store::{MetadataFilter, Neighbor};

/// Answer returned when no synthesis engine is available.
pub const UNAVAILABLE_ANSWER: &str = "Answer synthesis unavailable";

pub struct RetrievalEngine {
    collection: CollectionStore,
    rag: Option<Box<dyn RagEngine>>,
    source_chars: usize,
}

impl RetrievalEngine {
    pub fn new(
        collection: CollectionStore,
        rag: Option<Box<dyn RagEngine>>,
        source_chars: usize,
    ) -> Self {
        Self {
            collection,
            rag,
            source_chars,
        }
    }

    /// Open the project's collection, creating it if absent, and build the
    /// configured synthesis engine.
    ///
    /// A synthesis engine that cannot be constructed (missing API key, ...)
    /// is logged and treated as unavailable; search keeps working.
    pub async fn open(config: &Config, project_id: &str) -> Result<Self> {
        let collection = CollectionStore::open(config, project_id).await?;
        collection.get_or_create().await?;

        let rag = match create_rag_engine(&config.rag) {
            Ok(engine) => engine,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "answer synthesis unavailable");
                None
            }
        };
        Ok(Self::new(collection, rag, config.retrieval.source_chars))
    }

    /// Return up to `k` results, best match first. `type_filter` is passed
    /// to the store as a metadata predicate.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        type_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let filter = type_filter.map(|t| MetadataFilter::eq("type", t));
        let neighbors = self
            .collection
            .store()
            .query(&self.collection.name(), query, k, filter.as_ref())
            .await
            .with_context(|| format!("Search failed in {}", self.collection.name()))?;

        debug!(query, k, hits = neighbors.len(), "search");
        Ok(neighbors.into_iter().map(to_search_result).collect())
    }

    /// Answer `query` from `k` retrieved fragments.
    ///
    /// Sources are listed best match first, each cut to `source_chars`
    /// characters plus `...`.
    pub async fn answer(&self, query: &str, k: usize) -> Result<QueryAnswer> {
        let Some(engine) = self.rag.as_deref() else {
            return Ok(QueryAnswer {
                answer: UNAVAILABLE_ANSWER.to_string(),
                sources: Vec::new(),
            });
        };

        let mut response = engine.synthesize(query, self, k).await?;
        response.source_nodes.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(QueryAnswer {
            answer: response.answer,
            sources: response
                .source_nodes
                .iter()
                .map(|node| truncate_source(&node.text, self.source_chars))
                .collect(),
        })
    }
}

#[async_trait]
impl Retriever for RetrievalEngine {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.search(query, k, None).await
    }
}

fn to_search_result(neighbor: Neighbor) -> SearchResult {
    let meta = &neighbor.metadata;
    let doc_type = meta
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let locator = meta
        .get("path")
        .or_else(|| meta.get("title"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    SearchResult {
        content: neighbor.content,
        doc_type,
        locator,
        relevance: relevance(neighbor.distance),
    }
}

/// `max(0, 1 - distance)` clamped to 1 and rounded to 3 decimals.
pub fn relevance(distance: f32) -> f64 {
    let score = (1.0 - f64::from(distance)).clamp(0.0, 1.0);
    (score * 1000.0).round() / 1000.0
}

/// Cut `text` to `max_chars` characters, appending `...` when cut.
pub fn truncate_source(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Text rendering of search results.
pub fn render_results(results: &[SearchResult], preview_chars: usize) -> String {
    if results.is_empty() {
        return "No results found\n".to_string();
    }
    let mut out = String::new();
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!(
            "\n--- Result {} (relevance: {}) ---\n",
            i + 1,
            r.relevance
        ));
        out.push_str(&format!("Type: {} | Path: {}\n", r.doc_type, r.locator));
        out.push_str(&truncate_source(&r.content, preview_chars));
        out.push('\n');
    }
    out
}

/// Text rendering of a synthesized answer.
pub fn render_answer(answer: &QueryAnswer) -> String {
    let mut out = format!("\n=== Answer ===\n{}\n", answer.answer);
    if !answer.sources.is_empty() {
        out.push_str("\n=== Sources ===\n");
        for (i, s) in answer.sources.iter().enumerate() {
            out.push_str(&format!("\n[{}] {}\n", i + 1, s));
        }
    }
    out
}

/// `ctxv search`.
pub async fn run_search(
    config: &Config,
    project_id: &str,
    query: &str,
    k: usize,
    type_filter: Option<&str>,
    json: bool,
) -> Result<()> {
    let engine = RetrievalEngine::open(config, project_id).await?;
    let results = engine.search(query, k, type_filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print!("{}", render_results(&results, config.retrieval.preview_chars));
    }
    Ok(())
}

/// `ctxv query`.
pub async fn run_query(
    config: &Config,
    project_id: &str,
    query: &str,
    k: usize,
    json: bool,
) -> Result<()> {
    let engine = RetrievalEngine::open(config, project_id).await?;
    let answer = engine.answer(query, k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print!("{}", render_answer(&answer));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::tests::{doc, memory_collection};
    use crate::models::{DocumentSource, Locator};
    use crate::progress::NoProgress;
    use crate::rag::{RagResponse, SourceNode};

    async fn scenario_engine(rag: Option<Box<dyn RagEngine>>) -> RetrievalEngine {
        let collection = memory_collection("demo");
        let docs = vec![
            crate::models::Document {
                id: "code_a_b.py_1".into(),
                content: "def f(): pass".into(),
                doc_type: "code".into(),
                locator: Locator::Path("a/b.py".into()),
                source: DocumentSource::ShellIndex,
            },
            crate::models::Document {
                id: "doc_x".into(),
                content: "rule text".into(),
                doc_type: "rule".into(),
                locator: Locator::Title("R1".into()),
                source: DocumentSource::Manual,
            },
        ];
        collection.rebuild(&docs, 100, &NoProgress).await.unwrap();
        RetrievalEngine::new(collection, rag, 300)
    }

    #[test]
    fn test_relevance_bounds_and_rounding() {
        assert_eq!(relevance(0.0), 1.0);
        assert_eq!(relevance(0.25), 0.75);
        assert_eq!(relevance(0.12345), 0.877);
        assert_eq!(relevance(1.0), 0.0);
        assert_eq!(relevance(1.7), 0.0);
        assert_eq!(relevance(-0.000_001), 1.0);
    }

    #[test]
    fn test_truncate_source() {
        let long = "x".repeat(301);
        let cut = truncate_source(&long, 300);
        assert_eq!(cut.len(), 303);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_source(&"y".repeat(300), 300), "y".repeat(300));
        assert_eq!(truncate_source("ééé", 2), "éé...");
    }

    #[tokio::test]
    async fn test_search_scenario_returns_code() {
        let engine = scenario_engine(None).await;
        let results = engine.search("pass", 1, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_type, "code");
        assert_eq!(results[0].locator, "a/b.py");
        assert!((0.0..=1.0).contains(&results[0].relevance));
    }

    #[tokio::test]
    async fn test_search_type_filter_and_ordering() {
        let collection = memory_collection("p");
        let docs: Vec<_> = (0..6)
            .map(|i| {
                let t = if i % 2 == 0 { "code" } else { "note" };
                doc(&format!("d{}", i), &format!("shared words item{}", i), t)
            })
            .collect();
        collection.rebuild(&docs, 100, &NoProgress).await.unwrap();
        let engine = RetrievalEngine::new(collection, None, 300);

        let notes = engine.search("shared words", 3, Some("note")).await.unwrap();
        assert_eq!(notes.len(), 3);
        assert!(notes.iter().all(|r| r.doc_type == "note"));

        let all = engine.search("shared words", 6, None).await.unwrap();
        assert!(all.windows(2).all(|w| w[0].relevance >= w[1].relevance));

        assert!(engine.search("shared", 3, Some("prompt")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_doc_locator_is_title() {
        let engine = scenario_engine(None).await;
        let results = engine.search("rule text", 1, Some("rule")).await.unwrap();
        assert_eq!(results[0].locator, "R1");
    }

    #[tokio::test]
    async fn test_answer_without_engine_is_unavailable() {
        let engine = scenario_engine(None).await;
        let answer = engine.answer("what does f do?", 5).await.unwrap();
        assert!(answer.answer.contains("unavailable"));
        assert!(answer.sources.is_empty());
    }

    struct EchoRag;

    #[async_trait]
    impl RagEngine for EchoRag {
        async fn synthesize(
            &self,
            query: &str,
            retriever: &dyn Retriever,
            k: usize,
        ) -> Result<RagResponse> {
            let fragments = retriever.retrieve(query, k).await?;
            // Weakest fragment first; the engine reorders.
            let mut nodes = vec![SourceNode {
                text: "z".repeat(400),
                relevance: 0.0,
            }];
            nodes.extend(fragments.into_iter().map(|f| SourceNode {
                text: f.content,
                relevance: f.relevance,
            }));
            Ok(RagResponse {
                answer: format!("answered: {}", query),
                source_nodes: nodes,
            })
        }
    }

    #[tokio::test]
    async fn test_answer_orders_and_truncates_sources() {
        let engine = scenario_engine(Some(Box::new(EchoRag))).await;
        let answer = engine.answer("pass", 1).await.unwrap();
        assert_eq!(answer.answer, "answered: pass");
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0], "def f(): pass");
        assert_eq!(answer.sources[1], format!("{}...", "z".repeat(300)));
    }

    #[test]
    fn test_render_results() {
        assert_eq!(render_results(&[], 500), "No results found\n");
        let out = render_results(
            &[SearchResult {
                content: "c".repeat(600),
                doc_type: "code".into(),
                locator: "a.py".into(),
                relevance: 0.5,
            }],
            500,
        );
        assert!(out.contains("--- Result 1 (relevance: 0.5) ---"));
        assert!(out.contains("Type: code | Path: a.py"));
        assert!(out.contains(&format!("{}...", "c".repeat(500))));
    }

    #[test]
    fn test_render_answer() {
        let out = render_answer(&QueryAnswer {
            answer: "42".into(),
            sources: vec!["s1".into()],
        });
        assert!(out.contains("=== Answer ===\n42"));
        assert!(out.contains("[1] s1"));
        let bare = render_answer(&QueryAnswer {
            answer: UNAVAILABLE_ANSWER.into(),
            sources: vec![],
        });
        assert!(!bare.contains("Sources"));
    }
}
