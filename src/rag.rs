//! Answer synthesis over a project's collection.
//!
//! A [`RagEngine`] takes a question, pulls supporting fragments from a
//! [`Retriever`] and asks a chat model to answer from them. Two chat APIs
//! are supported:
//!
//! | Provider | Endpoint | Auth |
//! |----------|----------|------|
//! | `openai` | `POST {url}/chat/completions` | `OPENAI_API_KEY` |
//! | `ollama` | `POST {url}/api/chat` | none |
//!
//! With `[rag] provider = "disabled"` (the default) no engine is built and
//! callers fall back to an "unavailable" answer.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::RagConfig;
use crate::http;
use crate::models::SearchResult;

const DEFAULT_SYSTEM_PROMPT: &str = "You answer questions about a software project. \
Use only the context fragments provided. If they do not contain the answer, say that \
you do not know. Mention file paths or document titles when they help.";

/// Supplies ranked fragments for a question.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>>;
}

/// A fragment the answer was built from.
#[derive(Debug, Clone)]
pub struct SourceNode {
    pub text: String,
    pub relevance: f64,
}

#[derive(Debug, Clone)]
pub struct RagResponse {
    pub answer: String,
    pub source_nodes: Vec<SourceNode>,
}

#[async_trait]
pub trait RagEngine: Send + Sync {
    /// Retrieve `k` fragments for `query` and synthesize an answer from them.
    async fn synthesize(
        &self,
        query: &str,
        retriever: &dyn Retriever,
        k: usize,
    ) -> Result<RagResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatApi {
    OpenAI,
    Ollama,
}

/// Chat-completions based [`RagEngine`].
pub struct ChatCompletionsRag {
    api: ChatApi,
    model: String,
    endpoint: String,
    api_key: Option<String>,
    system_prompt: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl ChatCompletionsRag {
    /// # Errors
    ///
    /// Fails for an unknown provider, or for `openai` when `OPENAI_API_KEY`
    /// is not set.
    pub fn new(config: &RagConfig) -> Result<Self> {
        let (api, model, endpoint, api_key) = match config.provider.as_str() {
            "openai" => {
                let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
                    anyhow::anyhow!(
                        "OPENAI_API_KEY environment variable not set. Export it to enable \
                         answer synthesis, or set [rag] provider = \"ollama\"."
                    )
                })?;
                let base = config
                    .url
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
                (
                    ChatApi::OpenAI,
                    config.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string()),
                    format!("{}/chat/completions", base.trim_end_matches('/')),
                    Some(api_key),
                )
            }
            "ollama" => {
                let base = config
                    .url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string());
                (
                    ChatApi::Ollama,
                    config.model.clone().unwrap_or_else(|| "llama3.2".to_string()),
                    format!("{}/api/chat", base.trim_end_matches('/')),
                    None,
                )
            }
            other => bail!("Answer synthesis provider '{}' is not available", other),
        };

        Ok(Self {
            api,
            model,
            endpoint,
            api_key,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }

    fn request_body(&self, user_message: &str) -> Value {
        let messages = json!([
            { "role": "system", "content": self.system_prompt },
            { "role": "user", "content": user_message },
        ]);
        match self.api {
            ChatApi::OpenAI => json!({ "model": self.model, "messages": messages }),
            ChatApi::Ollama => json!({ "model": self.model, "messages": messages, "stream": false }),
        }
    }

    fn label(&self) -> &'static str {
        match self.api {
            ChatApi::OpenAI => "OpenAI",
            ChatApi::Ollama => "Ollama",
        }
    }
}

#[async_trait]
impl RagEngine for ChatCompletionsRag {
    async fn synthesize(
        &self,
        query: &str,
        retriever: &dyn Retriever,
        k: usize,
    ) -> Result<RagResponse> {
        let fragments = retriever.retrieve(query, k).await?;
        if fragments.is_empty() {
            return Ok(RagResponse {
                answer: "No indexed content matched the question.".to_string(),
                source_nodes: Vec::new(),
            });
        }

        let user_message = create_user_message(&fragments_to_context(&fragments), query);
        debug!(model = %self.model, fragments = fragments.len(), "requesting answer");
        let response = http::post_json(
            &self.client,
            &self.endpoint,
            self.api_key.as_deref(),
            &self.request_body(&user_message),
            self.max_retries,
            self.label(),
        )
        .await?;

        let answer = match self.api {
            ChatApi::OpenAI => parse_openai_chat(&response)?,
            ChatApi::Ollama => parse_ollama_chat(&response)?,
        };

        Ok(RagResponse {
            answer,
            source_nodes: fragments
                .into_iter()
                .map(|f| SourceNode {
                    text: f.content,
                    relevance: f.relevance,
                })
                .collect(),
        })
    }
}

/// Build the configured engine, or `None` when synthesis is disabled.
pub fn create_rag_engine(config: &RagConfig) -> Result<Option<Box<dyn RagEngine>>> {
    if !config.is_enabled() {
        return Ok(None);
    }
    Ok(Some(Box::new(ChatCompletionsRag::new(config)?)))
}

fn fragments_to_context(fragments: &[SearchResult]) -> Value {
    Value::Array(
        fragments
            .iter()
            .map(|f| {
                json!({
                    "type": f.doc_type,
                    "path": f.locator,
                    "relevance": f.relevance,
                    "content": f.content,
                })
            })
            .collect(),
    )
}

fn create_user_message(context: &Value, query: &str) -> String {
    format!(
        "Context Information:\n==================\n{context}\n\nUser Question:\n==================\n{query}\n"
    )
}

fn parse_openai_chat(json: &Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: no message content"))
}

fn parse_ollama_chat(json: &Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: no message content"))
}
