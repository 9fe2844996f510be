//! Pluggable language model backend abstraction
//!
//! This module provides a backend-agnostic interface for the two model tasks
//! Outlay has: structured invoice extraction and read-only question answering.
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all AI operations
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `AnthropicBackend`, `OpenAICompatibleBackend`, `MockBackend`
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = Config::load(None)?;
//! if let Some(client) = AIClient::from_config(&config.ai)? {
//!     let data = client
//!         .extract_invoice(&DocumentContent::from_text(text), &categories)
//!         .await?;
//! }
//! ```
//!
//! # Configuration
//!
//! `[ai]` in the config file, overridden by environment variables:
//! - `AI_BACKEND`: anthropic (default), openai_compatible, mock, none
//! - `ANTHROPIC_API_KEY` / `ANTHROPIC_HOST` / `ANTHROPIC_MODEL`
//! - `OPENAI_COMPATIBLE_API_KEY` / `OPENAI_COMPATIBLE_HOST` / `OPENAI_COMPATIBLE_MODEL`

mod anthropic;
mod mock;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use anthropic::AnthropicBackend;
pub use mock::{MockBackend, MockCall};
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::config::AiConfig;
use crate::error::{Error, Result};
use crate::models::{ChatMessage, ExtractedInvoiceData};
use crate::prompts::{PromptId, PromptLibrary};

/// Trait defining the interface for all AI backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Extract invoice fields from document text and/or an attached file
    ///
    /// Unusable model output gives empty fields, not an error. Errors mean
    /// the model could not be reached or refused the request.
    async fn extract_invoice(
        &self,
        content: &DocumentContent,
        categories: &[String],
    ) -> Result<ExtractedInvoiceData>;

    /// Answer a question over a JSON snapshot of the expense data
    async fn answer_query(
        &self,
        question: &str,
        snapshot: &str,
        history: &[ChatMessage],
    ) -> Result<String>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// Anthropic Messages API
    Anthropic(AnthropicBackend),
    /// OpenAI chat completions API (OpenAI, vLLM, LocalAI, llama-server, etc.)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from the `[ai]` config section
    ///
    /// Returns `Ok(None)` when AI is disabled (`none`) or a hosted backend
    /// has no API key. An unknown backend name is a config error.
    pub fn from_config(config: &AiConfig) -> Result<Option<Self>> {
        let backend = config.backend.trim().to_lowercase();
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());

        match backend.as_str() {
            "none" | "disabled" | "" => Ok(None),
            "anthropic" | "claude" => match api_key {
                Some(key) => Ok(Some(AIClient::Anthropic(AnthropicBackend::new(
                    &config.host,
                    &config.model,
                    key,
                    config.max_tokens,
                    config.timeout(),
                )?))),
                None => {
                    tracing::warn!("AI backend is anthropic but no API key is set, AI disabled");
                    Ok(None)
                }
            },
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                Ok(Some(AIClient::OpenAICompatible(
                    OpenAICompatibleBackend::new(
                        &config.host,
                        &config.model,
                        api_key,
                        config.max_tokens,
                        config.timeout(),
                    )?,
                )))
            }
            "mock" => Ok(Some(AIClient::Mock(MockBackend::new()))),
            other => Err(Error::Config(format!("Unknown AI backend: {}", other))),
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Name of the active backend
    pub fn backend_name(&self) -> &'static str {
        match self {
            AIClient::Anthropic(_) => "anthropic",
            AIClient::OpenAICompatible(_) => "openai_compatible",
            AIClient::Mock(_) => "mock",
        }
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn extract_invoice(
        &self,
        content: &DocumentContent,
        categories: &[String],
    ) -> Result<ExtractedInvoiceData> {
        match self {
            AIClient::Anthropic(b) => b.extract_invoice(content, categories).await,
            AIClient::OpenAICompatible(b) => b.extract_invoice(content, categories).await,
            AIClient::Mock(b) => b.extract_invoice(content, categories).await,
        }
    }

    async fn answer_query(
        &self,
        question: &str,
        snapshot: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        match self {
            AIClient::Anthropic(b) => b.answer_query(question, snapshot, history).await,
            AIClient::OpenAICompatible(b) => b.answer_query(question, snapshot, history).await,
            AIClient::Mock(b) => b.answer_query(question, snapshot, history).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::Anthropic(b) => b.health_check().await,
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Anthropic(b) => b.model(),
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::Anthropic(b) => b.host(),
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

/// A prompt split into its system and user parts
#[derive(Debug, Clone)]
pub(crate) struct RenderedPrompt {
    pub system: Option<String>,
    pub user: String,
}

/// Render the extraction prompt for one document
pub(crate) fn render_extraction_prompt(
    prompts: &RwLock<PromptLibrary>,
    content: &DocumentContent,
    categories: &[String],
) -> Result<RenderedPrompt> {
    let category_list = if categories.is_empty() {
        "(none yet)".to_string()
    } else {
        categories.join(", ")
    };
    let has_attachment = if content.file_bytes.is_some() { "yes" } else { "" };

    let mut vars = HashMap::new();
    vars.insert("categories", category_list.as_str());
    vars.insert("document_text", content.text().unwrap_or(""));
    vars.insert("has_attachment", has_attachment);

    render(prompts, PromptId::ExtractInvoice, &vars)
}

/// Render the read-only query prompt
pub(crate) fn render_query_prompt(
    prompts: &RwLock<PromptLibrary>,
    question: &str,
    snapshot: &str,
    history: &[ChatMessage],
) -> Result<RenderedPrompt> {
    let history_text = history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let mut vars = HashMap::new();
    vars.insert("question", question);
    vars.insert("snapshot", snapshot);
    vars.insert("history", history_text.as_str());

    render(prompts, PromptId::AnswerQuery, &vars)
}

fn render(
    prompts: &RwLock<PromptLibrary>,
    id: PromptId,
    vars: &HashMap<&str, &str>,
) -> Result<RenderedPrompt> {
    let mut prompts = prompts
        .write()
        .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
    let template = prompts.get(id)?;
    Ok(RenderedPrompt {
        system: template.system_section().map(String::from),
        user: template.render_user(vars),
    })
}

/// Read an HTTP error body without failing on a broken stream
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    if body.chars().count() > 500 {
        format!("{}...", body.chars().take(500).collect::<String>())
    } else {
        body
    }
}
