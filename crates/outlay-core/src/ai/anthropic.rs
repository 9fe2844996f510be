//! Anthropic Messages API backend
//!
//! Sends one `/v1/messages` request per task. Images go as base64 `image`
//! blocks and PDFs as base64 `document` blocks, so scanned invoices can be
//! read without a local OCR step.
//!
//! # Configuration
//!
//! - `ANTHROPIC_API_KEY`: API key (required)
//! - `ANTHROPIC_HOST`: API base URL (default: https://api.anthropic.com)
//! - `ANTHROPIC_MODEL`: Model name

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::models::{ChatMessage, ExtractedInvoiceData};
use crate::prompts::PromptLibrary;

use super::parsing::parse_invoice_response;
use super::types::DocumentContent;
use super::{error_body, render_extraction_prompt, render_query_prompt, AIBackend};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API request
#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Message in conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String, // "user", "assistant"
    pub content: MessageContent,
}

impl Message {
    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// Create a user message with content blocks
    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Blocks(blocks),
        }
    }
}

/// Message content (text or blocks)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Request content block types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "image")]
    Image { source: Base64Source },

    #[serde(rename = "document")]
    Document { source: Base64Source },
}

impl ContentBlock {
    /// Create a text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a base64 image block
    pub fn image(media_type: &str, data: &[u8]) -> Self {
        Self::Image {
            source: Base64Source::new(media_type, data),
        }
    }

    /// Create a base64 PDF document block
    pub fn pdf(data: &[u8]) -> Self {
        Self::Document {
            source: Base64Source::new("application/pdf", data),
        }
    }
}

/// Inline base64 payload for image and document blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Base64Source {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

impl Base64Source {
    fn new(media_type: &str, data: &[u8]) -> Self {
        Self {
            source_type: "base64".into(),
            media_type: media_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(data),
        }
    }
}

/// Anthropic Messages API response
#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ResponseBlock>,
    pub model: Option<String>,
    pub stop_reason: Option<String>, // "end_turn", "max_tokens"
    pub usage: Option<Usage>,
}

/// Response content block; anything other than text is ignored
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl MessagesResponse {
    /// Extract text content from the response
    pub fn text(&self) -> Option<String> {
        let texts: Vec<_> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.as_str()),
                ResponseBlock::Other => None,
            })
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }
}

/// Anthropic Messages API backend
#[derive(Clone)]
pub struct AnthropicBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl AnthropicBackend {
    /// Create a new backend with a per-request timeout
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            max_tokens,
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        })
    }

    /// Use a specific prompt library (tests, custom override dirs)
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Arc::new(RwLock::new(prompts));
        self
    }

    /// Send a messages request and return the text of the reply
    pub async fn messages(&self, system: Option<&str>, messages: Vec<Message>) -> Result<String> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages,
            system: system.map(String::from),
            temperature: Some(0.0),
        };

        debug!(model = %self.model, "Sending Anthropic messages request");

        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            error!(%status, %body, "Anthropic API request failed");
            return Err(Error::Provider(format!(
                "Anthropic API error ({}): {}",
                status, body
            )));
        }

        let messages_response: MessagesResponse = response.json().await?;

        debug!(
            stop_reason = ?messages_response.stop_reason,
            output_tokens = messages_response.usage.as_ref().map(|u| u.output_tokens),
            "Received Anthropic response"
        );

        messages_response
            .text()
            .ok_or_else(|| Error::Provider("Anthropic API returned no text".into()))
    }
}

#[async_trait]
impl AIBackend for AnthropicBackend {
    async fn extract_invoice(
        &self,
        content: &DocumentContent,
        categories: &[String],
    ) -> Result<ExtractedInvoiceData> {
        let prompt = render_extraction_prompt(&self.prompts, content, categories)?;

        let mut blocks = Vec::new();
        if let (Some(bytes), Some(mime)) = (&content.file_bytes, content.mime_type.as_deref()) {
            if content.has_image() {
                blocks.push(ContentBlock::image(mime, bytes));
            } else if content.has_pdf() {
                blocks.push(ContentBlock::pdf(bytes));
            }
        }
        blocks.push(ContentBlock::text(prompt.user));

        let response = self
            .messages(prompt.system.as_deref(), vec![Message::user_blocks(blocks)])
            .await?;
        debug!("Anthropic extraction response: {}", response);

        Ok(parse_invoice_response(&response))
    }

    async fn answer_query(
        &self,
        question: &str,
        snapshot: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        let prompt = render_query_prompt(&self.prompts, question, snapshot, history)?;
        let response = self
            .messages(prompt.system.as_deref(), vec![Message::user(prompt.user)])
            .await?;
        Ok(response.trim().to_string())
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
