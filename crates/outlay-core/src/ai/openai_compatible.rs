//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! - OpenAI itself (https://api.openai.com)
//! - vLLM (http://localhost:8000)
//! - LocalAI (http://localhost:8080)
//! - llama-server / llama.cpp (http://localhost:8080)
//!
//! Images are sent as `image_url` data URLs. The chat completions API has no
//! PDF input, so a PDF without a text layer reaches the model as the prompt
//! alone and usually comes back with missing fields.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::models::{ChatMessage, ExtractedInvoiceData};
use crate::prompts::PromptLibrary;

use super::parsing::parse_invoice_response;
use super::types::DocumentContent;
use super::{error_body, render_extraction_prompt, render_query_prompt, AIBackend, RenderedPrompt};

/// OpenAI-compatible backend
///
/// Works with any server implementing the OpenAI `/v1/chat/completions` API.
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(String::from),
            max_tokens,
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        })
    }

    /// Use a specific prompt library (tests, custom override dirs)
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Arc::new(RwLock::new(prompts));
        self
    }

    /// Make a chat completion request
    async fn chat_completion(&self, prompt: RenderedPrompt, image: Option<ImageUrl>) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = prompt.system {
            messages.push(CompletionMessage {
                role: "system".to_string(),
                content: ChatContent::Text(system),
            });
        }

        let content = match image {
            Some(image_url) => ChatContent::Parts(vec![
                ContentPart::Text { text: prompt.user },
                ContentPart::ImageUrl { image_url },
            ]),
            None => ChatContent::Text(prompt.user),
        };
        messages.push(CompletionMessage {
            role: "user".to_string(),
            content,
        });

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            error!(%status, %body, "OpenAI-compatible API request failed");
            return Err(Error::Provider(format!(
                "OpenAI-compatible API error ({}): {}",
                status, body
            )));
        }

        let chat_response: ChatCompletionResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Provider("No response from OpenAI-compatible API".into()))
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<CompletionMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct CompletionMessage {
    role: String,
    content: ChatContent,
}

/// Chat message content (text or multimodal)
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Content part for multimodal messages
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

/// Image URL for vision requests
#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

impl ImageUrl {
    fn data_url(mime: &str, bytes: &[u8]) -> Self {
        Self {
            url: format!(
                "data:{};base64,{}",
                mime,
                base64::engine::general_purpose::STANDARD.encode(bytes)
            ),
        }
    }
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn extract_invoice(
        &self,
        content: &DocumentContent,
        categories: &[String],
    ) -> Result<ExtractedInvoiceData> {
        let prompt = render_extraction_prompt(&self.prompts, content, categories)?;

        let image = match (&content.file_bytes, content.mime_type.as_deref()) {
            (Some(bytes), Some(mime)) if content.has_image() => Some(ImageUrl::data_url(mime, bytes)),
            _ => {
                if content.has_pdf() && content.text().is_none() {
                    warn!("PDF without text layer sent to a backend that cannot read PDFs");
                }
                None
            }
        };

        let response = self.chat_completion(prompt, image).await?;
        debug!("OpenAI-compatible extraction response: {}", response);

        Ok(parse_invoice_response(&response))
    }

    async fn answer_query(
        &self,
        question: &str,
        snapshot: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        let prompt = render_query_prompt(&self.prompts, question, snapshot, history)?;
        let response = self.chat_completion(prompt, None).await?;
        Ok(response.trim().to_string())
    }

    async fn health_check(&self) -> bool {
        let mut req_builder = self
            .http_client
            .get(format!("{}/v1/models", self.base_url));
        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        if let Ok(resp) = req_builder.send().await {
            if resp.status().is_success() {
                return true;
            }
        }

        // Try /health (common for LocalAI, llama-server)
        if let Ok(resp) = self
            .http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            if resp.status().is_success() {
                return true;
            }
        }

        false
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
