//! Mock backend for testing
//!
//! Without a script it reads invoice text the way a cooperative model would
//! and answers in prose-wrapped JSON, so the real response parser is
//! exercised. Scripted replies, failures and request recording cover the
//! rest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::error::{Error, Result};
use crate::models::{ChatMessage, ExtractedInvoiceData};

use super::parsing::parse_invoice_response;
use super::types::DocumentContent;
use super::AIBackend;

/// A call made against the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Extract {
        text: Option<String>,
        mime_type: Option<String>,
        categories: Vec<String>,
    },
    Query {
        question: String,
        history_len: usize,
    },
}

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    extraction_reply: Option<String>,
    query_reply: Option<String>,
    fail_with: Option<String>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Self::default()
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self::default()
    }

    /// Answer every extraction with this raw model text
    pub fn with_extraction_reply(mut self, reply: impl Into<String>) -> Self {
        self.extraction_reply = Some(reply.into());
        self
    }

    /// Answer every query with this text
    pub fn with_query_reply(mut self, reply: impl Into<String>) -> Self {
        self.query_reply = Some(reply.into());
        self
    }

    /// Fail every call with a provider error
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    /// Sleep before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: MockCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    async fn before_reply(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail_with {
            Some(message) => Err(Error::Provider(message.clone())),
            None => Ok(()),
        }
    }
}

/// Build the reply a cooperative model would give for invoice text
fn heuristic_reply(content: &DocumentContent, categories: &[String]) -> String {
    let Some(text) = content.text() else {
        return "I cannot read this document.".to_string();
    };

    let capture = |pattern: &str| -> Option<String> {
        Regex::new(pattern)
            .ok()
            .and_then(|re| re.captures(text))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
    };

    let company = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.eq_ignore_ascii_case("invoice"));
    let amount = capture(r"(?i)(?:total|amount due|balance due)\s*:?\s*\$?\s*([\d,]+(?:\.\d+)?)");
    let email = capture(r"([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})");
    let due_date = capture(r"(?i)due date\s*:?\s*([^\n]+)");
    let category_hint = capture(r"(?i)category\s*:?\s*([^\n]+)");

    let (category, is_new) = match category_hint {
        Some(hint) => {
            let existing = categories.iter().find(|c| c.eq_ignore_ascii_case(&hint));
            match existing {
                Some(name) => (Some(name.clone()), false),
                None => (Some(hint), true),
            }
        }
        None => (categories.first().cloned(), false),
    };

    let object = json!({
        "company_name": company,
        "amount": amount,
        "sales_email": email,
        "due_date": due_date,
        "category": category,
        "isNewCategory": is_new,
    });
    format!("Here is the extracted data:\n```json\n{}\n```", object)
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn extract_invoice(
        &self,
        content: &DocumentContent,
        categories: &[String],
    ) -> Result<ExtractedInvoiceData> {
        self.record(MockCall::Extract {
            text: content.text().map(String::from),
            mime_type: content.mime_type.clone(),
            categories: categories.to_vec(),
        });
        self.before_reply().await?;

        let reply = match &self.extraction_reply {
            Some(reply) => reply.clone(),
            None => heuristic_reply(content, categories),
        };
        Ok(parse_invoice_response(&reply))
    }

    async fn answer_query(
        &self,
        question: &str,
        _snapshot: &str,
        history: &[ChatMessage],
    ) -> Result<String> {
        self.record(MockCall::Query {
            question: question.to_string(),
            history_len: history.len(),
        });
        self.before_reply().await?;

        Ok(self
            .query_reply
            .clone()
            .unwrap_or_else(|| format!("Mock answer to: {}", question)))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
