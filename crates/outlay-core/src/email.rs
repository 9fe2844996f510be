//! Outbound email
//!
//! Only user-initiated sends go through here (`POST /api/email`). The expense
//! pipeline never emails anyone.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::config::EmailConfig;
use crate::error::{Error, Result};

/// An email to send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Falls back to the configured sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl OutgoingEmail {
    /// Check recipient, subject and body before anything is sent
    pub fn validate(&self) -> Result<()> {
        let to = self.to.trim();
        if to.is_empty() || !to.contains('@') || to.contains(char::is_whitespace) {
            return Err(Error::validation("to", "A valid recipient email is required"));
        }
        if self.subject.trim().is_empty() {
            return Err(Error::validation("subject", "Subject cannot be empty"));
        }
        let has_body = [&self.text, &self.html]
            .iter()
            .any(|b| b.as_deref().is_some_and(|s| !s.trim().is_empty()));
        if !has_body {
            return Err(Error::validation("text", "Either text or html is required"));
        }
        Ok(())
    }
}

/// Provider acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailReceipt {
    pub message_id: Option<String>,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<EmailReceipt>;
}

/// Email API reached over HTTP
///
/// `POST {base_url}/emails` with `{from, to, subject, text|html}`, answered
/// with `{id}` or `{success, messageId}`.
#[derive(Clone)]
pub struct HttpEmailSender {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    default_from: Option<String>,
}

#[derive(Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
}

impl HttpEmailSender {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        default_from: Option<&str>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        Ok(Self {
            http_client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
            default_from: default_from.map(String::from),
        })
    }

    /// Build from the `[email]` section; `None` when no URL is configured
    pub fn from_config(config: &EmailConfig) -> Result<Option<Self>> {
        let Some(base_url) = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        else {
            return Ok(None);
        };

        Self::new(
            base_url,
            config.api_key.as_deref().filter(|k| !k.trim().is_empty()),
            config.from.as_deref(),
            std::time::Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<EmailReceipt> {
        email.validate()?;
        let from = email
            .from
            .as_deref()
            .or(self.default_from.as_deref())
            .ok_or_else(|| Error::validation("from", "No sender address configured"))?;

        let body = SendEmailBody {
            from,
            to: email.to.trim(),
            subject: &email.subject,
            text: email.text.as_deref(),
            html: email.html.as_deref(),
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/emails", self.base_url))
            .json(&body);
        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        let response = req_builder.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let parsed: Option<Value> = serde_json::from_str(&text).ok();

        let explicit_failure = parsed
            .as_ref()
            .and_then(|v| v.get("success"))
            .and_then(Value::as_bool)
            == Some(false);

        if !status.is_success() || explicit_failure {
            let message = parsed
                .as_ref()
                .and_then(|v| {
                    ["message", "error"]
                        .iter()
                        .find_map(|k| v.get(*k).and_then(Value::as_str))
                })
                .map(String::from)
                .unwrap_or(text);
            error!(%status, to = %email.to, "Email provider rejected send: {}", message);
            return Err(Error::Provider(format!(
                "Email provider error ({}): {}",
                status, message
            )));
        }

        let message_id = parsed.as_ref().and_then(|v| {
            ["id", "messageId", "message_id"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str))
                .map(String::from)
        });
        info!(to = %email.to, message_id = ?message_id, "Email sent");

        Ok(EmailReceipt { message_id })
    }
}

/// Collects emails in memory instead of sending them
#[derive(Clone, Default)]
pub struct MockEmailSender {
    outbox: Arc<Mutex<Vec<OutgoingEmail>>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outbox(&self) -> Vec<OutgoingEmail> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<EmailReceipt> {
        email.validate()?;
        let count = match self.outbox.lock() {
            Ok(mut outbox) => {
                outbox.push(email.clone());
                outbox.len()
            }
            Err(_) => 0,
        };
        Ok(EmailReceipt {
            message_id: Some(format!("mock-email-{}", count)),
        })
    }
}
