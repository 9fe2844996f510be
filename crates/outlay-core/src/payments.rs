//! Payment provider integration
//!
//! The provider is a black box: it takes a recipient, an amount and a memo and
//! answers with JSON or free text. Failures are surfaced verbatim so the user
//! sees exactly what the provider said. Nothing here retries.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::PaymentsConfig;
use crate::error::{Error, Result};

/// One payment to send
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRequest {
    pub recipient_email: String,
    pub amount: f64,
    pub memo: Option<String>,
    pub currency: String,
}

/// What the provider told us about an accepted payment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub transaction_id: Option<String>,
    pub message: Option<String>,
}

/// Anything that can move money
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Send a payment; `Err(PaymentFailed)` carries the provider's own words
    async fn send_payment(&self, request: &PaymentRequest) -> Result<PaymentReceipt>;

    /// Method recorded on payment rows (e.g. "usdc")
    fn payment_method(&self) -> &str;

    /// Currency sent with every request
    fn currency(&self) -> &str;
}

/// Pulls provider transaction identifiers out of free text
#[derive(Debug, Clone)]
pub struct TransactionIdExtractor {
    chain_hash: Regex,
    labelled: Regex,
}

impl TransactionIdExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            chain_hash: Regex::new(r"\b0x[0-9a-fA-F]{64}\b")?,
            labelled: Regex::new(
                r"(?i)\b(?:transaction|tx)(?:[ _-]?(?:id|hash|ref(?:erence)?))?\s*(?:is\s+)?[:=#]?\s*([A-Za-z0-9][A-Za-z0-9_-]{5,})",
            )?,
        })
    }

    /// First transaction id in `text`; chain hashes win over labelled ids
    pub fn extract(&self, text: &str) -> Option<String> {
        if let Some(m) = self.chain_hash.find(text) {
            return Some(m.as_str().to_string());
        }
        self.labelled
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .find(|id| id.chars().any(|c| c.is_ascii_digit()))
            .map(String::from)
    }
}

/// Interpret a provider reply
///
/// JSON `{success, transaction_id?, message?}` or free text. A non-2xx status
/// or `success: false` is a failure carrying the provider message verbatim.
pub fn parse_payment_response(
    status_ok: bool,
    body: &str,
    extractor: &TransactionIdExtractor,
) -> Result<PaymentReceipt> {
    let trimmed = body.trim();

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(trimmed) {
        let message = ["message", "error", "detail"]
            .iter()
            .find_map(|k| object.get(*k))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Object(inner) => inner
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from),
                _ => None,
            });
        let success = object
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(status_ok);

        if !status_ok || !success {
            return Err(Error::PaymentFailed(
                message.unwrap_or_else(|| trimmed.to_string()),
            ));
        }

        let transaction_id = ["transaction_id", "transactionId", "tx_hash", "id"]
            .iter()
            .find_map(|k| object.get(*k))
            .and_then(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .or_else(|| message.as_deref().and_then(|m| extractor.extract(m)));

        return Ok(PaymentReceipt {
            transaction_id,
            message,
        });
    }

    if !status_ok {
        let message = if trimmed.is_empty() {
            "Payment provider rejected the payment".to_string()
        } else {
            trimmed.to_string()
        };
        return Err(Error::PaymentFailed(message));
    }

    Ok(PaymentReceipt {
        transaction_id: extractor.extract(trimmed),
        message: (!trimmed.is_empty()).then(|| trimmed.to_string()),
    })
}

/// Payment provider reached over HTTP
///
/// `POST {base_url}/payments` with a bearer key.
#[derive(Clone)]
pub struct HttpPaymentProvider {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    currency: String,
    payment_method: String,
    extractor: TransactionIdExtractor,
}

impl HttpPaymentProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        currency: &str,
        payment_method: &str,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http_client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
            currency: currency.to_string(),
            payment_method: payment_method.to_string(),
            extractor: TransactionIdExtractor::new()?,
        })
    }

    /// Build from the `[payments]` section; `None` when no URL is configured
    pub fn from_config(config: &PaymentsConfig) -> Result<Option<Self>> {
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
            &config.currency,
            &config.payment_method,
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn send_payment(&self, request: &PaymentRequest) -> Result<PaymentReceipt> {
        debug!(
            recipient = %request.recipient_email,
            amount = request.amount,
            currency = %request.currency,
            "Sending payment request"
        );

        let mut req_builder = self
            .http_client
            .post(format!("{}/payments", self.base_url))
            .json(request);
        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        let response = req_builder.send().await.map_err(|e| {
            error!("Payment provider unreachable: {}", e);
            Error::PaymentFailed(format!("Payment provider unreachable: {}", e))
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let result = parse_payment_response(status.is_success(), &body, &self.extractor);
        match &result {
            Ok(receipt) => info!(
                recipient = %request.recipient_email,
                amount = request.amount,
                transaction_id = ?receipt.transaction_id,
                "Payment accepted by provider"
            ),
            Err(e) => error!(%status, %body, "Payment rejected by provider: {}", e),
        }
        result
    }

    fn payment_method(&self) -> &str {
        &self.payment_method
    }

    fn currency(&self) -> &str {
        &self.currency
    }
}

/// In-memory payment provider for tests and offline use
#[derive(Clone, Default)]
pub struct MockPaymentProvider {
    fail_with: Option<String>,
    delay: Option<Duration>,
    sent: Arc<Mutex<Vec<PaymentRequest>>>,
}

impl MockPaymentProvider {
    /// A provider that accepts every payment
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that rejects every payment with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    /// Sleep before answering, like a real network call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far, accepted or not
    pub fn sent(&self) -> Vec<PaymentRequest> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn send_payment(&self, request: &PaymentRequest) -> Result<PaymentReceipt> {
        let count = match self.sent.lock() {
            Ok(mut sent) => {
                sent.push(request.clone());
                sent.len()
            }
            Err(_) => 0,
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.fail_with {
            return Err(Error::PaymentFailed(message.clone()));
        }

        Ok(PaymentReceipt {
            transaction_id: Some(format!("mock-tx-{:06}", count)),
            message: Some(format!(
                "Sent {:.2} {} to {}",
                request.amount, request.currency, request.recipient_email
            )),
        })
    }

    fn payment_method(&self) -> &str {
        "mock"
    }

    fn currency(&self) -> &str {
        "USDC"
    }
}
