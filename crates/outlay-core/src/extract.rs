//! Structured invoice extraction
//!
//! One model request per document. The model's answer is already parsed
//! leniently by the backend; this module caps the input and decides whether
//! the result has enough to become an expense.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ai::{AIBackend, DocumentContent};
use crate::error::{Error, Result};
use crate::models::ExtractedInvoiceData;

/// Invoice data with the required fields present
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedInvoice {
    pub company_name: String,
    pub amount: f64,
    #[serde(flatten)]
    pub data: ExtractedInvoiceData,
}

/// Ask the model for invoice fields
///
/// Text beyond `max_text_chars` characters is dropped before the request.
pub async fn extract<B>(
    backend: &B,
    mut content: DocumentContent,
    categories: &[String],
    max_text_chars: usize,
) -> Result<ExtractedInvoiceData>
where
    B: AIBackend + ?Sized,
{
    if content.is_empty() {
        return Err(Error::validation("text", "Invoice content is empty"));
    }

    let original_chars = content.text.as_deref().map_or(0, |t| t.chars().count());
    content.truncate_text(max_text_chars);
    if original_chars > max_text_chars {
        debug!(original_chars, max_text_chars, "Invoice text truncated");
    }

    let data = backend.extract_invoice(&content, categories).await?;

    info!(
        model = backend.model(),
        company = ?data.company_name,
        amount = ?data.amount,
        category = ?data.category,
        new_category = data.is_new_category,
        "Invoice fields extracted"
    );
    Ok(data)
}

/// Require a company name and a positive amount
///
/// The error names every missing field and carries what was extracted.
pub fn validate_required(data: ExtractedInvoiceData) -> Result<ValidatedInvoice> {
    let company_name = data
        .company_name
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from);
    let amount = data.amount.filter(|a| a.is_finite() && *a > 0.0);

    match (company_name, amount) {
        (Some(company_name), Some(amount)) => Ok(ValidatedInvoice {
            company_name,
            amount,
            data,
        }),
        (company_name, amount) => {
            let mut fields = Vec::new();
            if company_name.is_none() {
                fields.push("company_name".to_string());
            }
            if amount.is_none() {
                fields.push("amount".to_string());
            }
            warn!(missing = ?fields, "Extraction is missing required fields");
            Err(Error::MissingFields {
                fields,
                partial: Box::new(data),
            })
        }
    }
}
