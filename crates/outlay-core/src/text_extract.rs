//! Text extraction from stored invoice files
//!
//! PDFs go through `pdf-extract`. Images are passed through untouched for the
//! vision path of the model. PDF problems never become errors here; they are
//! reported as an outcome plus a warning.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::ingest::{FileKind, IngestedFile};

/// Warning attached when a PDF yields almost no text
pub const WARN_IMAGE_BASED_PDF: &str =
    "Very little text found; this is likely an image-based (scanned) PDF";

/// Warning attached when the PDF could not be parsed at all
pub const WARN_PDF_PARSE_FAILED: &str =
    "The PDF could not be read. Try pasting the invoice text into chat instead";

/// How text extraction went
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    /// Enough text for text-only extraction
    Extracted,
    /// Parsed, but below the text threshold
    LikelyImageBased,
    /// The PDF structure could not be parsed
    ParseFailed { reason: String },
    /// Image upload, nothing to extract locally
    ImagePassthrough,
}

/// Result of text extraction for one file
#[derive(Debug, Clone, Serialize)]
pub struct TextExtraction {
    pub text: String,
    pub warnings: Vec<String>,
    pub outcome: ExtractionOutcome,
}

impl TextExtraction {
    /// True when the text alone should be sent to the model
    pub fn has_usable_text(&self) -> bool {
        self.outcome == ExtractionOutcome::Extracted
    }
}

/// Extract text from a stored upload
///
/// Only reading the stored file can fail.
pub async fn extract_text(file: &IngestedFile, min_chars: usize) -> Result<TextExtraction> {
    match file.kind {
        FileKind::Image => Ok(TextExtraction {
            text: String::new(),
            warnings: Vec::new(),
            outcome: ExtractionOutcome::ImagePassthrough,
        }),
        FileKind::Pdf => {
            let bytes = tokio::fs::read(&file.path).await?;
            Ok(extract_pdf_text(bytes, min_chars).await)
        }
    }
}

/// Extract text from PDF bytes on a blocking thread
///
/// Panics inside the PDF library are caught and reported as parse failures.
pub async fn extract_pdf_text(bytes: Vec<u8>, min_chars: usize) -> TextExtraction {
    let parsed = tokio::task::spawn_blocking(move || {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(&bytes)
        }))
    })
    .await;

    let result = match parsed {
        Ok(Ok(Ok(text))) => Ok(text),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(_)) => Err("PDF parser panicked".to_string()),
        Err(e) => Err(format!("PDF extraction task failed: {}", e)),
    };

    classify_pdf_result(result, min_chars)
}

/// Turn a raw PDF parse result into an extraction outcome
pub(crate) fn classify_pdf_result(
    result: std::result::Result<String, String>,
    min_chars: usize,
) -> TextExtraction {
    match result {
        Ok(text) => {
            let trimmed = text.trim();
            let chars = trimmed.chars().count();
            debug!(chars, "PDF text extracted");

            if chars < min_chars {
                warn!(chars, "PDF has little text, likely image-based");
                TextExtraction {
                    text: trimmed.to_string(),
                    warnings: vec![WARN_IMAGE_BASED_PDF.to_string()],
                    outcome: ExtractionOutcome::LikelyImageBased,
                }
            } else {
                TextExtraction {
                    text: trimmed.to_string(),
                    warnings: Vec::new(),
                    outcome: ExtractionOutcome::Extracted,
                }
            }
        }
        Err(reason) => {
            warn!(%reason, "PDF text extraction failed");
            TextExtraction {
                text: String::new(),
                warnings: vec![WARN_PDF_PARSE_FAILED.to_string()],
                outcome: ExtractionOutcome::ParseFailed { reason },
            }
        }
    }
}
