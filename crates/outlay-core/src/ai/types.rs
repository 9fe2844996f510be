//! AI backend request types
//!
//! These types are backend-agnostic and used across all AI implementations.

use serde::Serialize;

/// Content of one invoice as handed to a model
///
/// At least one of `text` or `file_bytes` is expected. `mime_type` describes
/// `file_bytes` and decides how a backend attaches them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentContent {
    pub text: Option<String>,
    #[serde(skip)]
    pub file_bytes: Option<Vec<u8>>,
    pub mime_type: Option<String>,
}

impl DocumentContent {
    /// Text-only content (pasted invoice text, text-based PDF)
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            file_bytes: None,
            mime_type: None,
        }
    }

    /// Raw file content with an optional text layer
    pub fn from_file(bytes: Vec<u8>, mime_type: &str, text: Option<String>) -> Self {
        Self {
            text: text.filter(|t| !t.trim().is_empty()),
            file_bytes: Some(bytes),
            mime_type: Some(mime_type.to_string()),
        }
    }

    /// Text with surrounding whitespace removed, if any remains
    pub fn text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// True when the attached file is an image
    pub fn has_image(&self) -> bool {
        self.file_bytes.is_some()
            && self
                .mime_type
                .as_deref()
                .is_some_and(|m| m.starts_with("image/"))
    }

    /// True when the attached file is a PDF
    pub fn has_pdf(&self) -> bool {
        self.file_bytes.is_some() && self.mime_type.as_deref() == Some("application/pdf")
    }

    /// True when there is nothing for a model to read
    pub fn is_empty(&self) -> bool {
        self.text().is_none() && self.file_bytes.as_ref().map_or(true, |b| b.is_empty())
    }

    /// Cap the text at `max_chars` characters
    pub fn truncate_text(&mut self, max_chars: usize) {
        if let Some(text) = self.text.as_mut() {
            if let Some((idx, _)) = text.char_indices().nth(max_chars) {
                text.truncate(idx);
            }
        }
    }
}
