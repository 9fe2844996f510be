//! Error types for Outlay

use thiserror::Error;

use crate::models::{ExpenseStatus, ExtractedInvoiceData, Payment};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Unsupported file type '{mime}' for {filename}. Upload a PDF, JPEG, PNG, GIF or WebP")]
    UnsupportedFileType { mime: String, filename: String },

    #[error("Could not extract required fields: {}", fields.join(", "))]
    MissingFields {
        fields: Vec<String>,
        partial: Box<ExtractedInvoiceData>,
    },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("{0}")]
    PaymentFailed(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Expense #{0} is already paid")]
    AlreadyPaid(i64),

    /// The provider accepted a payment but another request settled the expense first
    #[error(
        "Expense #{id} was settled by another request. Payment #{} ({}) was recorded but not applied",
        payment.id,
        payment.transaction_id.as_deref().unwrap_or("no transaction id")
    )]
    PaymentNotApplied { id: i64, payment: Box<Payment> },

    #[error("Expense #{id} is {from} and cannot become {to}")]
    InvalidTransition {
        id: i64,
        from: ExpenseStatus,
        to: ExpenseStatus,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    /// Shorthand for a field validation failure
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
