//! Outlay Core Library
//!
//! Shared functionality for the Outlay expense tool:
//! - Database access and migrations
//! - Invoice ingestion and PDF text extraction
//! - Pluggable language model backends (Anthropic, OpenAI-compatible)
//! - Structured invoice extraction and category reconciliation
//! - Expense/payment state machine with pluggable payment providers
//! - Chat command routing
//! - Prompt library for customizable AI prompts

pub mod ai;
pub mod chat;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod ledger;
pub mod models;
pub mod payments;
pub mod pipeline;
pub mod prompts;
pub mod reconcile;
pub mod router;
pub mod text_extract;
pub mod tools;

/// Test utilities including a mock model server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    AIBackend, AIClient, AnthropicBackend, DocumentContent, MockBackend, MockCall,
    OpenAICompatibleBackend,
};
pub use chat::{ChatReply, ChatService};
pub use config::Config;
pub use db::{AuditEntry, Database, PaymentRecord};
pub use email::{EmailReceipt, EmailSender, HttpEmailSender, MockEmailSender, OutgoingEmail};
pub use error::{Error, Result};
pub use extract::{extract, validate_required, ValidatedInvoice};
pub use ingest::{FileIngestor, FileKind, IngestedFile};
pub use ledger::{Ledger, PayRequest, PaymentOutcome};
pub use models::*;
pub use payments::{
    HttpPaymentProvider, MockPaymentProvider, PaymentProvider, PaymentReceipt, PaymentRequest,
};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use prompts::{Prompt, PromptId, PromptLibrary, PromptMetadata};
pub use reconcile::{reconcile, ReconciledCategory};
pub use router::{CommandIntent, CommandRouter};
pub use text_extract::{ExtractionOutcome, TextExtraction};
