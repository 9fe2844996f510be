//! Invoice pipeline
//!
//! upload -> ingest -> text extraction -> model extraction -> validation ->
//! category reconciliation -> pending expense.
//!
//! Each run is bounded by the configured request timeout. A PDF that yields
//! no usable text is not an error: the file itself goes to the model and
//! the reason is reported as a warning.

use serde::Serialize;
use tracing::{info, warn};

use crate::ai::{AIBackend, AIClient, DocumentContent};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::extract::{extract, validate_required};
use crate::ingest::{FileIngestor, IngestedFile};
use crate::ledger::Ledger;
use crate::models::{Expense, ExtractedInvoiceData, NewExpense};
use crate::reconcile::{reconcile, ReconciledCategory};
use crate::text_extract::{extract_text, ExtractionOutcome};

/// Result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub expense: Expense,
    pub extracted: ExtractedInvoiceData,
    pub category: Option<ReconciledCategory>,
    /// Present for uploads, absent for pasted text
    pub file: Option<IngestedFile>,
    pub extraction: Option<ExtractionOutcome>,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct Pipeline {
    ledger: Ledger,
    ingestor: FileIngestor,
    ai: Option<AIClient>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        ledger: Ledger,
        ingestor: FileIngestor,
        ai: Option<AIClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ledger,
            ingestor,
            ai,
            config,
        }
    }

    pub fn ai(&self) -> Option<&AIClient> {
        self.ai.as_ref()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ingestor(&self) -> &FileIngestor {
        &self.ingestor
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn backend(&self) -> Result<&AIClient> {
        self.ai
            .as_ref()
            .ok_or_else(|| Error::Config("No AI backend is configured".into()))
    }

    /// Run an uploaded invoice file through the pipeline
    pub async fn process_upload(
        &self,
        bytes: Vec<u8>,
        declared_mime: Option<&str>,
        filename: &str,
    ) -> Result<PipelineOutcome> {
        let timeout = self.config.request_timeout();
        tokio::time::timeout(timeout, self.run_upload(bytes, declared_mime, filename))
            .await
            .map_err(|_| {
                warn!(filename, "Invoice upload timed out");
                Error::Timeout(timeout.as_secs())
            })?
    }

    /// Run pasted invoice text through the pipeline
    pub async fn process_text(&self, text: &str) -> Result<PipelineOutcome> {
        let timeout = self.config.request_timeout();
        tokio::time::timeout(timeout, self.run_text(text))
            .await
            .map_err(|_| {
                warn!("Invoice text extraction timed out");
                Error::Timeout(timeout.as_secs())
            })?
    }

    async fn run_upload(
        &self,
        bytes: Vec<u8>,
        declared_mime: Option<&str>,
        filename: &str,
    ) -> Result<PipelineOutcome> {
        // Fail before storing anything when extraction cannot run
        self.backend()?;

        let file = self.ingestor.ingest(&bytes, declared_mime, filename).await?;
        let text = extract_text(&file, self.config.min_pdf_text_chars).await?;

        let content = if text.has_usable_text() {
            DocumentContent::from_text(text.text.clone())
        } else {
            let partial = Some(text.text.clone()).filter(|t| !t.trim().is_empty());
            DocumentContent::from_file(bytes, &file.mime, partial)
        };

        let mut outcome = self
            .extract_and_record(content, Some(file.stored_ref.clone()))
            .await?;
        let mut warnings = text.warnings;
        warnings.append(&mut outcome.warnings);
        outcome.warnings = warnings;
        outcome.extraction = Some(text.outcome);
        outcome.file = Some(file);
        Ok(outcome)
    }

    async fn run_text(&self, text: &str) -> Result<PipelineOutcome> {
        if text.trim().is_empty() {
            return Err(Error::validation("text", "Invoice text cannot be empty"));
        }
        self.extract_and_record(DocumentContent::from_text(text), None)
            .await
    }

    async fn extract_and_record(
        &self,
        content: DocumentContent,
        invoice_url: Option<String>,
    ) -> Result<PipelineOutcome> {
        let backend = self.backend()?;
        let db = self.ledger.db();
        let categories = db.category_names()?;

        let extracted = extract(backend, content, &categories, self.config.max_text_chars).await?;
        let valid = validate_required(extracted)?;

        // Checked before reconcile so a rejected invoice leaves no new category
        let mut new_expense = self.ledger.validate_new_expense(NewExpense {
            category_id: None,
            company_name: Some(valid.company_name.clone()),
            amount: valid.amount,
            sales_email: valid.data.sales_email.clone(),
            due_date: valid.data.due_date,
            invoice_url,
        })?;

        let mut warnings = Vec::new();
        let category = reconcile(
            db,
            valid.data.category.as_deref(),
            valid.data.is_new_category,
            Some(valid.company_name.as_str()),
        )?;
        if category.is_none() {
            if let Some(name) = valid.data.category.as_deref().filter(|n| !n.trim().is_empty()) {
                warnings.push(format!(
                    "Category '{}' is unknown, the expense was left uncategorized",
                    name
                ));
            }
        }

        new_expense.category_id = category.as_ref().map(|c| c.id);
        let expense = self.ledger.create_expense(new_expense)?;

        info!(
            expense_id = expense.id,
            company = %valid.company_name,
            amount = valid.amount,
            category = ?category.as_ref().map(|c| &c.name),
            model = backend.model(),
            "Invoice recorded as pending expense"
        );

        Ok(PipelineOutcome {
            expense,
            extracted: valid.data,
            category,
            file: None,
            extraction: None,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{MockBackend, MockCall};
    use crate::db::Database;
    use crate::models::{ExpenseStatus, NewCategory};
    use std::time::Duration;
    use tempfile::TempDir;

    const INVOICE: &str = "TechSupplies Inc.\nInvoice #12\nTotal: $891.00\n\
                           billing@techsupplies.com\nDue date: 2024-12-15\nCategory: Software";

    fn pipeline(mock: MockBackend, dir: &TempDir) -> Pipeline {
        let db = Database::in_memory().unwrap();
        let ledger = Ledger::new(db, None);
        Pipeline::new(
            ledger,
            FileIngestor::new(dir.path(), 1024 * 1024),
            Some(AIClient::Mock(mock)),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_text_path_creates_pending_expense() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(MockBackend::new(), &dir);
        pipeline
            .ledger
            .db()
            .create_category(&NewCategory {
                name: "Software".to_string(),
                ..Default::default()
            })
            .unwrap();

        let outcome = pipeline.process_text(INVOICE).await.unwrap();
        assert_eq!(outcome.expense.status, ExpenseStatus::Pending);
        assert_eq!(outcome.expense.company_name.as_deref(), Some("TechSupplies Inc."));
        assert_eq!(outcome.expense.amount, 891.0);
        assert_eq!(
            outcome.expense.due_date,
            chrono::NaiveDate::from_ymd_opt(2024, 12, 15)
        );
        let category = outcome.category.unwrap();
        assert_eq!(category.name, "Software");
        assert!(!category.created);
        assert!(outcome.file.is_none());
    }

    #[tokio::test]
    async fn test_missing_fields_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let mock = MockBackend::new().with_extraction_reply("Sorry, I could not find anything.");
        let pipeline = pipeline(mock, &dir);

        let err = pipeline.process_text(INVOICE).await.unwrap_err();
        assert!(matches!(err, Error::MissingFields { ref fields, .. } if fields.len() == 2));
        assert!(pipeline
            .ledger
            .db()
            .list_expenses(&Default::default())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_decorated_sales_email_still_creates_expense() {
        let dir = TempDir::new().unwrap();
        let mock = MockBackend::new().with_extraction_reply(
            r#"{"company_name": "Acme", "amount": 100, "sales_email": "billing@acme.com (Accounts)",
                "category": "Hosting", "isNewCategory": true}"#,
        );
        let pipeline = pipeline(mock, &dir);

        let outcome = pipeline.process_text(INVOICE).await.unwrap();
        assert_eq!(outcome.expense.sales_email.as_deref(), Some("billing@acme.com"));
        assert_eq!(outcome.expense.amount, 100.0);
        let category = outcome.category.unwrap();
        assert!(category.created);
        assert_eq!(outcome.expense.category_id, Some(category.id));
    }

    #[test]
    fn test_validate_new_expense_writes_nothing() {
        let ledger = Ledger::new(Database::in_memory().unwrap(), None);
        let err = ledger
            .validate_new_expense(NewExpense {
                amount: 10.0,
                sales_email: Some("billing at acme".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "sales_email"));
        assert!(ledger.db().list_expenses(&Default::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_category_without_hint_warns() {
        let dir = TempDir::new().unwrap();
        let mock = MockBackend::new().with_extraction_reply(
            r#"{"company_name": "Acme", "amount": "$1,200.00", "category": "Hardware", "isNewCategory": false}"#,
        );
        let pipeline = pipeline(mock, &dir);

        let outcome = pipeline.process_text(INVOICE).await.unwrap();
        assert_eq!(outcome.expense.amount, 1200.0);
        assert!(outcome.category.is_none());
        assert_eq!(outcome.expense.category_id, None);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_image_upload_goes_to_model_as_file() {
        let dir = TempDir::new().unwrap();
        let mock = MockBackend::new()
            .with_extraction_reply(r#"{"company_name": "Blue Bottle", "amount": 18.5}"#);
        let pipeline = pipeline(mock.clone(), &dir);

        let outcome = pipeline
            .process_upload(vec![0x89, b'P', b'N', b'G'], Some("image/png"), "receipt.png")
            .await
            .unwrap();

        let file = outcome.file.unwrap();
        assert!(file.stored_ref.starts_with("/uploads/"));
        assert_eq!(outcome.expense.invoice_url.as_deref(), Some(file.stored_ref.as_str()));
        assert_eq!(outcome.extraction, Some(ExtractionOutcome::ImagePassthrough));

        match &mock.calls()[0] {
            MockCall::Extract { mime_type, text, .. } => {
                assert_eq!(mime_type.as_deref(), Some("image/png"));
                assert!(text.is_none());
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreadable_pdf_warns_and_sends_file() {
        let dir = TempDir::new().unwrap();
        let mock = MockBackend::new()
            .with_extraction_reply(r#"{"company_name": "Scan Co", "amount": 75}"#);
        let pipeline = pipeline(mock.clone(), &dir);

        let outcome = pipeline
            .process_upload(b"not really a pdf".to_vec(), None, "scan.pdf")
            .await
            .unwrap();

        assert!(matches!(
            outcome.extraction,
            Some(ExtractionOutcome::ParseFailed { .. }) | Some(ExtractionOutcome::LikelyImageBased)
        ));
        assert!(!outcome.warnings.is_empty());
        assert!(outcome.warnings[0].contains("PDF"));
        match &mock.calls()[0] {
            MockCall::Extract { mime_type, .. } => {
                assert_eq!(mime_type.as_deref(), Some("application/pdf"))
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_upload_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(MockBackend::new(), &dir);

        let err = pipeline
            .process_upload(b"MZ".to_vec(), Some("application/x-msdownload"), "setup.exe")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFileType { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_without_ai_backend() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            Ledger::new(Database::in_memory().unwrap(), None),
            FileIngestor::new(dir.path(), 1024),
            None,
            PipelineConfig::default(),
        );
        let err = pipeline.process_text(INVOICE).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = TempDir::new().unwrap();
        let db = Database::in_memory().unwrap();
        let pipeline = Pipeline::new(
            Ledger::new(db, None),
            FileIngestor::new(dir.path(), 1024),
            Some(AIClient::Mock(
                MockBackend::new().with_delay(Duration::from_secs(5)),
            )),
            PipelineConfig {
                request_timeout_secs: 1,
                ..Default::default()
            },
        );

        let err = pipeline.process_text(INVOICE).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(1)));
    }
}
