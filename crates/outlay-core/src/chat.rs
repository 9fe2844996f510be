//! Chat command dispatch
//!
//! Routes each message, runs the matching operation and stores both turns
//! in the chat history. General questions are answered from a read-only
//! snapshot and never change expenses or payments.

use serde::Serialize;
use tracing::{info, warn};

use crate::ai::AIBackend;
use crate::error::{Error, Result};
use crate::ledger::{Ledger, PayRequest, PaymentOutcome};
use crate::models::{ChatRole, Expense, NewExpense, Payment};
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::router::{CommandIntent, CommandRouter};
use crate::tools::snapshot_json;

/// Audit actor for changes made through chat
pub const CHAT_ACTOR: &str = "chat";

/// The assistant's answer to one message
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub intent: CommandIntent,
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense: Option<Expense>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ChatReply {
    fn text(intent: CommandIntent, reply: String) -> Self {
        Self {
            intent,
            reply,
            expense: None,
            payment: None,
            warnings: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct ChatService {
    ledger: Ledger,
    pipeline: Pipeline,
    router: CommandRouter,
}

fn payment_reply(outcome: &PaymentOutcome) -> String {
    let recipient = outcome
        .payment
        .recipient_email
        .as_deref()
        .unwrap_or("the vendor");
    let mut reply = format!(
        "Paid ${:.2} to {} for expense #{}.",
        outcome.payment.amount, recipient, outcome.expense.id
    );
    if let Some(tx) = &outcome.payment.transaction_id {
        reply.push_str(&format!(" Transaction: {}", tx));
    }
    reply
}

fn invoice_reply(outcome: &PipelineOutcome) -> String {
    let expense = &outcome.expense;
    let mut reply = format!(
        "Recorded expense #{}: {} for ${:.2}",
        expense.id,
        expense.company_name.as_deref().unwrap_or("unknown vendor"),
        expense.amount
    );
    if let Some(due) = expense.due_date {
        reply.push_str(&format!(", due {}", due));
    }
    match &outcome.category {
        Some(category) if category.created => {
            reply.push_str(&format!(", filed under new category {}", category.name))
        }
        Some(category) => reply.push_str(&format!(", filed under {}", category.name)),
        None => reply.push_str(", uncategorized"),
    }
    reply.push_str(". It is pending payment.");
    reply
}

/// Errors the user can act on are echoed into the history
fn user_facing(err: &Error) -> Option<String> {
    match err {
        Error::Validation { .. }
        | Error::MissingFields { .. }
        | Error::PaymentFailed(_)
        | Error::AlreadyPaid(_)
        | Error::PaymentNotApplied { .. }
        | Error::InvalidTransition { .. }
        | Error::NotFound(_)
        | Error::Timeout(_) => Some(format!("Sorry, that didn't work: {}", err)),
        _ => None,
    }
}

impl ChatService {
    pub fn new(ledger: Ledger, pipeline: Pipeline) -> Result<Self> {
        Ok(Self {
            ledger,
            pipeline,
            router: CommandRouter::new()?,
        })
    }

    /// Handle one chat message
    pub async fn handle(&self, message: &str) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::validation("message", "Message cannot be empty"));
        }

        let db = self.ledger.db();
        // History before this turn
        let history = db.recent_chat_messages(self.pipeline.config().chat_history_turns)?;
        db.append_chat_message(ChatRole::User, message)?;

        let intent = self.router.route(message);
        info!(intent = intent.name(), "Chat message routed");

        let result = match &intent {
            CommandIntent::PayById { expense_id } => self.pay_by_id(intent.clone(), *expense_id).await,
            CommandIntent::PayByEmail { amount, email } => {
                self.pay_by_email(intent.clone(), *amount, email).await
            }
            CommandIntent::InvoiceText { text } => self.invoice_text(intent.clone(), text).await,
            CommandIntent::GeneralQuery { text } => {
                self.general_query(intent.clone(), text, &history).await
            }
        };

        match result {
            Ok(reply) => {
                db.append_chat_message(ChatRole::Assistant, &reply.reply)?;
                Ok(reply)
            }
            Err(err) => {
                warn!(intent = intent.name(), "Chat command failed: {}", err);
                if let Some(text) = user_facing(&err) {
                    db.append_chat_message(ChatRole::Assistant, &text)?;
                }
                Err(err)
            }
        }
    }

    async fn pay_by_id(&self, intent: CommandIntent, expense_id: i64) -> Result<ChatReply> {
        let outcome = self
            .ledger
            .pay(
                expense_id,
                PayRequest {
                    memo: Some(format!("Payment for expense #{}", expense_id)),
                    ..Default::default()
                },
            )
            .await?;
        self.audit_payment(&outcome)?;

        Ok(ChatReply {
            reply: payment_reply(&outcome),
            expense: Some(outcome.expense),
            payment: Some(outcome.payment),
            ..ChatReply::text(intent, String::new())
        })
    }

    async fn pay_by_email(
        &self,
        intent: CommandIntent,
        amount: f64,
        email: &str,
    ) -> Result<ChatReply> {
        let db = self.ledger.db();
        let expense = match db.find_pending_expense_by_email(email, Some(amount))? {
            Some(expense) => expense,
            None => {
                let created = self.ledger.create_expense(NewExpense {
                    amount,
                    sales_email: Some(email.to_string()),
                    ..Default::default()
                })?;
                db.log_audit(
                    CHAT_ACTOR,
                    "create",
                    Some("expense"),
                    Some(created.id),
                    Some(&format!("pending expense for payment to {}", email)),
                )?;
                created
            }
        };

        let outcome = self
            .ledger
            .pay(
                expense.id,
                PayRequest {
                    recipient_email: Some(email.to_string()),
                    amount: Some(amount),
                    memo: Some(format!("Payment for expense #{}", expense.id)),
                },
            )
            .await?;
        self.audit_payment(&outcome)?;

        Ok(ChatReply {
            reply: payment_reply(&outcome),
            expense: Some(outcome.expense),
            payment: Some(outcome.payment),
            ..ChatReply::text(intent, String::new())
        })
    }

    async fn invoice_text(&self, intent: CommandIntent, text: &str) -> Result<ChatReply> {
        let outcome = self.pipeline.process_text(text).await?;
        self.ledger.db().log_audit(
            CHAT_ACTOR,
            "create",
            Some("expense"),
            Some(outcome.expense.id),
            Some("extracted from pasted invoice text"),
        )?;

        let mut reply = invoice_reply(&outcome);
        for warning in &outcome.warnings {
            reply.push_str(&format!("\nNote: {}", warning));
        }

        Ok(ChatReply {
            reply,
            expense: Some(outcome.expense),
            warnings: outcome.warnings,
            ..ChatReply::text(intent, String::new())
        })
    }

    async fn general_query(
        &self,
        intent: CommandIntent,
        question: &str,
        history: &[crate::models::ChatMessage],
    ) -> Result<ChatReply> {
        let backend = self
            .pipeline
            .ai()
            .ok_or_else(|| Error::Config("No AI backend is configured".into()))?;
        let snapshot = snapshot_json(self.ledger.db())?;

        let timeout = self.pipeline.config().request_timeout();
        let answer = tokio::time::timeout(timeout, backend.answer_query(question, &snapshot, history))
            .await
            .map_err(|_| Error::Timeout(timeout.as_secs()))??;

        Ok(ChatReply::text(intent, answer.trim().to_string()))
    }

    fn audit_payment(&self, outcome: &PaymentOutcome) -> Result<()> {
        let details = serde_json::json!({
            "amount": outcome.payment.amount,
            "recipient_email": outcome.payment.recipient_email,
            "transaction_id": outcome.payment.transaction_id,
        })
        .to_string();
        self.ledger.db().log_audit(
            CHAT_ACTOR,
            "pay",
            Some("expense"),
            Some(outcome.expense.id),
            Some(&details),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AIClient, MockBackend, MockCall};
    use crate::config::PipelineConfig;
    use crate::db::Database;
    use crate::ingest::FileIngestor;
    use crate::models::ExpenseStatus;
    use crate::payments::MockPaymentProvider;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Harness {
        service: ChatService,
        db: Database,
        provider: MockPaymentProvider,
        mock: MockBackend,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let db = Database::in_memory().unwrap();
        let provider = MockPaymentProvider::new();
        let mock = MockBackend::new().with_query_reply("You have spent $0.00 so far.");
        let ledger = Ledger::new(db.clone(), Some(Arc::new(provider.clone())));
        let pipeline = Pipeline::new(
            ledger.clone(),
            FileIngestor::new(dir.path(), 1024 * 1024),
            Some(AIClient::Mock(mock.clone())),
            PipelineConfig::default(),
        );
        Harness {
            service: ChatService::new(ledger, pipeline).unwrap(),
            db,
            provider,
            mock,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_pay_by_id() {
        let h = harness();
        let id = h
            .db
            .insert_expense(&NewExpense {
                company_name: Some("Acme".to_string()),
                amount: 120.0,
                sales_email: Some("ar@acme.com".to_string()),
                ..Default::default()
            })
            .unwrap();

        let reply = h.service.handle(&format!("pay expense #{}", id)).await.unwrap();
        assert!(reply.reply.starts_with("Paid $120.00 to ar@acme.com"));
        assert_eq!(reply.expense.unwrap().status, ExpenseStatus::Paid);
        assert_eq!(
            h.provider.sent()[0].memo.as_deref(),
            Some(format!("Payment for expense #{}", id).as_str())
        );

        let audit = h.db.list_audit_log(10).unwrap();
        assert_eq!(audit[0].actor, "chat");
        assert_eq!(audit[0].action, "pay");
    }

    #[tokio::test]
    async fn test_pay_twice_records_one_payment() {
        let h = harness();
        let id = h
            .db
            .insert_expense(&NewExpense {
                amount: 10.0,
                sales_email: Some("a@b.com".to_string()),
                ..Default::default()
            })
            .unwrap();

        h.service.handle(&format!("pay invoice {}", id)).await.unwrap();
        let err = h.service.handle(&format!("pay invoice {}", id)).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyPaid(_)));
        assert_eq!(h.db.list_payments().unwrap().len(), 1);

        // The failure is answered in the history
        let history = h.db.recent_chat_messages(10).unwrap();
        assert_eq!(history.len(), 4);
        assert!(history[3].content.contains("already paid"));
    }

    #[tokio::test]
    async fn test_pay_by_email_prefers_matching_amount() {
        let h = harness();
        let older = h
            .db
            .insert_expense(&NewExpense {
                amount: 250.0,
                sales_email: Some("Billing@Vendor.com".to_string()),
                ..Default::default()
            })
            .unwrap();
        h.db.insert_expense(&NewExpense {
            amount: 99.0,
            sales_email: Some("billing@vendor.com".to_string()),
            ..Default::default()
        })
        .unwrap();

        let reply = h
            .service
            .handle("send $250 to billing@vendor.com")
            .await
            .unwrap();
        assert_eq!(reply.expense.unwrap().id, older);
        assert_eq!(reply.payment.unwrap().amount, 250.0);
    }

    #[tokio::test]
    async fn test_pay_by_email_creates_expense_when_none_pending() {
        let h = harness();
        let reply = h
            .service
            .handle("send $1,000.50 USDC to new@vendor.com")
            .await
            .unwrap();

        let expense = reply.expense.unwrap();
        assert_eq!(expense.status, ExpenseStatus::Paid);
        assert_eq!(expense.amount, 1000.5);
        assert_eq!(expense.company_name, None);
        assert_eq!(h.db.list_expenses(&Default::default()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invoice_text_creates_pending_expense() {
        let h = harness();
        let text = "Acme Cloud\nInvoice 2024-88\nAmount due: $1,499.00\n\
                    Contact ar@acmecloud.io\nDue date: 2025-01-31\nCategory: Hosting";

        let reply = h.service.handle(text).await.unwrap();
        assert_eq!(reply.intent.name(), "invoice_text");
        let expense = reply.expense.unwrap();
        assert_eq!(expense.status, ExpenseStatus::Pending);
        assert_eq!(expense.amount, 1499.0);
        assert!(reply.reply.contains("new category Hosting"));
        assert!(h.provider.sent().is_empty());
    }

    #[tokio::test]
    async fn test_general_query_is_read_only() {
        let h = harness();
        h.service.handle("hello there").await.unwrap();
        let reply = h
            .service
            .handle("How much have we spent this month?")
            .await
            .unwrap();
        assert_eq!(reply.reply, "You have spent $0.00 so far.");

        // Second question sees the first exchange as history
        let queries: Vec<_> = h
            .mock
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Query { history_len, .. } => Some(history_len),
                _ => None,
            })
            .collect();
        assert_eq!(queries, vec![0, 2]);

        assert!(h.db.list_expenses(&Default::default()).unwrap().is_empty());
        assert!(h.db.list_audit_log(10).unwrap().is_empty());
        assert_eq!(h.db.recent_chat_messages(10).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let h = harness();
        let err = h.service.handle("   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(h.db.recent_chat_messages(10).unwrap().is_empty());
    }
}
