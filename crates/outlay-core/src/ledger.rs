//! Expense and payment state machine
//!
//! Expenses start `pending` and move once, to `paid` (through `pay`) or to
//! `cancelled`. Every state check happens before the payment provider is
//! called. After the provider accepts a payment its row is always stored,
//! in the same transaction as the status change guarded on `pending`. A
//! racing payment that loses that guard is kept on record and reported as
//! `PaymentNotApplied`.
//!
//! There is no in-flight record: if the process dies after the provider
//! accepts a payment but before the local write, the expense stays pending.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::db::{Database, PaymentRecord};
use crate::error::{Error, Result};
use crate::models::{Expense, ExpenseStatus, ExpenseUpdate, NewExpense, Payment};
use crate::payments::{PaymentProvider, PaymentRequest};

/// Options for paying an expense
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayRequest {
    /// Overrides the expense's sales email
    #[serde(default)]
    pub recipient_email: Option<String>,
    /// Defaults to the expense amount
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub memo: Option<String>,
}

/// A completed payment and the expense it settled
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub expense: Expense,
    pub payment: Payment,
}

/// Owns every expense status change
#[derive(Clone)]
pub struct Ledger {
    db: Database,
    payments: Option<Arc<dyn PaymentProvider>>,
}

fn validate_amount(field: &str, amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::validation(field, "Amount must be greater than 0"));
    }
    Ok(())
}

fn clean_email(field: &str, email: Option<&str>) -> Result<Option<String>> {
    match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(e) if e.contains('@') && !e.contains(char::is_whitespace) => Ok(Some(e.to_string())),
        Some(e) => Err(Error::validation(field, format!("'{}' is not an email address", e))),
        None => Ok(None),
    }
}

fn clean_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

impl Ledger {
    pub fn new(db: Database, payments: Option<Arc<dyn PaymentProvider>>) -> Self {
        Self { db, payments }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// True when a payment provider is configured
    pub fn can_pay(&self) -> bool {
        self.payments.is_some()
    }

    fn load(&self, id: i64) -> Result<Expense> {
        self.db
            .get_expense(id)?
            .ok_or_else(|| Error::NotFound(format!("Expense #{}", id)))
    }

    fn ensure_category(&self, category_id: Option<i64>) -> Result<()> {
        if let Some(id) = category_id {
            if self.db.get_category(id)?.is_none() {
                return Err(Error::validation(
                    "category_id",
                    format!("Category #{} does not exist", id),
                ));
            }
        }
        Ok(())
    }

    /// Check and normalize an expense without writing anything
    pub fn validate_new_expense(&self, expense: NewExpense) -> Result<NewExpense> {
        validate_amount("amount", expense.amount)?;
        self.ensure_category(expense.category_id)?;

        Ok(NewExpense {
            category_id: expense.category_id,
            company_name: clean_text(expense.company_name.as_deref()),
            amount: expense.amount,
            sales_email: clean_email("sales_email", expense.sales_email.as_deref())?,
            due_date: expense.due_date,
            invoice_url: clean_text(expense.invoice_url.as_deref()),
        })
    }

    /// Validate and insert a pending expense
    pub fn create_expense(&self, expense: NewExpense) -> Result<Expense> {
        let cleaned = self.validate_new_expense(expense)?;

        let id = self.db.insert_expense(&cleaned)?;
        info!(
            id,
            company = ?cleaned.company_name,
            amount = cleaned.amount,
            "Expense created"
        );
        self.load(id)
    }

    /// Pay a pending expense through the payment provider
    pub async fn pay(&self, expense_id: i64, request: PayRequest) -> Result<PaymentOutcome> {
        let expense = self.load(expense_id)?;
        match expense.status {
            ExpenseStatus::Pending => {}
            ExpenseStatus::Paid => return Err(Error::AlreadyPaid(expense_id)),
            ExpenseStatus::Cancelled => {
                return Err(Error::InvalidTransition {
                    id: expense_id,
                    from: ExpenseStatus::Cancelled,
                    to: ExpenseStatus::Paid,
                })
            }
        }

        let recipient = match clean_email("recipient_email", request.recipient_email.as_deref())? {
            Some(email) => email,
            None => expense.sales_email.clone().ok_or_else(|| {
                Error::validation(
                    "recipient_email",
                    format!(
                        "Expense #{} has no sales email. Give a recipient email to pay it",
                        expense_id
                    ),
                )
            })?,
        };

        let amount = request.amount.unwrap_or(expense.amount);
        validate_amount("amount", amount)?;

        let provider = self
            .payments
            .as_ref()
            .ok_or_else(|| Error::Config("No payment provider is configured".into()))?;

        let memo = clean_text(request.memo.as_deref());
        let receipt = provider
            .send_payment(&PaymentRequest {
                recipient_email: recipient.clone(),
                amount,
                memo: memo.clone(),
                currency: provider.currency().to_string(),
            })
            .await?;

        let record = PaymentRecord {
            payment_method: provider.payment_method().to_string(),
            recipient_email: recipient,
            amount,
            memo,
            transaction_id: receipt.transaction_id.clone(),
        };

        let recorded = self.db.record_payment(expense_id, &record).map_err(|e| {
            error!(
                expense_id,
                transaction_id = ?receipt.transaction_id,
                "Payment sent but could not be recorded: {}",
                e
            );
            e
        })?;

        let payment_id = recorded.payment_id;
        let payment = self
            .db
            .get_payment(payment_id)?
            .ok_or_else(|| Error::NotFound(format!("Payment #{}", payment_id)))?;

        if !recorded.marked_paid {
            error!(
                expense_id,
                payment_id,
                transaction_id = ?receipt.transaction_id,
                "Payment sent but expense was no longer pending"
            );
            return Err(Error::PaymentNotApplied {
                id: expense_id,
                payment: Box::new(payment),
            });
        }

        info!(
            expense_id,
            payment_id,
            amount,
            transaction_id = ?receipt.transaction_id,
            "Expense paid"
        );

        Ok(PaymentOutcome {
            expense: self.load(expense_id)?,
            payment,
        })
    }

    /// Cancel a pending expense
    pub fn cancel(&self, expense_id: i64) -> Result<Expense> {
        let expense = self.load(expense_id)?;
        self.check_cancellable(&expense)?;

        if !self.db.transition_expense_status(
            expense_id,
            ExpenseStatus::Pending,
            ExpenseStatus::Cancelled,
        )? {
            // Changed between the read and the guarded update
            let current = self.load(expense_id)?;
            self.check_cancellable(&current)?;
        }

        info!(expense_id, "Expense cancelled");
        self.load(expense_id)
    }

    fn check_cancellable(&self, expense: &Expense) -> Result<()> {
        match expense.status {
            ExpenseStatus::Pending => Ok(()),
            ExpenseStatus::Paid => Err(Error::AlreadyPaid(expense.id)),
            ExpenseStatus::Cancelled => Err(Error::InvalidTransition {
                id: expense.id,
                from: ExpenseStatus::Cancelled,
                to: ExpenseStatus::Cancelled,
            }),
        }
    }

    /// Edit a pending expense
    ///
    /// `status` may only be set to `cancelled`. Paying goes through `pay`.
    pub fn update_expense(&self, expense_id: i64, update: ExpenseUpdate) -> Result<Expense> {
        let expense = self.load(expense_id)?;

        match update.status {
            Some(ExpenseStatus::Paid) if expense.status != ExpenseStatus::Paid => {
                return Err(Error::validation(
                    "status",
                    "Expenses are marked paid by paying them. Use the pay operation",
                ));
            }
            Some(ExpenseStatus::Pending) if expense.status != ExpenseStatus::Pending => {
                return Err(Error::InvalidTransition {
                    id: expense_id,
                    from: expense.status,
                    to: ExpenseStatus::Pending,
                });
            }
            _ => {}
        }

        if update.has_field_edits() {
            if expense.status != ExpenseStatus::Pending {
                return Err(Error::Conflict(format!(
                    "Expense #{} is {} and can no longer be edited",
                    expense_id, expense.status
                )));
            }
            if let Some(amount) = update.amount {
                validate_amount("amount", amount)?;
            }
            self.ensure_category(update.category_id)?;

            let cleaned = ExpenseUpdate {
                company_name: update.company_name.as_deref().map(|c| c.trim().to_string()),
                sales_email: clean_email("sales_email", update.sales_email.as_deref())?,
                status: None,
                ..update.clone()
            };

            if !self.db.update_expense_fields(expense_id, &cleaned)? {
                warn!(expense_id, "Expense left pending state during edit");
                return Err(Error::Conflict(format!(
                    "Expense #{} is no longer pending",
                    expense_id
                )));
            }
            info!(expense_id, "Expense updated");
        }

        match update.status {
            Some(ExpenseStatus::Cancelled) => self.cancel(expense_id),
            Some(ExpenseStatus::Paid) => Err(Error::AlreadyPaid(expense_id)),
            _ => self.load(expense_id),
        }
    }

    /// Delete an expense and its payments
    pub fn delete_expense(&self, expense_id: i64) -> Result<()> {
        if !self.db.delete_expense(expense_id)? {
            return Err(Error::NotFound(format!("Expense #{}", expense_id)));
        }
        info!(expense_id, "Expense deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCategory;
    use crate::payments::MockPaymentProvider;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn ledger_with(provider: MockPaymentProvider) -> Ledger {
        let db = Database::in_memory().unwrap();
        Ledger::new(db, Some(Arc::new(provider)))
    }

    fn new_expense(amount: f64, email: Option<&str>) -> NewExpense {
        NewExpense {
            company_name: Some("TechSupplies Inc.".to_string()),
            amount,
            sales_email: email.map(String::from),
            due_date: NaiveDate::from_ymd_opt(2024, 12, 15),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_expense_validation() {
        let ledger = ledger_with(MockPaymentProvider::new());

        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = ledger.create_expense(new_expense(bad, None)).unwrap_err();
            assert!(matches!(err, Error::Validation { ref field, .. } if field == "amount"));
        }

        let err = ledger
            .create_expense(NewExpense {
                category_id: Some(999),
                ..new_expense(10.0, None)
            })
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "category_id"));

        let err = ledger
            .create_expense(new_expense(10.0, Some("nope")))
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "sales_email"));

        assert!(ledger.db().list_expenses(&Default::default()).unwrap().is_empty());
    }

    #[test]
    fn test_create_expense_is_pending() {
        let ledger = ledger_with(MockPaymentProvider::new());
        let expense = ledger
            .create_expense(new_expense(891.0, Some(" billing@techsupplies.com ")))
            .unwrap();
        assert_eq!(expense.status, ExpenseStatus::Pending);
        assert_eq!(expense.sales_email.as_deref(), Some("billing@techsupplies.com"));
        assert_eq!(expense.amount, 891.0);
    }

    #[tokio::test]
    async fn test_pay_happy_path() {
        let provider = MockPaymentProvider::new();
        let ledger = ledger_with(provider.clone());
        let expense = ledger
            .create_expense(new_expense(891.0, Some("billing@techsupplies.com")))
            .unwrap();

        let outcome = ledger
            .pay(
                expense.id,
                PayRequest {
                    memo: Some("Payment for expense #1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.expense.status, ExpenseStatus::Paid);
        assert_eq!(outcome.payment.amount, 891.0);
        assert_eq!(
            outcome.payment.recipient_email.as_deref(),
            Some("billing@techsupplies.com")
        );
        assert_eq!(outcome.payment.payment_method, "mock");
        assert!(outcome.payment.transaction_id.is_some());

        let sent = provider.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].memo.as_deref(), Some("Payment for expense #1"));
    }

    #[tokio::test]
    async fn test_pay_twice_is_rejected_before_provider() {
        let provider = MockPaymentProvider::new();
        let ledger = ledger_with(provider.clone());
        let expense = ledger
            .create_expense(new_expense(50.0, Some("a@b.com")))
            .unwrap();

        ledger.pay(expense.id, PayRequest::default()).await.unwrap();
        let err = ledger
            .pay(expense.id, PayRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AlreadyPaid(id) if id == expense.id));
        assert_eq!(provider.sent().len(), 1);
        assert_eq!(ledger.db().list_payments_for_expense(expense.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_payment_keeps_payment_row() {
        let provider = MockPaymentProvider::new().with_delay(Duration::from_millis(100));
        let ledger = ledger_with(provider.clone());
        let expense = ledger
            .create_expense(new_expense(75.0, Some("ar@vendor.example")))
            .unwrap();

        let paying = ledger.pay(expense.id, PayRequest::default());
        let cancelling = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            ledger.cancel(expense.id)
        };
        let (paid, cancelled) = tokio::join!(paying, cancelling);

        assert_eq!(cancelled.unwrap().status, ExpenseStatus::Cancelled);
        match paid.unwrap_err() {
            Error::PaymentNotApplied { id, payment } => {
                assert_eq!(id, expense.id);
                assert_eq!(payment.amount, 75.0);
                assert!(payment.transaction_id.is_some());
            }
            other => panic!("unexpected error {:?}", other),
        }

        let rows = ledger.db().list_payments_for_expense(expense.id).unwrap();
        assert_eq!(rows.len(), provider.sent().len());
        let stored = ledger.db().get_expense(expense.id).unwrap().unwrap();
        assert_eq!(stored.status, ExpenseStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_expense_pending() {
        let ledger = ledger_with(MockPaymentProvider::failing("Insufficient funds in wallet"));
        let expense = ledger
            .create_expense(new_expense(50.0, Some("a@b.com")))
            .unwrap();

        let err = ledger
            .pay(expense.id, PayRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Insufficient funds in wallet");

        let reloaded = ledger.db().get_expense(expense.id).unwrap().unwrap();
        assert_eq!(reloaded.status, ExpenseStatus::Pending);
        assert!(ledger.db().list_payments().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pay_requires_recipient() {
        let provider = MockPaymentProvider::new();
        let ledger = ledger_with(provider.clone());
        let expense = ledger.create_expense(new_expense(50.0, None)).unwrap();

        let err = ledger
            .pay(expense.id, PayRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "recipient_email"));
        assert!(provider.sent().is_empty());

        let outcome = ledger
            .pay(
                expense.id,
                PayRequest {
                    recipient_email: Some("override@vendor.com".to_string()),
                    amount: Some(25.0),
                    memo: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.payment.amount, 25.0);
        assert_eq!(
            outcome.payment.recipient_email.as_deref(),
            Some("override@vendor.com")
        );
    }

    #[tokio::test]
    async fn test_pay_missing_and_cancelled() {
        let ledger = ledger_with(MockPaymentProvider::new());
        let err = ledger.pay(404, PayRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let expense = ledger
            .create_expense(new_expense(50.0, Some("a@b.com")))
            .unwrap();
        ledger.cancel(expense.id).unwrap();

        let err = ledger
            .pay(expense.id, PayRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: ExpenseStatus::Cancelled,
                to: ExpenseStatus::Paid,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_pay_without_provider() {
        let ledger = Ledger::new(Database::in_memory().unwrap(), None);
        let expense = ledger
            .create_expense(new_expense(50.0, Some("a@b.com")))
            .unwrap();
        let err = ledger
            .pay(expense.id, PayRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!ledger.can_pay());
    }

    #[tokio::test]
    async fn test_cancel_transitions() {
        let ledger = ledger_with(MockPaymentProvider::new());
        let expense = ledger
            .create_expense(new_expense(50.0, Some("a@b.com")))
            .unwrap();

        let cancelled = ledger.cancel(expense.id).unwrap();
        assert_eq!(cancelled.status, ExpenseStatus::Cancelled);
        assert!(matches!(
            ledger.cancel(expense.id).unwrap_err(),
            Error::InvalidTransition { .. }
        ));

        let paid = ledger
            .create_expense(new_expense(50.0, Some("a@b.com")))
            .unwrap();
        ledger.pay(paid.id, PayRequest::default()).await.unwrap();
        assert!(matches!(
            ledger.cancel(paid.id).unwrap_err(),
            Error::AlreadyPaid(_)
        ));
    }

    #[test]
    fn test_update_expense() {
        let ledger = ledger_with(MockPaymentProvider::new());
        let category = ledger
            .db()
            .create_category(&NewCategory {
                name: "Software".to_string(),
                ..Default::default()
            })
            .unwrap();
        let expense = ledger.create_expense(new_expense(50.0, None)).unwrap();

        let updated = ledger
            .update_expense(
                expense.id,
                ExpenseUpdate {
                    amount: Some(75.0),
                    category_id: Some(category),
                    sales_email: Some("ar@vendor.com".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.amount, 75.0);
        assert_eq!(updated.category_id, Some(category));
        assert_eq!(updated.sales_email.as_deref(), Some("ar@vendor.com"));

        let err = ledger
            .update_expense(
                expense.id,
                ExpenseUpdate {
                    amount: Some(-1.0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_update_status_rules() {
        let ledger = ledger_with(MockPaymentProvider::new());
        let expense = ledger.create_expense(new_expense(50.0, None)).unwrap();

        let err = ledger
            .update_expense(
                expense.id,
                ExpenseUpdate {
                    status: Some(ExpenseStatus::Paid),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("pay"));

        let cancelled = ledger
            .update_expense(
                expense.id,
                ExpenseUpdate {
                    company_name: Some("Renamed".to_string()),
                    status: Some(ExpenseStatus::Cancelled),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(cancelled.status, ExpenseStatus::Cancelled);
        assert_eq!(cancelled.company_name.as_deref(), Some("Renamed"));

        let err = ledger
            .update_expense(
                expense.id,
                ExpenseUpdate {
                    amount: Some(10.0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = ledger
            .update_expense(
                expense.id,
                ExpenseUpdate {
                    status: Some(ExpenseStatus::Pending),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_delete_cascades_payments() {
        let ledger = ledger_with(MockPaymentProvider::new());
        let expense = ledger
            .create_expense(new_expense(50.0, Some("a@b.com")))
            .unwrap();
        ledger.pay(expense.id, PayRequest::default()).await.unwrap();

        ledger.delete_expense(expense.id).unwrap();
        assert!(ledger.db().list_payments().unwrap().is_empty());
        assert!(matches!(
            ledger.delete_expense(expense.id).unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
