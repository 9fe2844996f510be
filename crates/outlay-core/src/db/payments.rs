//! Payment records
//!
//! Payments are insert-only. Rows disappear only when their expense is
//! deleted (ON DELETE CASCADE).

use rusqlite::{params, OptionalExtension};
use tracing::warn;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::Payment;

/// Details of a payment the provider has accepted
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub payment_method: String,
    pub recipient_email: String,
    pub amount: f64,
    pub memo: Option<String>,
    pub transaction_id: Option<String>,
}

const PAYMENT_COLUMNS: &str =
    "id, expense_id, payment_method, recipient_email, amount, memo, transaction_id, created_at";

/// Outcome of recording an accepted payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedPayment {
    pub payment_id: i64,
    /// False when the expense had already left `pending`
    pub marked_paid: bool,
}

impl Database {
    /// Record an accepted payment and mark its expense paid
    ///
    /// The payment row is always committed: the provider has already moved
    /// the money. Only the status change is guarded on `status = 'pending'`;
    /// `marked_paid` reports whether it applied.
    pub fn record_payment(&self, expense_id: i64, record: &PaymentRecord) -> Result<RecordedPayment> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO payments (expense_id, payment_method, recipient_email, amount, memo, transaction_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                expense_id,
                record.payment_method,
                record.recipient_email,
                record.amount,
                record.memo,
                record.transaction_id,
            ],
        )?;
        let payment_id = tx.last_insert_rowid();

        let changed = tx.execute(
            "UPDATE expenses SET status = 'paid' WHERE id = ? AND status = 'pending'",
            params![expense_id],
        )?;
        tx.commit()?;

        if changed == 0 {
            warn!(expense_id, payment_id, "Payment recorded for an expense that was no longer pending");
        }

        Ok(RecordedPayment {
            payment_id,
            marked_paid: changed > 0,
        })
    }

    /// Get a payment by ID
    pub fn get_payment(&self, id: i64) -> Result<Option<Payment>> {
        let conn = self.conn()?;
        let payment = conn
            .query_row(
                &format!("SELECT {} FROM payments WHERE id = ?", PAYMENT_COLUMNS),
                params![id],
                Self::row_to_payment,
            )
            .optional()?;
        Ok(payment)
    }

    /// List all payments, newest first
    pub fn list_payments(&self) -> Result<Vec<Payment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM payments ORDER BY created_at DESC, id DESC",
            PAYMENT_COLUMNS
        ))?;

        let payments = stmt
            .query_map([], Self::row_to_payment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(payments)
    }

    /// List payments for one expense
    pub fn list_payments_for_expense(&self, expense_id: i64) -> Result<Vec<Payment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM payments WHERE expense_id = ? ORDER BY created_at DESC, id DESC",
            PAYMENT_COLUMNS
        ))?;

        let payments = stmt
            .query_map(params![expense_id], Self::row_to_payment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(payments)
    }

    fn row_to_payment(row: &rusqlite::Row) -> rusqlite::Result<Payment> {
        let created_at_str: String = row.get(7)?;
        Ok(Payment {
            id: row.get(0)?,
            expense_id: row.get(1)?,
            payment_method: row.get(2)?,
            recipient_email: row.get(3)?,
            amount: row.get(4)?,
            memo: row.get(5)?,
            transaction_id: row.get(6)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}
