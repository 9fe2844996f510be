//! Expense operations
//!
//! These are storage primitives. Status rules (pending -> paid/cancelled only)
//! live in `ledger`, which is the only caller that changes status.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Expense, ExpenseFilter, ExpenseStatus, ExpenseUpdate, NewExpense};

const EXPENSE_COLUMNS: &str = "id, category_id, company_name, amount, sales_email, due_date, \
                               status, invoice_url, created_at";

/// Amounts closer than this are the same amount
const AMOUNT_EPSILON: f64 = 0.005;

pub(crate) fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl Database {
    /// Insert a pending expense and return its ID
    pub fn insert_expense(&self, expense: &NewExpense) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO expenses (category_id, company_name, amount, sales_email, due_date, status, invoice_url)
            VALUES (?, ?, ?, ?, ?, 'pending', ?)
            "#,
            params![
                expense.category_id,
                expense.company_name,
                expense.amount,
                expense.sales_email,
                expense.due_date.as_ref().map(format_date),
                expense.invoice_url,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get an expense by ID
    pub fn get_expense(&self, id: i64) -> Result<Option<Expense>> {
        let conn = self.conn()?;
        let expense = conn
            .query_row(
                &format!("SELECT {} FROM expenses WHERE id = ?", EXPENSE_COLUMNS),
                params![id],
                Self::row_to_expense,
            )
            .optional()?;
        Ok(expense)
    }

    /// List expenses, newest first, optionally filtered by category and status
    pub fn list_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>> {
        let conn = self.conn()?;

        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(category_id) = filter.category_id {
            conditions.push("category_id = ?");
            params.push(Box::new(category_id));
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM expenses {} ORDER BY created_at DESC, id DESC",
            EXPENSE_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let expenses = stmt
            .query_map(params_refs.as_slice(), Self::row_to_expense)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(expenses)
    }

    /// Apply field edits to a pending expense
    ///
    /// Returns false when the expense is missing or no longer pending.
    /// The `status` field of the update is ignored here.
    pub fn update_expense_fields(&self, id: i64, update: &ExpenseUpdate) -> Result<bool> {
        let mut sets = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref company_name) = update.company_name {
            sets.push("company_name = ?");
            params.push(Box::new(company_name.clone()));
        }
        if let Some(amount) = update.amount {
            sets.push("amount = ?");
            params.push(Box::new(amount));
        }
        if let Some(category_id) = update.category_id {
            sets.push("category_id = ?");
            params.push(Box::new(category_id));
        }
        if let Some(ref sales_email) = update.sales_email {
            sets.push("sales_email = ?");
            params.push(Box::new(sales_email.clone()));
        }
        if let Some(ref due_date) = update.due_date {
            sets.push("due_date = ?");
            params.push(Box::new(format_date(due_date)));
        }

        if sets.is_empty() {
            return Ok(self
                .get_expense(id)?
                .is_some_and(|e| e.status == ExpenseStatus::Pending));
        }

        params.push(Box::new(id));
        let sql = format!(
            "UPDATE expenses SET {} WHERE id = ? AND status = 'pending'",
            sets.join(", ")
        );

        let conn = self.conn()?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, params_refs.as_slice())?;
        Ok(changed > 0)
    }

    /// Move an expense from one status to another only if it is still in `from`
    ///
    /// Returns false when the expense was not in `from` (or does not exist).
    pub fn transition_expense_status(
        &self,
        id: i64,
        from: ExpenseStatus,
        to: ExpenseStatus,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE expenses SET status = ? WHERE id = ? AND status = ?",
            params![to.as_str(), id, from.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Delete an expense and (by cascade) its payments
    pub fn delete_expense(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM expenses WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    /// Find a pending expense addressed to `email`
    ///
    /// Prefers one whose amount equals `amount`, otherwise the most recent.
    pub fn find_pending_expense_by_email(
        &self,
        email: &str,
        amount: Option<f64>,
    ) -> Result<Option<Expense>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM expenses
             WHERE status = 'pending' AND sales_email = ? COLLATE NOCASE
             ORDER BY created_at DESC, id DESC",
            EXPENSE_COLUMNS
        ))?;

        let candidates = stmt
            .query_map(params![email.trim()], Self::row_to_expense)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let exact = amount.and_then(|wanted| {
            candidates
                .iter()
                .find(|e| (e.amount - wanted).abs() < AMOUNT_EPSILON)
                .cloned()
        });

        Ok(exact.or_else(|| candidates.into_iter().next()))
    }

    /// Column order matches `EXPENSE_COLUMNS`
    pub(crate) fn row_to_expense(row: &rusqlite::Row) -> rusqlite::Result<Expense> {
        let due_date_str: Option<String> = row.get(5)?;
        let status_str: String = row.get(6)?;
        let created_at_str: String = row.get(8)?;
        Ok(Expense {
            id: row.get(0)?,
            category_id: row.get(1)?,
            company_name: row.get(2)?,
            amount: row.get(3)?,
            sales_email: row.get(4)?,
            due_date: due_date_str
                .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            status: status_str.parse().unwrap_or_default(),
            invoice_url: row.get(7)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}
