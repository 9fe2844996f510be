//! Tool implementations for Outlay
//!
//! Parameter and result types for the MCP tool set, plus the read-only
//! queries behind them. Mutating tools (create/update/delete) only convert
//! their parameters here; the state changes go through [`crate::Ledger`].
//!
//! The same queries build the JSON snapshot the chat responder answers from.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    CategorySpending, Expense, ExpenseFilter, ExpenseStatus, ExpenseUpdate, NewCategory,
    NewExpense, Payment, SpendingSummary,
};

/// Expenses included in a chat snapshot
pub const SNAPSHOT_EXPENSE_LIMIT: usize = 50;

/// Payments included in a chat snapshot
pub const SNAPSHOT_PAYMENT_LIMIT: usize = 20;

/// Parse an optional `YYYY-MM-DD` date
pub fn parse_date_opt(field: &str, s: Option<&str>) -> Result<Option<NaiveDate>> {
    match s.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(date_str) => {
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|_| {
                Error::validation(
                    field,
                    format!("Invalid date format: {}. Use YYYY-MM-DD", date_str),
                )
            })?;
            Ok(Some(date))
        }
    }
}

/// Parse an optional status name
pub fn parse_status_opt(s: Option<&str>) -> Result<Option<ExpenseStatus>> {
    match s.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(status) => status
            .parse::<ExpenseStatus>()
            .map(Some)
            .map_err(|e| Error::validation("status", e)),
    }
}

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct CreateCategoryParams {
    #[schemars(description = "Category name, unique ignoring case")]
    pub name: String,

    #[schemars(description = "Optional description of the category")]
    pub description: Option<String>,

    #[schemars(description = "Optional monthly budget limit for this category")]
    pub budget: Option<f64>,
}

impl CreateCategoryParams {
    pub fn into_new_category(self) -> Result<NewCategory> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::validation("name", "Category name cannot be empty"));
        }
        if let Some(budget) = self.budget {
            if !budget.is_finite() || budget < 0.0 {
                return Err(Error::validation("budget", "Budget cannot be negative"));
            }
        }
        Ok(NewCategory {
            name: name.to_string(),
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            budget_limit: self.budget,
        })
    }
}

/// Every category with its paid spending
pub fn list_categories(db: &Database) -> Result<Vec<CategorySpending>> {
    db.list_categories_with_spending()
}

/// Total paid spending broken down by category
pub fn get_spending_summary(db: &Database) -> Result<SpendingSummary> {
    db.spending_summary()
}

// =============================================================================
// Expenses
// =============================================================================

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ListExpensesParams {
    #[schemars(description = "Optional category ID to filter expenses")]
    pub category_id: Option<i64>,

    #[schemars(description = "Optional status filter: pending, paid or cancelled")]
    pub status: Option<String>,
}

impl ListExpensesParams {
    pub fn to_filter(&self) -> Result<ExpenseFilter> {
        Ok(ExpenseFilter {
            category_id: self.category_id,
            status: parse_status_opt(self.status.as_deref())?,
        })
    }
}

pub fn list_expenses(db: &Database, params: &ListExpensesParams) -> Result<Vec<Expense>> {
    db.list_expenses(&params.to_filter()?)
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ExpenseIdParams {
    #[schemars(description = "Expense ID")]
    pub id: i64,
}

/// An expense with its category name and payments
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseDetail {
    #[serde(flatten)]
    pub expense: Expense,
    pub category_name: Option<String>,
    pub payments: Vec<Payment>,
}

pub fn get_expense(db: &Database, id: i64) -> Result<ExpenseDetail> {
    let expense = db
        .get_expense(id)?
        .ok_or_else(|| Error::NotFound(format!("Expense #{}", id)))?;

    let category_name = match expense.category_id {
        Some(category_id) => db.get_category(category_id)?.map(|c| c.name),
        None => None,
    };
    let payments = db.list_payments_for_expense(id)?;

    Ok(ExpenseDetail {
        expense,
        category_name,
        payments,
    })
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct CreateExpenseParams {
    #[schemars(description = "Name of the company or vendor")]
    pub company_name: Option<String>,

    #[schemars(description = "Expense amount, greater than 0")]
    pub amount: f64,

    #[schemars(description = "ID of the category this expense belongs to")]
    pub category_id: Option<i64>,

    #[schemars(description = "Email address the payment goes to")]
    pub sales_email: Option<String>,

    #[schemars(description = "Due date in YYYY-MM-DD format")]
    pub due_date: Option<String>,
}

impl CreateExpenseParams {
    pub fn into_new_expense(self) -> Result<NewExpense> {
        Ok(NewExpense {
            category_id: self.category_id,
            company_name: self.company_name,
            amount: self.amount,
            sales_email: self.sales_email,
            due_date: parse_date_opt("due_date", self.due_date.as_deref())?,
            invoice_url: None,
        })
    }
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct UpdateExpenseParams {
    #[schemars(description = "Expense ID to update")]
    pub id: i64,

    #[schemars(description = "Updated company name")]
    pub company_name: Option<String>,

    #[schemars(description = "Updated amount, greater than 0")]
    pub amount: Option<f64>,

    #[schemars(description = "Updated category ID")]
    pub category_id: Option<i64>,

    #[schemars(description = "Updated payment email address")]
    pub sales_email: Option<String>,

    #[schemars(description = "Updated due date in YYYY-MM-DD format")]
    pub due_date: Option<String>,

    #[schemars(description = "Only 'cancelled' is accepted; paying goes through the pay command")]
    pub status: Option<String>,
}

impl UpdateExpenseParams {
    pub fn into_update(self) -> Result<(i64, ExpenseUpdate)> {
        let update = ExpenseUpdate {
            company_name: self.company_name,
            amount: self.amount,
            category_id: self.category_id,
            sales_email: self.sales_email,
            due_date: parse_date_opt("due_date", self.due_date.as_deref())?,
            status: parse_status_opt(self.status.as_deref())?,
        };
        Ok((self.id, update))
    }
}

// =============================================================================
// Snapshot for the chat responder
// =============================================================================

/// Read-only view of the store handed to the model with a question
#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub categories: Vec<CategorySpending>,
    pub expenses: Vec<Expense>,
    pub payments: Vec<Payment>,
    pub summary: SpendingSummary,
}

pub fn build_snapshot(db: &Database) -> Result<Snapshot> {
    let mut expenses = db.list_expenses(&ExpenseFilter::default())?;
    expenses.truncate(SNAPSHOT_EXPENSE_LIMIT);
    let mut payments = db.list_payments()?;
    payments.truncate(SNAPSHOT_PAYMENT_LIMIT);

    Ok(Snapshot {
        categories: db.list_categories_with_spending()?,
        expenses,
        payments,
        summary: db.spending_summary()?,
    })
}

/// The snapshot as pretty JSON
pub fn snapshot_json(db: &Database) -> Result<String> {
    Ok(serde_json::to_string_pretty(&build_snapshot(db)?)?)
}
