//! Domain models for Outlay

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A spending category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    /// Unique, compared case-insensitively
    pub name: String,
    pub description: Option<String>,
    /// Optional monthly budget
    pub budget_limit: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A category to be created
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub budget_limit: Option<f64>,
}

/// A category with the sum of its paid expenses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpending {
    #[serde(flatten)]
    pub category: Category,
    pub total_spent: f64,
    pub expense_count: i64,
}

/// Expense lifecycle status
///
/// Only `Pending -> Paid` and `Pending -> Cancelled` are valid transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    #[default]
    Pending,
    Paid,
    Cancelled,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ExpenseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown expense status: {}", s)),
        }
    }
}

impl std::fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An invoice or bill awaiting (or having received) payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub category_id: Option<i64>,
    pub company_name: Option<String>,
    /// Always > 0
    pub amount: f64,
    pub sales_email: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: ExpenseStatus,
    /// Stored file reference (`/uploads/<name>`)
    pub invoice_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An expense to be created (always starts pending)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewExpense {
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub company_name: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub sales_email: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub invoice_url: Option<String>,
}

/// Partial edit of a pending expense
///
/// `status` may only be set to `cancelled`; payment goes through `pay`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpenseUpdate {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub sales_email: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<ExpenseStatus>,
}

impl ExpenseUpdate {
    /// True when no field edit (other than status) is requested
    pub fn has_field_edits(&self) -> bool {
        self.company_name.is_some()
            || self.amount.is_some()
            || self.category_id.is_some()
            || self.sales_email.is_some()
            || self.due_date.is_some()
    }
}

/// Filter for listing expenses
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExpenseFilter {
    pub category_id: Option<i64>,
    pub status: Option<ExpenseStatus>,
}

/// An immutable record of a successful payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub expense_id: i64,
    pub payment_method: String,
    pub recipient_email: Option<String>,
    pub amount: f64,
    pub memo: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields pulled from an invoice by the language model
///
/// Every field is optional; `validate_required` decides whether the result is
/// usable for creating an expense.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedInvoiceData {
    pub company_name: Option<String>,
    pub amount: Option<f64>,
    pub sales_email: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub category: Option<String>,
    #[serde(rename = "isNewCategory", default)]
    pub is_new_category: bool,
}

/// Per-category line of the spending summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub total_spent: f64,
    pub expense_count: i64,
    pub budget: Option<f64>,
}

/// Total paid spending with a per-category breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingSummary {
    pub total_spending: f64,
    pub by_category: Vec<CategorySummary>,
}

/// Who authored a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("Unknown chat role: {}", s)),
        }
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
