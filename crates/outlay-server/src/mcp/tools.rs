//! MCP tool parameter types and queries
//!
//! Re-exported from outlay_core::tools so the chat responder and the MCP
//! server share one implementation.

pub use outlay_core::tools::{
    // Functions
    get_expense,
    get_spending_summary,
    list_categories,
    list_expenses,
    // Params types
    CreateCategoryParams,
    CreateExpenseParams,
    ExpenseIdParams,
    ListExpensesParams,
    UpdateExpenseParams,
    // Result types
    ExpenseDetail,
};
