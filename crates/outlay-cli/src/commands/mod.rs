//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (config, open_db, open_app)
//! - `categories` - Category management
//! - `expenses` - Expense list/add/pay/cancel/show
//! - `invoices` - Invoice upload and chat
//! - `reports` - Spending summary and audit log
//! - `serve` - Web and MCP server command

pub mod categories;
pub mod core;
pub mod expenses;
pub mod invoices;
pub mod reports;
pub mod serve;

// Re-export command functions for main.rs
pub use categories::*;
pub use core::*;
pub use expenses::*;
pub use invoices::*;
pub use reports::*;
pub use serve::*;

/// Actor recorded in the audit log for CLI mutations
pub const CLI_ACTOR: &str = "cli";

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
