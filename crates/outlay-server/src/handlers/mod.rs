//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod audit;
pub mod categories;
pub mod chat;
pub mod email;
pub mod expenses;
pub mod health;
pub mod invoices;

// Re-export all handlers for use in router
pub use audit::*;
pub use categories::*;
pub use chat::*;
pub use email::*;
pub use expenses::*;
pub use health::*;
pub use invoices::*;
