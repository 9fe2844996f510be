//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Outlay - Invoices in, payments out
#[derive(Parser)]
#[command(name = "outlay")]
#[command(about = "Self-hosted invoice extraction and expense payments", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path (defaults to storage.db_path from the config)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file (defaults to ~/.local/share/outlay/config.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set OUTLAY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the web server
    Serve {
        /// Port to listen on (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port for MCP (Model Context Protocol) server
        ///
        /// When set (or server.mcp_port is configured), starts an MCP server
        /// for LLM tool access on that port.
        /// Example: --mcp-port 3001
        #[arg(long)]
        mcp_port: Option<u16>,
    },

    /// Manage categories
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// Manage expenses (list, add, pay, cancel, show)
    Expenses {
        #[command(subcommand)]
        action: Option<ExpensesAction>,
    },

    /// Extract an invoice file (PDF or image) into a pending expense
    Upload {
        /// Invoice file
        file: PathBuf,
    },

    /// Send one chat message ("pay expense #3", "send $20 to a@b.com", a question, or pasted invoice text)
    Chat {
        /// Message text (words are joined with spaces)
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Show paid spending by category
    Summary,

    /// Show the audit log
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List categories with spending
    List,

    /// Add a category
    Add {
        /// Category name (unique, ignoring case)
        name: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
        /// Optional monthly budget
        #[arg(long)]
        budget: Option<f64>,
    },

    /// Delete a category (its expenses become uncategorized)
    Delete {
        /// Category ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ExpensesAction {
    /// List expenses
    List {
        /// Filter by status: pending, paid, cancelled
        #[arg(long)]
        status: Option<String>,
        /// Filter by category ID
        #[arg(long)]
        category: Option<i64>,
    },

    /// Add a pending expense by hand
    Add {
        /// Amount (greater than 0)
        amount: f64,
        /// Company or vendor name
        #[arg(long)]
        company: Option<String>,
        /// Email address the payment goes to
        #[arg(long)]
        email: Option<String>,
        /// Category ID
        #[arg(long)]
        category: Option<i64>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
    },

    /// Pay a pending expense
    Pay {
        /// Expense ID
        id: i64,
        /// Recipient email (defaults to the expense's sales email)
        #[arg(long)]
        to: Option<String>,
        /// Amount to send (defaults to the expense amount)
        #[arg(long)]
        amount: Option<f64>,
        /// Payment memo
        #[arg(long)]
        memo: Option<String>,
    },

    /// Cancel a pending expense
    Cancel {
        /// Expense ID
        id: i64,
    },

    /// Show an expense with its payments
    Show {
        /// Expense ID
        id: i64,
    },
}
