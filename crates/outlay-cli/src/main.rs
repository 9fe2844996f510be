//! Outlay CLI - Invoice extraction and expense payments
//!
//! Usage:
//!   outlay init                     Initialize database
//!   outlay upload invoice.pdf       Extract an invoice into a pending expense
//!   outlay expenses pay 3           Pay expense #3
//!   outlay serve --mcp-port 3001    Start web and MCP servers

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;
    let db_path = commands::resolve_db_path(cli.db.as_deref(), &config);

    match cli.command {
        Commands::Init => commands::cmd_init(&db_path, cli.no_encrypt),
        Commands::Serve {
            port,
            host,
            mcp_port,
        } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let mcp_port = mcp_port.or(config.server.mcp_port);
            let app = commands::open_app(&db_path, cli.no_encrypt, config)?;
            commands::cmd_serve(app, &db_path, &host, port, mcp_port).await
        }
        Commands::Categories { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                None | Some(CategoriesAction::List) => commands::cmd_categories_list(&db),
                Some(CategoriesAction::Add {
                    name,
                    description,
                    budget,
                }) => commands::cmd_categories_add(&db, &name, description.as_deref(), budget),
                Some(CategoriesAction::Delete { id }) => commands::cmd_categories_delete(&db, id),
            }
        }
        Commands::Expenses { action } => {
            let app = commands::open_app(&db_path, cli.no_encrypt, config)?;
            match action {
                None => commands::cmd_expenses_list(&app.db, None, None),
                Some(ExpensesAction::List { status, category }) => {
                    commands::cmd_expenses_list(&app.db, status.as_deref(), category)
                }
                Some(ExpensesAction::Add {
                    amount,
                    company,
                    email,
                    category,
                    due,
                }) => commands::cmd_expenses_add(
                    &app.ledger,
                    commands::NewExpenseArgs {
                        amount,
                        company,
                        email,
                        category,
                        due,
                    },
                ),
                Some(ExpensesAction::Pay {
                    id,
                    to,
                    amount,
                    memo,
                }) => commands::cmd_expenses_pay(&app.ledger, id, to, amount, memo).await,
                Some(ExpensesAction::Cancel { id }) => {
                    commands::cmd_expenses_cancel(&app.ledger, id)
                }
                Some(ExpensesAction::Show { id }) => commands::cmd_expenses_show(&app.db, id),
            }
        }
        Commands::Upload { file } => {
            let app = commands::open_app(&db_path, cli.no_encrypt, config)?;
            commands::cmd_upload(&app.pipeline, &file).await
        }
        Commands::Chat { message } => {
            let app = commands::open_app(&db_path, cli.no_encrypt, config)?;
            commands::cmd_chat(&app.chat, &message.join(" ")).await
        }
        Commands::Summary => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            commands::cmd_summary(&db)
        }
        Commands::Audit { limit } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            commands::cmd_audit(&db, limit)
        }
    }
}
