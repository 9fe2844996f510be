//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `load_config` / `resolve_db_path` - Config resolution
//! - `open_db` - Open the database
//! - `open_app` - Database plus configured providers
//! - `cmd_init` - Initialize the database

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use outlay_core::db::{Database, DB_KEY_ENV};
use outlay_core::Config;
use outlay_server::{AppState, Services};

/// Load the config file (or defaults) plus environment overrides
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).context("Failed to load configuration")
}

/// `--db` wins over `storage.db_path`
pub fn resolve_db_path(cli_db: Option<&Path>, config: &Config) -> PathBuf {
    cli_db
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.storage.db_path))
}

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Open the database and wire up every configured provider
pub fn open_app(db_path: &Path, no_encrypt: bool, config: Config) -> Result<AppState> {
    let db = open_db(db_path, no_encrypt)?;
    let services = Services::from_config(&config).context("Failed to configure providers")?;
    AppState::new(db, config, services).context("Failed to initialize")
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED ({})", DB_KEY_ENV);
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add a category: outlay categories add Software --budget 500");
    println!("  2. Extract an invoice: outlay upload invoice.pdf");
    println!("  3. Start web UI: outlay serve");

    Ok(())
}
