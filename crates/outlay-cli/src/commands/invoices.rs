//! Invoice upload and chat commands

use std::path::Path;

use anyhow::{Context, Result};
use outlay_core::{ChatService, Pipeline};

use super::CLI_ACTOR;

pub async fn cmd_upload(pipeline: &Pipeline, file: &Path) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    println!("📄 Extracting {} ({} bytes)...", filename, bytes.len());

    let outcome = pipeline
        .process_upload(bytes, None, filename)
        .await
        .context("Invoice extraction failed")?;

    pipeline.ledger().db().log_audit(
        CLI_ACTOR,
        "create",
        Some("expense"),
        Some(outcome.expense.id),
        Some(&format!("uploaded {}", filename)),
    )?;

    let e = &outcome.expense;
    println!("✅ Created pending expense #{}", e.id);
    println!("   Company:  {}", e.company_name.as_deref().unwrap_or("-"));
    println!("   Amount:   ${:.2}", e.amount);
    println!("   Email:    {}", e.sales_email.as_deref().unwrap_or("-"));
    if let Some(due) = e.due_date {
        println!("   Due:      {}", due);
    }
    if let Some(category) = &outcome.category {
        let note = if category.created { " (new)" } else { "" };
        println!("   Category: {}{}", category.name, note);
    }
    if let Some(url) = &e.invoice_url {
        println!("   Stored:   {}", url);
    }

    for warning in &outcome.warnings {
        println!("   ⚠️  {}", warning);
    }

    Ok(())
}

pub async fn cmd_chat(chat: &ChatService, message: &str) -> Result<()> {
    let reply = chat.handle(message).await?;

    println!("{}", reply.reply);
    for warning in &reply.warnings {
        println!("⚠️  {}", warning);
    }

    Ok(())
}
