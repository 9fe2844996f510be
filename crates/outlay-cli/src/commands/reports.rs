//! Spending summary and audit log commands

use anyhow::Result;
use outlay_core::db::Database;
use outlay_core::tools;

use super::truncate;

pub fn cmd_summary(db: &Database) -> Result<()> {
    let summary = tools::get_spending_summary(db)?;

    println!();
    println!("📊 Spending Summary");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Total paid: ${:.2}", summary.total_spending);

    if summary.by_category.is_empty() {
        println!("   No categories yet.");
        return Ok(());
    }

    println!();
    for c in &summary.by_category {
        let budget = match c.budget {
            Some(limit) => {
                let pct = if limit > 0.0 {
                    c.total_spent / limit * 100.0
                } else {
                    0.0
                };
                let marker = if c.total_spent > limit { " ⚠️" } else { "" };
                format!("of ${:.2} ({:.0}%){}", limit, pct, marker)
            }
            None => String::new(),
        };
        println!(
            "   {:<24} {:>12} {:>4} paid  {}",
            truncate(&c.category, 24),
            format!("${:.2}", c.total_spent),
            c.expense_count,
            budget
        );
    }

    Ok(())
}

pub fn cmd_audit(db: &Database, limit: i64) -> Result<()> {
    let entries = db.list_audit_log(limit.max(1))?;

    if entries.is_empty() {
        println!("Audit log is empty.");
        return Ok(());
    }

    println!();
    println!("📜 Audit Log (latest {})", entries.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for entry in &entries {
        let entity = match (&entry.entity_type, entry.entity_id) {
            (Some(kind), Some(id)) => format!("{} #{}", kind, id),
            (Some(kind), None) => kind.clone(),
            _ => String::new(),
        };
        println!(
            "   {}  {:<6} {:<8} {:<16} {}",
            entry.timestamp,
            entry.actor,
            entry.action,
            entity,
            truncate(entry.details.as_deref().unwrap_or(""), 40)
        );
    }

    Ok(())
}
