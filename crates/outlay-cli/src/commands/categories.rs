//! Category command implementations

use anyhow::{bail, Result};
use outlay_core::db::Database;
use outlay_core::tools::{self, CreateCategoryParams};

use super::{truncate, CLI_ACTOR};

pub fn cmd_categories_list(db: &Database) -> Result<()> {
    let categories = tools::list_categories(db)?;

    if categories.is_empty() {
        println!("No categories yet. Add one with 'outlay categories add <name>'.");
        return Ok(());
    }

    println!();
    println!("📁 Categories");
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   {:>4}  {:<24} {:>12} {:>12} {:>6}",
        "ID", "Name", "Spent", "Budget", "Paid"
    );

    for c in &categories {
        let budget = c
            .category
            .budget_limit
            .map(|b| format!("${:.2}", b))
            .unwrap_or_else(|| "-".to_string());
        let over = match c.category.budget_limit {
            Some(limit) if c.total_spent > limit => " ⚠️",
            _ => "",
        };
        println!(
            "   {:>4}  {:<24} {:>12} {:>12} {:>6}{}",
            c.category.id,
            truncate(&c.category.name, 24),
            format!("${:.2}", c.total_spent),
            budget,
            c.expense_count,
            over
        );
    }

    Ok(())
}

pub fn cmd_categories_add(
    db: &Database,
    name: &str,
    description: Option<&str>,
    budget: Option<f64>,
) -> Result<()> {
    let new_category = CreateCategoryParams {
        name: name.to_string(),
        description: description.map(String::from),
        budget,
    }
    .into_new_category()?;

    let id = db.create_category(&new_category)?;
    db.log_audit(
        CLI_ACTOR,
        "create",
        Some("category"),
        Some(id),
        Some(&new_category.name),
    )?;

    println!("✅ Created category '{}' (id: {})", new_category.name, id);
    Ok(())
}

pub fn cmd_categories_delete(db: &Database, id: i64) -> Result<()> {
    let Some(category) = db.get_category(id)? else {
        bail!("Category not found: {}", id);
    };

    db.delete_category(id)?;
    db.log_audit(CLI_ACTOR, "delete", Some("category"), Some(id), None)?;

    println!(
        "🗑️  Deleted category '{}'. Its expenses are now uncategorized.",
        category.name
    );
    Ok(())
}
