//! Expense command implementations

use anyhow::{Context, Result};
use outlay_core::db::Database;
use outlay_core::tools::{self, CreateExpenseParams, ListExpensesParams};
use outlay_core::{Expense, Ledger, PayRequest};

use super::{truncate, CLI_ACTOR};

/// Arguments of `outlay expenses add`
#[derive(Debug, Default)]
pub struct NewExpenseArgs {
    pub amount: f64,
    pub company: Option<String>,
    pub email: Option<String>,
    pub category: Option<i64>,
    pub due: Option<String>,
}

fn print_expense_row(e: &Expense) {
    println!(
        "   {:>4}  {:<10} {:>12}  {:<24} {:<28} {}",
        e.id,
        e.status.as_str(),
        format!("${:.2}", e.amount),
        truncate(e.company_name.as_deref().unwrap_or("-"), 24),
        truncate(e.sales_email.as_deref().unwrap_or("-"), 28),
        e.due_date.map(|d| d.to_string()).unwrap_or_default()
    );
}

pub fn cmd_expenses_list(db: &Database, status: Option<&str>, category: Option<i64>) -> Result<()> {
    let params = ListExpensesParams {
        category_id: category,
        status: status.map(String::from),
    };
    let expenses = tools::list_expenses(db, &params)?;

    if expenses.is_empty() {
        println!("No expenses found.");
        return Ok(());
    }

    println!();
    println!("🧾 Expenses ({})", expenses.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for e in &expenses {
        print_expense_row(e);
    }

    Ok(())
}

pub fn cmd_expenses_add(ledger: &Ledger, args: NewExpenseArgs) -> Result<()> {
    let new_expense = CreateExpenseParams {
        company_name: args.company,
        amount: args.amount,
        category_id: args.category,
        sales_email: args.email,
        due_date: args.due,
    }
    .into_new_expense()?;

    let expense = ledger.create_expense(new_expense)?;
    ledger.db().log_audit(
        CLI_ACTOR,
        "create",
        Some("expense"),
        Some(expense.id),
        Some(&format!("amount={:.2}", expense.amount)),
    )?;

    println!(
        "✅ Created pending expense #{} for ${:.2}",
        expense.id, expense.amount
    );
    Ok(())
}

pub async fn cmd_expenses_pay(
    ledger: &Ledger,
    id: i64,
    to: Option<String>,
    amount: Option<f64>,
    memo: Option<String>,
) -> Result<()> {
    let outcome = ledger
        .pay(
            id,
            PayRequest {
                recipient_email: to,
                amount,
                memo,
            },
        )
        .await
        .with_context(|| format!("Failed to pay expense #{}", id))?;

    let details = serde_json::json!({
        "amount": outcome.payment.amount,
        "recipient_email": outcome.payment.recipient_email,
        "transaction_id": outcome.payment.transaction_id,
    })
    .to_string();
    ledger
        .db()
        .log_audit(CLI_ACTOR, "pay", Some("expense"), Some(id), Some(&details))?;

    println!(
        "💸 Paid ${:.2} to {} for expense #{}",
        outcome.payment.amount,
        outcome.payment.recipient_email.as_deref().unwrap_or("-"),
        id
    );
    if let Some(tx) = &outcome.payment.transaction_id {
        println!("   Transaction: {}", tx);
    }
    Ok(())
}

pub fn cmd_expenses_cancel(ledger: &Ledger, id: i64) -> Result<()> {
    let expense = ledger
        .cancel(id)
        .with_context(|| format!("Failed to cancel expense #{}", id))?;
    ledger
        .db()
        .log_audit(CLI_ACTOR, "cancel", Some("expense"), Some(id), None)?;

    println!("🚫 Cancelled expense #{}", expense.id);
    Ok(())
}

pub fn cmd_expenses_show(db: &Database, id: i64) -> Result<()> {
    let detail = tools::get_expense(db, id)?;
    let e = &detail.expense;

    println!();
    println!("🧾 Expense #{}", e.id);
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Status:   {}", e.status);
    println!("   Company:  {}", e.company_name.as_deref().unwrap_or("-"));
    println!("   Amount:   ${:.2}", e.amount);
    println!("   Email:    {}", e.sales_email.as_deref().unwrap_or("-"));
    println!(
        "   Category: {}",
        detail.category_name.as_deref().unwrap_or("(uncategorized)")
    );
    if let Some(due) = e.due_date {
        println!("   Due:      {}", due);
    }
    if let Some(url) = &e.invoice_url {
        println!("   Invoice:  {}", url);
    }

    if !detail.payments.is_empty() {
        println!();
        println!("   Payments:");
        for p in &detail.payments {
            println!(
                "   • ${:.2} via {} to {} ({})",
                p.amount,
                p.payment_method,
                p.recipient_email.as_deref().unwrap_or("-"),
                p.transaction_id.as_deref().unwrap_or("no transaction id")
            );
        }
    }

    Ok(())
}
