//! Expense and payment handlers
//!
//! Every status change goes through the ledger, so the HTTP layer never
//! touches `status` directly.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};

use crate::{get_actor, read_json, AppError, AppState, SuccessResponse, MAX_JSON_BODY};
use outlay_core::tools::{self, ExpenseDetail, ListExpensesParams};
use outlay_core::{Expense, ExpenseUpdate, NewExpense, PayRequest, Payment, PaymentOutcome};

/// GET /api/expenses - List expenses, newest first
///
/// Optional `category_id` and `status` query filters.
pub async fn list_expenses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListExpensesParams>,
) -> Result<Json<Vec<Expense>>, AppError> {
    Ok(Json(tools::list_expenses(&state.db, &params)?))
}

/// GET /api/expenses/:id - Expense with category name and payments
pub async fn get_expense(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ExpenseDetail>, AppError> {
    Ok(Json(tools::get_expense(&state.db, id)?))
}

/// POST /api/expenses - Create a pending expense by hand
pub async fn create_expense(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Expense>, AppError> {
    let actor = get_actor(request.headers());
    let body: NewExpense = read_json(request).await?;

    let expense = state.ledger.create_expense(body)?;

    state.db.log_audit(
        &actor,
        "create",
        Some("expense"),
        Some(expense.id),
        Some(&format!("amount={:.2}", expense.amount)),
    )?;

    Ok(Json(expense))
}

/// PATCH /api/expenses/:id - Edit a pending expense or cancel it
pub async fn update_expense(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Expense>, AppError> {
    let actor = get_actor(request.headers());
    let body: ExpenseUpdate = read_json(request).await?;

    let expense = state.ledger.update_expense(id, body)?;

    state
        .db
        .log_audit(&actor, "update", Some("expense"), Some(id), None)?;

    Ok(Json(expense))
}

/// DELETE /api/expenses/:id - Delete an expense and its payments
pub async fn delete_expense(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let actor = get_actor(request.headers());

    state.ledger.delete_expense(id)?;

    state
        .db
        .log_audit(&actor, "delete", Some("expense"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/expenses/:id/pay - Pay a pending expense
///
/// The body is optional: `{recipient_email?, amount?, memo?}`.
pub async fn pay_expense(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<PaymentOutcome>, AppError> {
    let actor = get_actor(request.headers());
    let bytes = axum::body::to_bytes(request.into_body(), MAX_JSON_BODY)
        .await
        .map_err(|_| AppError::bad_request("Failed to read body"))?;
    let pay: PayRequest = if bytes.iter().all(u8::is_ascii_whitespace) {
        PayRequest::default()
    } else {
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::bad_request(&format!("Invalid JSON: {}", e)))?
    };

    let outcome = state.ledger.pay(id, pay).await?;

    let details = serde_json::json!({
        "amount": outcome.payment.amount,
        "recipient_email": outcome.payment.recipient_email,
        "transaction_id": outcome.payment.transaction_id,
    })
    .to_string();
    state
        .db
        .log_audit(&actor, "pay", Some("expense"), Some(id), Some(&details))?;

    Ok(Json(outcome))
}

/// POST /api/expenses/:id/cancel - Cancel a pending expense
pub async fn cancel_expense(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Expense>, AppError> {
    let actor = get_actor(request.headers());

    let expense = state.ledger.cancel(id)?;

    state
        .db
        .log_audit(&actor, "cancel", Some("expense"), Some(id), None)?;

    Ok(Json(expense))
}

/// GET /api/expenses/:id/payments
pub async fn list_expense_payments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Payment>>, AppError> {
    if state.db.get_expense(id)?.is_none() {
        return Err(AppError::not_found("Expense not found"));
    }
    Ok(Json(state.db.list_payments_for_expense(id)?))
}

/// GET /api/payments - All payments, newest first
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Payment>>, AppError> {
    Ok(Json(state.db.list_payments()?))
}
