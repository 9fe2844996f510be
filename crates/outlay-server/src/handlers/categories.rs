//! Category and spending summary handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    Json,
};

use crate::{get_actor, read_json, AppError, AppState, SuccessResponse};
use outlay_core::{tools, Category, CategorySpending, NewCategory, SpendingSummary};

/// GET /api/categories - All categories with their paid spending
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategorySpending>>, AppError> {
    Ok(Json(tools::list_categories(&state.db)?))
}

/// GET /api/categories/:id
pub async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Category>, AppError> {
    let category = state
        .db
        .get_category(id)?
        .ok_or_else(|| AppError::not_found("Category not found"))?;
    Ok(Json(category))
}

/// POST /api/categories - Create a category
///
/// Names are unique ignoring case; a duplicate is a 409.
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Category>, AppError> {
    let actor = get_actor(request.headers());
    let body: NewCategory = read_json(request).await?;

    let id = state.db.create_category(&body)?;
    let category = state
        .db
        .get_category(id)?
        .ok_or_else(|| AppError::internal("Category vanished after insert"))?;

    state.db.log_audit(
        &actor,
        "create",
        Some("category"),
        Some(id),
        Some(&category.name),
    )?;

    Ok(Json(category))
}

/// DELETE /api/categories/:id - Delete a category
///
/// Its expenses stay and become uncategorized.
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let actor = get_actor(request.headers());

    if !state.db.delete_category(id)? {
        return Err(AppError::not_found("Category not found"));
    }

    state
        .db
        .log_audit(&actor, "delete", Some("category"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/summary - Total paid spending by category
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SpendingSummary>, AppError> {
    Ok(Json(tools::get_spending_summary(&state.db)?))
}
