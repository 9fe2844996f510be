//! Liveness handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub ai_backend: Option<&'static str>,
    pub ai_configured: bool,
    pub payments_configured: bool,
    pub email_configured: bool,
}

/// GET /api/health - Liveness plus which providers are configured
///
/// Does not call any provider.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ai_backend = state.pipeline.ai().map(|c| c.backend_name());

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        ai_backend,
        ai_configured: ai_backend.is_some(),
        payments_configured: state.ledger.can_pay(),
        email_configured: state.email.is_some(),
    })
}
