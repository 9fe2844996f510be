//! Outbound email handler

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    Json,
};

use crate::{get_actor, read_json, AppError, AppState};
use outlay_core::{EmailReceipt, EmailSender, OutgoingEmail};

/// POST /api/email - Send an email through the configured provider
///
/// Body: `{to, subject, text?, html?, from?}`. 503 when no provider is set.
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<EmailReceipt>, AppError> {
    let actor = get_actor(request.headers());
    let email: OutgoingEmail = read_json(request).await?;

    let sender = state.email.as_ref().ok_or_else(|| {
        AppError::from(outlay_core::Error::Config(
            "No email provider is configured".to_string(),
        ))
    })?;

    email.validate()?;
    let receipt = sender.send(&email).await?;

    state.db.log_audit(
        &actor,
        "send",
        Some("email"),
        None,
        Some(&format!("to={} subject={}", email.to.trim(), email.subject.trim())),
    )?;

    Ok(Json(receipt))
}
