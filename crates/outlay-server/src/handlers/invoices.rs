//! Invoice pipeline handlers

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, Multipart, Request, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use tracing::info;

use crate::{get_actor, read_json, AppError, AppState};
use outlay_core::PipelineOutcome;

fn multipart_error(e: MultipartError) -> AppError {
    // 413 when the body limit is hit, 400 for malformed forms
    AppError::new(
        e.status(),
        format!("Failed to read upload: {}", e.body_text()),
    )
    .with_details(serde_json::json!({ "field": "file" }))
}

/// POST /api/invoices/upload - Run an uploaded invoice through the pipeline
///
/// Expects a multipart form with a `file` field (PDF or image).
pub async fn upload_invoice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<PipelineOutcome>, AppError> {
    let actor = get_actor(&headers);
    let mut upload: Option<(Vec<u8>, Option<String>, String)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let mime = field.content_type().map(String::from);
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((bytes.to_vec(), mime, filename));
    }

    let (bytes, mime, filename) = upload.ok_or_else(|| {
        AppError::from(outlay_core::Error::validation("file", "Missing file field"))
    })?;

    info!(filename = %filename, size = bytes.len(), "Invoice upload received");
    let outcome = state
        .pipeline
        .process_upload(bytes, mime.as_deref(), &filename)
        .await?;

    audit_created(&state, &actor, &outcome, &format!("uploaded {}", filename))?;

    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct InvoiceTextRequest {
    pub text: String,
}

/// POST /api/invoices/text - Run pasted invoice text through the pipeline
pub async fn submit_invoice_text(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<PipelineOutcome>, AppError> {
    let actor = get_actor(request.headers());
    let body: InvoiceTextRequest = read_json(request).await?;

    let outcome = state.pipeline.process_text(&body.text).await?;

    audit_created(&state, &actor, &outcome, "extracted from invoice text")?;

    Ok(Json(outcome))
}

fn audit_created(
    state: &AppState,
    actor: &str,
    outcome: &PipelineOutcome,
    details: &str,
) -> Result<(), AppError> {
    state.db.log_audit(
        actor,
        "create",
        Some("expense"),
        Some(outcome.expense.id),
        Some(details),
    )?;
    Ok(())
}
