//! Chat handlers

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{get_actor, read_json, AppError, AppState, MAX_PAGE_LIMIT};
use outlay_core::{ChatMessage, ChatReply};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// POST /api/chat - Route one message and reply
pub async fn send_chat(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<ChatReply>, AppError> {
    let body: ChatRequest = read_json(request).await?;
    Ok(Json(state.chat.handle(&body.message).await?))
}

/// Query parameters for chat history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    50
}

/// GET /api/chat/history - Recent turns, oldest first
pub async fn get_chat_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT) as usize;
    Ok(Json(state.db.recent_chat_messages(limit)?))
}

#[derive(Debug, Serialize)]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub deleted: usize,
}

/// DELETE /api/chat/history - Forget the conversation
pub async fn clear_chat_history(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<ClearHistoryResponse>, AppError> {
    let actor = get_actor(request.headers());

    let deleted = state.db.clear_chat_history()?;

    state.db.log_audit(
        &actor,
        "clear",
        Some("chat_history"),
        None,
        Some(&format!("deleted={}", deleted)),
    )?;

    Ok(Json(ClearHistoryResponse {
        success: true,
        deleted,
    }))
}
