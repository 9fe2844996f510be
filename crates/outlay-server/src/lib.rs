//! Outlay Web Server
//!
//! Axum-based REST API for the Outlay expense tool, plus an MCP server
//! exposing the same category and expense operations to LLM clients.
//!
//! - Restrictive CORS policy unless origins are configured
//! - Upload size limits enforced before the pipeline runs
//! - Audit logging for every mutation
//! - Sanitized error responses (store and IO faults never leak detail)

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use outlay_core::{
    AIBackend, AIClient, ChatService, Config, Database, EmailSender, FileIngestor,
    HttpEmailSender, HttpPaymentProvider, Ledger, PaymentProvider, Pipeline,
};

mod handlers;
pub mod mcp;

/// Header carrying the caller identity for the audit log
pub const ACTOR_HEADER: &str = "x-outlay-user";

/// Actor recorded when a request does not name one
pub const DEFAULT_ACTOR: &str = "api";

/// Multipart framing allowance on top of the configured upload limit
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Maximum size of a JSON request body
pub(crate) const MAX_JSON_BODY: usize = 256 * 1024;

/// External providers the server talks to
///
/// Built from config in production; tests pass mocks.
#[derive(Clone, Default)]
pub struct Services {
    pub ai: Option<AIClient>,
    pub payments: Option<Arc<dyn PaymentProvider>>,
    pub email: Option<Arc<dyn EmailSender>>,
}

impl Services {
    /// Construct every configured provider
    pub fn from_config(config: &Config) -> outlay_core::Result<Self> {
        let ai = AIClient::from_config(&config.ai)?;
        let payments = HttpPaymentProvider::from_config(&config.payments)?
            .map(|p| Arc::new(p) as Arc<dyn PaymentProvider>);
        let email = HttpEmailSender::from_config(&config.email)?
            .map(|e| Arc::new(e) as Arc<dyn EmailSender>);

        Ok(Self {
            ai,
            payments,
            email,
        })
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub ledger: Ledger,
    pub pipeline: Pipeline,
    pub chat: ChatService,
    pub email: Option<Arc<dyn EmailSender>>,
    pub config: Config,
}

impl AppState {
    pub fn new(db: Database, config: Config, services: Services) -> outlay_core::Result<Self> {
        let ledger = Ledger::new(db.clone(), services.payments);
        let pipeline = Pipeline::new(
            ledger.clone(),
            FileIngestor::from_config(&config.storage),
            services.ai,
            config.pipeline.clone(),
        );
        let chat = ChatService::new(ledger.clone(), pipeline.clone())?;

        Ok(Self {
            db,
            ledger,
            pipeline,
            chat,
            email: services.email,
            config,
        })
    }
}

/// Caller identity for audit logging
///
/// Taken from the `x-outlay-user` header, `api` when absent.
pub fn get_actor(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| DEFAULT_ACTOR.to_string())
}

/// Read and parse a JSON request body
pub(crate) async fn read_json<T: DeserializeOwned>(request: Request) -> Result<T, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_JSON_BODY)
        .await
        .map_err(|_| AppError::bad_request("Failed to read body"))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::bad_request(&format!("Invalid JSON: {}", e)))
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.storage.max_upload_bytes + MULTIPART_OVERHEAD;
    let uploads_dir = state.config.storage.uploads_dir.clone();

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Categories
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route(
            "/categories/:id",
            get(handlers::get_category).delete(handlers::delete_category),
        )
        // Expenses
        .route(
            "/expenses",
            get(handlers::list_expenses).post(handlers::create_expense),
        )
        .route(
            "/expenses/:id",
            get(handlers::get_expense)
                .patch(handlers::update_expense)
                .delete(handlers::delete_expense),
        )
        .route("/expenses/:id/pay", post(handlers::pay_expense))
        .route("/expenses/:id/cancel", post(handlers::cancel_expense))
        .route(
            "/expenses/:id/payments",
            get(handlers::list_expense_payments),
        )
        // Payments and reports
        .route("/payments", get(handlers::list_payments))
        .route("/summary", get(handlers::get_summary))
        // Invoice pipeline
        .route(
            "/invoices/upload",
            post(handlers::upload_invoice).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/invoices/text", post(handlers::submit_invoice_text))
        // Chat
        .route("/chat", post(handlers::send_chat))
        .route(
            "/chat/history",
            get(handlers::get_chat_history).delete(handlers::clear_chat_history),
        )
        // Email
        .route("/email", post(handlers::send_email))
        // Audit
        .route("/audit", get(handlers::list_audit_log));

    let cors = build_cors(&state.config.server.cors_origins);

    Router::new()
        .nest("/api", api_routes)
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static(ACTOR_HEADER),
        ]);

    if origins.is_empty() {
        // Restrictive default: only allow same-origin
        return cors;
    }

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    cors.allow_origin(origins)
}

/// Start the server
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    check_ai_connection(&state).await;

    if !state.ledger.can_pay() {
        info!("ℹ️  Payment provider not configured (set PAYMENT_API_URL to enable payments)");
    }

    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log AI backend connection status
async fn check_ai_connection(state: &AppState) {
    match state.pipeline.ai() {
        Some(client) => {
            if client.health_check().await {
                info!(
                    "✅ AI backend connected: {} ({}, model: {})",
                    client.host(),
                    client.backend_name(),
                    client.model()
                );
            } else {
                warn!(
                    "⚠️  AI backend configured but not responding: {} (model: {})",
                    client.host(),
                    client.model()
                );
            }
        }
        None => {
            info!("ℹ️  AI backend not configured (set ANTHROPIC_API_KEY or AI_BACKEND to enable invoice extraction)");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    /// Extra fields merged into the JSON body
    details: Option<serde_json::Value>,
    internal: Option<anyhow::Error>,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn conflict(msg: &str) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn with_internal(mut self, err: impl Into<anyhow::Error>) -> Self {
        self.internal = Some(err.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, status = %self.status, "Request failed");
        }

        let mut body = serde_json::json!({
            "error": self.message
        });
        if let (Some(serde_json::Value::Object(extra)), Some(obj)) =
            (self.details, body.as_object_mut())
        {
            obj.extend(extra);
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<outlay_core::Error> for AppError {
    fn from(err: outlay_core::Error) -> Self {
        use outlay_core::Error as E;

        match err {
            E::Validation { field, message } => {
                AppError::new(StatusCode::BAD_REQUEST, format!("Invalid {}: {}", field, message))
                    .with_details(serde_json::json!({ "field": field }))
            }
            E::EmptyUpload => AppError::new(StatusCode::BAD_REQUEST, err.to_string())
                .with_details(serde_json::json!({ "field": "file" })),
            E::FileTooLarge { .. } => AppError::new(StatusCode::PAYLOAD_TOO_LARGE, err.to_string())
                .with_details(serde_json::json!({ "field": "file" })),
            E::UnsupportedFileType { .. } => {
                AppError::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, err.to_string())
                    .with_details(serde_json::json!({ "field": "file" }))
            }
            E::MissingFields { fields, partial } => AppError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!(
                    "Could not extract required fields: {}. Check the document or enter the expense manually",
                    fields.join(", ")
                ),
            )
            .with_details(serde_json::json!({
                "missing_fields": fields,
                "extracted": partial,
            })),
            E::PaymentFailed(message) => AppError::new(StatusCode::BAD_GATEWAY, message),
            E::Provider(_) | E::Http(_) => AppError::new(
                StatusCode::BAD_GATEWAY,
                "An upstream provider failed. Check the provider configuration and try again",
            )
            .with_internal(err),
            E::Timeout(secs) => AppError::new(
                StatusCode::GATEWAY_TIMEOUT,
                format!(
                    "Timed out after {} seconds. Try again or upload a smaller file",
                    secs
                ),
            ),
            E::PaymentNotApplied { ref payment, .. } => {
                let details = serde_json::json!({ "payment": payment });
                AppError::conflict(&err.to_string()).with_details(details)
            }
            E::AlreadyPaid(_) | E::InvalidTransition { .. } | E::Conflict(_) => {
                AppError::conflict(&err.to_string())
            }
            E::NotFound(_) => AppError::new(StatusCode::NOT_FOUND, err.to_string()),
            E::Config(_) => AppError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            _ => AppError::internal("An internal error occurred").with_internal(err),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal("An internal error occurred").with_internal(err)
    }
}

#[cfg(test)]
mod tests;
