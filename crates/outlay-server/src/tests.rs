//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use outlay_core::{MockBackend, MockEmailSender, MockPaymentProvider};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    provider: MockPaymentProvider,
    email: MockEmailSender,
    dir: TempDir,
}

fn setup_app_with(ai: Option<AIClient>, provider: MockPaymentProvider) -> TestApp {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.uploads_dir = dir.path().join("uploads");
    config.storage.max_upload_bytes = 1024;

    let email = MockEmailSender::new();
    let services = Services {
        ai,
        payments: Some(Arc::new(provider.clone())),
        email: Some(Arc::new(email.clone())),
    };
    let state = Arc::new(AppState::new(Database::in_memory().unwrap(), config, services).unwrap());

    TestApp {
        router: create_router(state.clone()),
        state,
        provider,
        email,
        dir,
    }
}

fn setup_test_app() -> TestApp {
    setup_app_with(
        Some(AIClient::Mock(MockBackend::new())),
        MockPaymentProvider::new(),
    )
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> axum::response::Response {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ACTOR_HEADER, "tester@outlay.example");
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.router.clone().oneshot(request).await.unwrap()
}

fn multipart_request(filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let boundary = "outlay-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            boundary, filename, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/invoices/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn create_expense(app: &TestApp, amount: f64, email: Option<&str>) -> i64 {
    let response = send(
        app,
        "POST",
        "/api/expenses",
        Some(serde_json::json!({
            "company_name": "Acme Hosting",
            "amount": amount,
            "sales_email": email,
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    get_body_json(response).await["id"].as_i64().unwrap()
}

const INVOICE_TEXT: &str = "Northwind Hosting\nINVOICE 7731\nTotal: $2,400.00\n\
                            billing@northwind.example\nDue date: 2025-02-01";

// ========== Health ==========

#[tokio::test]
async fn test_health_reports_providers() {
    let app = setup_test_app();

    let response = send(&app, "GET", "/api/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["ai_backend"], "mock");
    assert_eq!(json["payments_configured"], true);
    assert_eq!(json["email_configured"], true);
}

#[tokio::test]
async fn test_security_headers() {
    let app = setup_test_app();

    let response = send(&app, "GET", "/api/health", None).await;
    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
}

// ========== Categories ==========

#[tokio::test]
async fn test_category_crud() {
    let app = setup_test_app();

    let response = send(
        &app,
        "POST",
        "/api/categories",
        Some(serde_json::json!({"name": "Software", "budget_limit": 500.0})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let category = get_body_json(response).await;
    let id = category["id"].as_i64().unwrap();
    assert_eq!(category["name"], "Software");

    // Names are unique ignoring case
    let response = send(
        &app,
        "POST",
        "/api/categories",
        Some(serde_json::json!({"name": "SOFTWARE"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = send(&app, "GET", "/api/categories", None).await;
    let list = get_body_json(response).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["total_spent"], 0.0);
    assert_eq!(list[0]["budget_limit"], 500.0);

    let response = send(&app, "GET", &format!("/api/categories/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, "DELETE", &format!("/api/categories/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, "GET", &format!("/api/categories/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_category_invalid_json() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/categories")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deleting_category_uncategorizes_expenses() {
    let app = setup_test_app();
    let category_id = app
        .state
        .db
        .create_category(&outlay_core::NewCategory {
            name: "Travel".to_string(),
            ..Default::default()
        })
        .unwrap();
    let response = send(
        &app,
        "POST",
        "/api/expenses",
        Some(serde_json::json!({"amount": 80.0, "category_id": category_id})),
    )
    .await;
    let expense_id = get_body_json(response).await["id"].as_i64().unwrap();

    send(
        &app,
        "DELETE",
        &format!("/api/categories/{}", category_id),
        None,
    )
    .await;

    let response = send(&app, "GET", &format!("/api/expenses/{}", expense_id), None).await;
    let json = get_body_json(response).await;
    assert!(json["category_id"].is_null());
    assert!(json["category_name"].is_null());
}

// ========== Expenses ==========

#[tokio::test]
async fn test_create_expense_rejects_non_positive_amount() {
    let app = setup_test_app();

    let response = send(
        &app,
        "POST",
        "/api/expenses",
        Some(serde_json::json!({"company_name": "Zero", "amount": 0})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert_eq!(json["field"], "amount");
}

#[tokio::test]
async fn test_list_expenses_filters_by_status() {
    let app = setup_test_app();
    let first = create_expense(&app, 10.0, None).await;
    create_expense(&app, 20.0, None).await;
    send(&app, "POST", &format!("/api/expenses/{}/cancel", first), None).await;

    let response = send(&app, "GET", "/api/expenses?status=pending", None).await;
    let json = get_body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["amount"], 20.0);

    let response = send(&app, "GET", "/api/expenses?status=refunded", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_missing_expense() {
    let app = setup_test_app();

    let response = send(&app, "GET", "/api/expenses/999", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, "GET", "/api/expenses/999/payments", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pay_expense_once() {
    let app = setup_test_app();
    let id = create_expense(&app, 120.0, Some("ar@acme.example")).await;

    let response = send(&app, "POST", &format!("/api/expenses/{}/pay", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["expense"]["status"], "paid");
    assert_eq!(json["payment"]["amount"], 120.0);
    assert_eq!(json["payment"]["recipient_email"], "ar@acme.example");

    // Second attempt never reaches the provider
    let response = send(&app, "POST", &format!("/api/expenses/{}/pay", id), None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(app.provider.sent().len(), 1);

    let response = send(&app, "GET", &format!("/api/expenses/{}/payments", id), None).await;
    assert_eq!(get_body_json(response).await.as_array().unwrap().len(), 1);

    let response = send(&app, "GET", "/api/summary", None).await;
    assert_eq!(get_body_json(response).await["total_spending"], 120.0);

    let audit = app.state.db.list_audit_log(10).unwrap();
    let pay = audit.iter().find(|e| e.action == "pay").unwrap();
    assert_eq!(pay.actor, "tester@outlay.example");
    assert_eq!(pay.entity_id, Some(id));
}

#[tokio::test]
async fn test_pay_with_override() {
    let app = setup_test_app();
    let id = create_expense(&app, 300.0, None).await;

    let response = send(
        &app,
        "POST",
        &format!("/api/expenses/{}/pay", id),
        Some(serde_json::json!({
            "recipient_email": "finance@vendor.example",
            "amount": 150.0,
            "memo": "First installment"
        })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let sent = app.provider.sent();
    assert_eq!(sent[0].recipient_email, "finance@vendor.example");
    assert_eq!(sent[0].amount, 150.0);
}

#[tokio::test]
async fn test_pay_without_recipient() {
    let app = setup_test_app();
    let id = create_expense(&app, 50.0, None).await;

    let response = send(&app, "POST", &format!("/api/expenses/{}/pay", id), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert_eq!(json["field"], "recipient_email");
    assert!(app.provider.sent().is_empty());
}

#[tokio::test]
async fn test_payment_failure_passes_message_through() {
    let app = setup_app_with(
        Some(AIClient::mock()),
        MockPaymentProvider::failing("Insufficient USDC balance"),
    );
    let id = create_expense(&app, 75.0, Some("ar@acme.example")).await;

    let response = send(&app, "POST", &format!("/api/expenses/{}/pay", id), None).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "Insufficient USDC balance");

    // Still payable later
    let expense = app.state.db.get_expense(id).unwrap().unwrap();
    assert_eq!(expense.status, outlay_core::ExpenseStatus::Pending);
    assert!(app.state.db.list_payments().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_expense_is_frozen() {
    let app = setup_test_app();
    let id = create_expense(&app, 40.0, Some("ar@acme.example")).await;

    let response = send(&app, "POST", &format!("/api/expenses/{}/cancel", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["status"], "cancelled");

    let response = send(&app, "POST", &format!("/api/expenses/{}/pay", id), None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = send(
        &app,
        "PATCH",
        &format!("/api/expenses/{}", id),
        Some(serde_json::json!({"amount": 41.0})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_update_pending_expense() {
    let app = setup_test_app();
    let id = create_expense(&app, 40.0, None).await;

    let response = send(
        &app,
        "PATCH",
        &format!("/api/expenses/{}", id),
        Some(serde_json::json!({"amount": 45.5, "due_date": "2025-06-30"})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["amount"], 45.5);
    assert_eq!(json["due_date"], "2025-06-30");
    assert_eq!(json["status"], "pending");
}

#[tokio::test]
async fn test_delete_expense_removes_payments() {
    let app = setup_test_app();
    let id = create_expense(&app, 60.0, Some("ar@acme.example")).await;
    send(&app, "POST", &format!("/api/expenses/{}/pay", id), None).await;

    let response = send(&app, "DELETE", &format!("/api/expenses/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, "GET", "/api/payments", None).await;
    assert!(get_body_json(response).await.as_array().unwrap().is_empty());
}

// ========== Invoices ==========

#[tokio::test]
async fn test_invoice_text_creates_pending_expense() {
    let app = setup_test_app();

    let response = send(
        &app,
        "POST",
        "/api/invoices/text",
        Some(serde_json::json!({ "text": INVOICE_TEXT })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["expense"]["company_name"], "Northwind Hosting");
    assert_eq!(json["expense"]["amount"], 2400.0);
    assert_eq!(json["expense"]["status"], "pending");
    assert_eq!(json["expense"]["due_date"], "2025-02-01");
}

#[tokio::test]
async fn test_invoice_text_missing_fields() {
    let app = setup_app_with(
        Some(AIClient::Mock(
            MockBackend::new().with_extraction_reply(r#"{"company_name": "Vague Vendor"}"#),
        )),
        MockPaymentProvider::new(),
    );

    let response = send(
        &app,
        "POST",
        "/api/invoices/text",
        Some(serde_json::json!({ "text": "Something from Vague Vendor, amount unclear" })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = get_body_json(response).await;
    assert_eq!(json["missing_fields"], serde_json::json!(["amount"]));
    assert_eq!(json["extracted"]["company_name"], "Vague Vendor");
    assert!(app
        .state
        .db
        .list_expenses(&Default::default())
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_invoice_text_without_ai() {
    let app = setup_app_with(None, MockPaymentProvider::new());

    let response = send(
        &app,
        "POST",
        "/api/invoices/text",
        Some(serde_json::json!({ "text": INVOICE_TEXT })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_upload_rejects_unsupported_type() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(multipart_request("notes.txt", "text/plain", b"hello"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(!app.dir.path().join("uploads").exists());
}

#[tokio::test]
async fn test_upload_rejects_oversized_file() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(multipart_request("scan.png", "image/png", &[0u8; 2048]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_upload_rejects_empty_file() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(multipart_request("scan.png", "image/png", b""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unreadable_image_is_stored_and_served() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(multipart_request(
            "receipt.jpg",
            "image/jpeg",
            &[0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3],
        ))
        .await
        .unwrap();

    // The default mock cannot read images
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let stored: Vec<String> = std::fs::read_dir(app.dir.path().join("uploads"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(stored.len(), 1);

    let response = send(&app, "GET", &format!("/uploads/{}", stored[0]), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), &[0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]);
}

// ========== Chat ==========

#[tokio::test]
async fn test_chat_general_query_and_history() {
    let app = setup_test_app();

    let response = send(
        &app,
        "POST",
        "/api/chat",
        Some(serde_json::json!({"message": "how much did we spend?"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["intent"]["intent"], "general_query");
    assert_eq!(json["reply"], "Mock answer to: how much did we spend?");

    let response = send(&app, "GET", "/api/chat/history", None).await;
    let history = get_body_json(response).await;
    assert_eq!(history.as_array().unwrap().len(), 2);
    assert_eq!(history[0]["role"], "user");
    assert_eq!(history[1]["role"], "assistant");

    let response = send(&app, "DELETE", "/api/chat/history", None).await;
    assert_eq!(get_body_json(response).await["deleted"], 2);

    let response = send(&app, "GET", "/api/chat/history", None).await;
    assert!(get_body_json(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_send_to_email_pays() {
    let app = setup_test_app();

    let response = send(
        &app,
        "POST",
        "/api/chat",
        Some(serde_json::json!({"message": "send $25 to billing@acme.example"})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["intent"]["intent"], "pay_by_email");
    assert_eq!(json["payment"]["amount"], 25.0);
    assert_eq!(app.provider.sent()[0].recipient_email, "billing@acme.example");
}

#[tokio::test]
async fn test_chat_empty_message() {
    let app = setup_test_app();

    let response = send(
        &app,
        "POST",
        "/api/chat",
        Some(serde_json::json!({"message": "   "})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(get_body_json(response).await["field"], "message");
}

// ========== Email ==========

#[tokio::test]
async fn test_send_email() {
    let app = setup_test_app();

    let response = send(
        &app,
        "POST",
        "/api/email",
        Some(serde_json::json!({
            "to": "vendor@acme.example",
            "subject": "Invoice 7731",
            "text": "Paid, thanks."
        })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(get_body_json(response).await["message_id"], "mock-email-1");
    assert_eq!(app.email.outbox().len(), 1);
}

#[tokio::test]
async fn test_send_email_requires_body() {
    let app = setup_test_app();

    let response = send(
        &app,
        "POST",
        "/api/email",
        Some(serde_json::json!({"to": "vendor@acme.example", "subject": "Hi"})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.email.outbox().is_empty());
}

// ========== Audit ==========

#[tokio::test]
async fn test_audit_log_records_mutations() {
    let app = setup_test_app();
    create_expense(&app, 10.0, None).await;

    let response = send(&app, "GET", "/api/audit?limit=5", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json[0]["action"], "create");
    assert_eq!(json[0]["entity_type"], "expense");
    assert_eq!(json[0]["actor"], "tester@outlay.example");
}

// ========== Error mapping ==========

#[test]
fn test_core_error_status_codes() {
    use outlay_core::{Error, ExpenseStatus};

    let cases = [
        (Error::validation("amount", "bad"), StatusCode::BAD_REQUEST),
        (Error::EmptyUpload, StatusCode::BAD_REQUEST),
        (
            Error::FileTooLarge { size: 2, max: 1 },
            StatusCode::PAYLOAD_TOO_LARGE,
        ),
        (
            Error::UnsupportedFileType {
                mime: "text/plain".into(),
                filename: "a.txt".into(),
            },
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ),
        (Error::Provider("down".into()), StatusCode::BAD_GATEWAY),
        (Error::PaymentFailed("no".into()), StatusCode::BAD_GATEWAY),
        (Error::Timeout(60), StatusCode::GATEWAY_TIMEOUT),
        (Error::AlreadyPaid(1), StatusCode::CONFLICT),
        (
            Error::InvalidTransition {
                id: 1,
                from: ExpenseStatus::Cancelled,
                to: ExpenseStatus::Paid,
            },
            StatusCode::CONFLICT,
        ),
        (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
        (Error::Config("none".into()), StatusCode::SERVICE_UNAVAILABLE),
        (
            Error::Encryption("bad key".into()),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, status) in cases {
        assert_eq!(AppError::from(err).status(), status);
    }
}

#[tokio::test]
async fn test_unapplied_payment_conflict_carries_payment() {
    use outlay_core::{Database, NewExpense, PaymentRecord};

    let db = Database::in_memory().unwrap();
    let expense_id = db
        .insert_expense(&NewExpense {
            amount: 40.0,
            ..Default::default()
        })
        .unwrap();
    let recorded = db
        .record_payment(
            expense_id,
            &PaymentRecord {
                payment_method: "mock".to_string(),
                recipient_email: "ar@vendor.example".to_string(),
                amount: 40.0,
                memo: None,
                transaction_id: Some("mock-tx-000009".to_string()),
            },
        )
        .unwrap();
    let payment = db.get_payment(recorded.payment_id).unwrap().unwrap();

    let err = outlay_core::Error::PaymentNotApplied {
        id: expense_id,
        payment: Box::new(payment),
    };
    let response = AppError::from(err).into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let json = get_body_json(response).await;
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("was recorded but not applied"));
    assert_eq!(json["payment"]["transaction_id"], "mock-tx-000009");
    assert_eq!(json["payment"]["expense_id"], expense_id);
}

#[tokio::test]
async fn test_internal_errors_are_sanitized() {
    let response =
        AppError::from(outlay_core::Error::Encryption("key material".into())).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "An internal error occurred");
}

#[test]
fn test_get_actor() {
    let mut headers = axum::http::HeaderMap::new();
    assert_eq!(get_actor(&headers), "api");
    headers.insert(ACTOR_HEADER, "ops@outlay.example".parse().unwrap());
    assert_eq!(get_actor(&headers), "ops@outlay.example");
}
