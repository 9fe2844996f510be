//! Test utilities for outlay-core
//!
//! Small axum servers standing in for the hosted model, payment and email
//! APIs. Each one records the JSON bodies it receives so tests can assert on
//! what was sent.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// A request captured by a mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    status: StatusCode,
    reply: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockState {
    fn record(&self, path: &str, headers: &HeaderMap, body: Value) {
        let authorization = headers
            .get("authorization")
            .or_else(|| headers.get("x-api-key"))
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        self.requests.lock().unwrap().push(RecordedRequest {
            path: path.to_string(),
            authorization,
            body,
        });
    }
}

struct RunningServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl RunningServer {
    async fn spawn(app: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Mock language model server
///
/// Speaks both the Anthropic Messages API and the OpenAI chat completions
/// API, answering every request with the same scripted text.
pub struct MockModelServer {
    server: RunningServer,
    state: MockState,
}

impl MockModelServer {
    /// Start a server that replies with `reply` as the model output
    pub async fn start(reply: impl Into<String>) -> Self {
        Self::with_status(StatusCode::OK, reply.into()).await
    }

    /// Start a server that fails every completion with `status` and `body`
    pub async fn failing(status: u16, body: impl Into<String>) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        Self::with_status(status, body.into()).await
    }

    async fn with_status(status: StatusCode, reply: String) -> Self {
        let state = MockState {
            status,
            reply,
            requests: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/messages", post(handle_messages))
            .route("/v1/chat/completions", post(handle_chat_completions))
            .with_state(state.clone());

        Self {
            server: RunningServer::spawn(app).await,
            state,
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.server.addr)
    }

    /// Request bodies received so far
    pub fn requests(&self) -> Vec<Value> {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.body.clone())
            .collect()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        self.server.stop();
    }
}

async fn handle_models() -> Json<Value> {
    Json(json!({"data": [{"id": "mock-model", "object": "model"}]}))
}

async fn handle_messages(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("/v1/messages", &headers, body.clone());
    if !state.status.is_success() {
        return (state.status, state.reply.clone()).into_response();
    }

    Json(json!({
        "id": "msg_mock",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": state.reply}],
        "model": body["model"],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 1, "output_tokens": 1}
    }))
    .into_response()
}

async fn handle_chat_completions(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("/v1/chat/completions", &headers, body.clone());
    if !state.status.is_success() {
        return (state.status, state.reply.clone()).into_response();
    }

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": body["model"],
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": state.reply},
            "finish_reason": "stop"
        }]
    }))
    .into_response()
}

/// Mock third-party API (payments, email)
///
/// Every POST on any path is recorded and answered with the scripted status
/// and raw body. JSON replies are sent with a JSON content type.
pub struct MockApiServer {
    server: RunningServer,
    state: MockState,
}

impl MockApiServer {
    /// Start a server answering with `status` and `body`
    pub async fn start(status: u16, body: impl Into<String>) -> Self {
        let state = MockState {
            status: StatusCode::from_u16(status).unwrap(),
            reply: body.into(),
            requests: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/*path", any(handle_api))
            .with_state(state.clone());

        Self {
            server: RunningServer::spawn(app).await,
            state,
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.server.addr)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn handle_api(
    State(state): State<MockState>,
    uri: axum::http::Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let parsed = serde_json::from_str(&body).unwrap_or(Value::String(body));
    state.record(uri.path(), &headers, parsed);

    let content_type = if serde_json::from_str::<Value>(&state.reply).is_ok() {
        "application/json"
    } else {
        "text/plain"
    };
    (
        state.status,
        [(axum::http::header::CONTENT_TYPE, content_type)],
        state.reply.clone(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_model_server_chat_completions() {
        let server = MockModelServer::start("hello").await;
        let client = reqwest::Client::new();

        let resp: Value = client
            .post(format!("{}/v1/chat/completions", server.url()))
            .json(&json!({"model": "m", "messages": []}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(resp["choices"][0]["message"]["content"], "hello");
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_api_server_records_auth() {
        let server = MockApiServer::start(200, r#"{"id": "em_1"}"#).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/emails", server.url()))
            .bearer_auth("key-1")
            .json(&json!({"to": "a@b.com"}))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());

        let requests = server.requests();
        assert_eq!(requests[0].path, "/emails");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer key-1"));
        assert_eq!(requests[0].body["to"], "a@b.com");
    }
}
