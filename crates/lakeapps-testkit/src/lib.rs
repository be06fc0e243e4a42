//! Lakeapps Testkit: in-process stand-in for the platform REST API
//!
//! Serves the subset of endpoints the client touches on an ephemeral port.
//! Responses are scripted through [`MockPlatform`]; every request is recorded
//! so tests can assert on call order and on what was never called.

use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lakeapps_core::{PollPolicy, Settings};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SP_TOKEN: &str = "sp-static-token";
pub const USER_TOKEN: &str = "user-obo-token";
/// Bearer the mock rejects with 403 everywhere.
pub const DENIED_TOKEN: &str = "denied-token";

pub struct MockPlatform {
    /// `"METHOD /path"` per request, in arrival order.
    pub requests: Mutex<Vec<String>>,
    pub bearers: Mutex<Vec<String>>,
    /// Warehouse states served by successive GETs; the last one sticks.
    pub warehouse_states: Mutex<VecDeque<String>>,
    pub starts: AtomicUsize,
    pub statement_submit: Mutex<Value>,
    pub statement_poll: Mutex<Value>,
    pub spaces: Mutex<Value>,
    pub conversations: Mutex<Value>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            bearers: Mutex::new(Vec::new()),
            warehouse_states: Mutex::new(VecDeque::from(["RUNNING".to_string()])),
            starts: AtomicUsize::new(0),
            statement_submit: Mutex::new(succeeded_statement(
                &["id", "city"],
                json!([["1", "Lisbon"], ["2", "Porto"]]),
            )),
            statement_poll: Mutex::new(succeeded_statement(&["id"], json!([["1"]]))),
            spaces: Mutex::new(json!({
                "spaces": [
                    {"space_id": "sales01", "title": "Sales", "description": "Revenue questions"},
                    {"space_id": "ops02", "title": "Operations"}
                ]
            })),
            conversations: Mutex::new(json!({
                "conversations": [
                    {"conversation_id": "conv01", "title": "Q3 revenue", "created_timestamp": 1_700_000_000_000_i64}
                ]
            })),
        }
    }
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_warehouse(&self, states: &[&str]) {
        *self.warehouse_states.lock().unwrap() = states.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_statement(&self, submit: Value) {
        *self.statement_submit.lock().unwrap() = submit;
    }

    pub fn set_statement_poll(&self, poll: Value) {
        *self.statement_poll.lock().unwrap() = poll;
    }

    pub fn set_spaces(&self, body: Value) {
        *self.spaces.lock().unwrap() = body;
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests_to(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.ends_with(path)).count()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

pub fn succeeded_statement(columns: &[&str], data: Value) -> Value {
    let columns: Vec<Value> = columns.iter().map(|c| json!({"name": c})).collect();
    let rows = data.as_array().map(|a| a.len()).unwrap_or(0);
    json!({
        "statement_id": "stmt-1",
        "status": {"state": "SUCCEEDED"},
        "manifest": {"schema": {"columns": columns}, "total_row_count": rows},
        "result": {"data_array": data}
    })
}

pub type Shared = Arc<MockPlatform>;

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn record(State(mock): State<Shared>, req: Request, next: Next) -> Response {
    mock.requests
        .lock()
        .unwrap()
        .push(format!("{} {}", req.method(), req.uri()));
    if let Some(token) = bearer(req.headers()) {
        mock.bearers.lock().unwrap().push(token.to_string());
        if token == DENIED_TOKEN {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({"error_code": "PERMISSION_DENIED", "message": "not allowed"})),
            )
                .into_response();
        }
    }
    next.run(req).await
}

async fn me(headers: HeaderMap) -> Json<Value> {
    match bearer(&headers) {
        Some(SP_TOKEN) | Some("m2m-token") => Json(json!({
            "userName": "4f1c-app-principal",
            "displayName": "Lakeapps Service Principal"
        })),
        _ => Json(json!({"userName": "ana@example.com", "displayName": "Ana"})),
    }
}

async fn token() -> Json<Value> {
    Json(json!({"access_token": "m2m-token", "token_type": "Bearer", "expires_in": 3600}))
}

async fn list_warehouses() -> Json<Value> {
    Json(json!({
        "warehouses": [
            {"id": "wh2", "name": "Zeta", "state": "STOPPED", "odbc_params": {"path": "/sql/1.0/warehouses/wh2"}},
            {"id": "wh1", "name": "Alpha", "state": "RUNNING", "odbc_params": {"path": "/sql/1.0/warehouses/wh1"}},
            {"id": "wh3", "name": "No Path", "state": "RUNNING"}
        ]
    }))
}

async fn get_warehouse(State(mock): State<Shared>, Path(id): Path<String>) -> Json<Value> {
    let mut states = mock.warehouse_states.lock().unwrap();
    let state = if states.len() > 1 {
        states.pop_front().unwrap_or_default()
    } else {
        states.front().cloned().unwrap_or_default()
    };
    Json(json!({"id": id, "name": "Shared Endpoint", "state": state}))
}

async fn start_warehouse(State(mock): State<Shared>) -> Json<Value> {
    mock.starts.fetch_add(1, Ordering::SeqCst);
    Json(json!({}))
}

async fn submit_statement(State(mock): State<Shared>) -> Json<Value> {
    Json(mock.statement_submit.lock().unwrap().clone())
}

async fn poll_statement(State(mock): State<Shared>) -> Json<Value> {
    Json(mock.statement_poll.lock().unwrap().clone())
}

async fn spaces(State(mock): State<Shared>) -> Response {
    match mock.spaces.lock().unwrap().clone() {
        Value::Null => StatusCode::OK.into_response(),
        body => Json(body).into_response(),
    }
}

async fn conversations(State(mock): State<Shared>) -> Json<Value> {
    Json(mock.conversations.lock().unwrap().clone())
}

async fn messages_by_conversation(Path(conversation_id): Path<String>) -> Json<Value> {
    Json(json!({
        "messages": [
            {"message_id": "m1", "role": "user", "content": "What was Q3 revenue?", "created_timestamp": 1_700_000_000_000_i64},
            {"id": "m2", "type": "assistant", "text": format!("Answer for {conversation_id}")}
        ]
    }))
}

async fn conversation_detail() -> Json<Value> {
    Json(json!({"conversation_id": "conv01", "title": "Q3 revenue"}))
}

async fn start_conversation(Json(body): Json<Value>) -> Response {
    if body.get("content").and_then(Value::as_str).unwrap_or("").is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "content required"}))).into_response();
    }
    Json(json!({
        "conversation_id": "conv-new",
        "message_id": "msg-new",
        "message": {"id": "msg-new", "status": "EXECUTING_QUERY"}
    }))
    .into_response()
}

pub fn router(mock: Shared) -> Router {
    Router::new()
        .route("/oidc/v1/token", post(token))
        .route("/api/2.0/preview/scim/v2/Me", get(me))
        .route("/api/2.0/sql/warehouses", get(list_warehouses))
        .route("/api/2.0/sql/warehouses/{id}", get(get_warehouse))
        .route("/api/2.0/sql/warehouses/{id}/start", post(start_warehouse))
        .route("/api/2.0/sql/statements", post(submit_statement))
        .route("/api/2.0/sql/statements/{id}", get(poll_statement))
        .route("/api/2.0/genie/spaces", get(spaces))
        .route("/api/2.0/genie/spaces/{space_id}/conversations", get(conversations))
        .route(
            "/api/2.0/genie/spaces/{space_id}/conversations/{conversation_id}",
            get(conversation_detail),
        )
        .route(
            "/api/2.0/genie/conversations/{conversation_id}/messages",
            get(messages_by_conversation),
        )
        .route(
            "/api/2.0/genie/spaces/{space_id}/start-conversation",
            post(start_conversation),
        )
        .fallback(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error_code": "ENDPOINT_NOT_FOUND", "message": "no such endpoint"})),
            )
        })
        .layer(middleware::from_fn_with_state(mock.clone(), record))
        .with_state(mock)
}

/// Serves the mock on `127.0.0.1:0` and returns its base URL.
pub async fn spawn(mock: Shared) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock platform");
    let addr = listener.local_addr().expect("mock platform address");
    tokio::spawn(async move {
        axum::serve(listener, router(mock))
            .await
            .expect("mock platform server");
    });
    format!("http://{addr}")
}

/// Settings pointed at `host` with fast polling.
pub fn settings(host: &str) -> Settings {
    Settings {
        host: Some(host.to_string()),
        sp_secret: Some(lakeapps_core::SpSecret::Token(SP_TOKEN.to_string())),
        warehouse_id: Some("wh1".to_string()),
        genie_space_id: Some("sales01".to_string()),
        request_timeout: Duration::from_secs(5),
        poll: PollPolicy {
            interval: Duration::from_millis(5),
            max_polls: 5,
        },
        ..Settings::default()
    }
}
