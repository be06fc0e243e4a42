//! End-to-end tests: router → invoker → connector → mock platform.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use lakeapps_api::{create_app, AppState};
use lakeapps_core::Settings;
use lakeapps_testkit::{self as common, MockPlatform, USER_TOKEN};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> (Arc<MockPlatform>, Router) {
    app_with(|_| {}).await
}

async fn app_with(adjust: impl FnOnce(&mut Settings)) -> (Arc<MockPlatform>, Router) {
    let mock = MockPlatform::new();
    let host = common::spawn(mock.clone()).await;
    let mut settings = common::settings(&host);
    adjust(&mut settings);
    let state = AppState::new(settings).unwrap();
    (mock, create_app(state))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// =============================================================================
// Routing Tests
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (_mock, app) = app().await;
    let (status, body) = send(app, get("/v1/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["configured"], true);
}

#[tokio::test]
async fn test_unknown_mode_is_bad_request() {
    let (mock, app) = app().await;
    let (status, body) = send(app, post_json("/v1/sql/admin/table", json!({"table": "trips"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid Input");
    assert_eq!(mock.request_count(), 0);
}

// =============================================================================
// Invocation Tests
// =============================================================================

#[tokio::test]
async fn test_blank_forwarded_token_is_missing_token() {
    let (mock, app) = app().await;
    let request = Request::post("/v1/sql/obo/table")
        .header("content-type", "application/json")
        .header("x-forwarded-access-token", "")
        .body(Body::from(json!({"table": "trips"}).to_string()))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "error");
    assert_eq!(body["title"], "OBO Token Missing");
    assert_eq!(body["mode"], "obo");
    assert_eq!(mock.request_count(), 0);
}

#[tokio::test]
async fn test_table_query_service_principal() {
    let (_mock, app) = app().await;
    let (status, body) = send(
        app,
        post_json("/v1/sql/sp/table", json!({"table": "samples.nyctaxi.trips"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["columns"], json!(["id", "city"]));
    assert_eq!(body["rows"][1]["city"], "Porto");
}

#[tokio::test]
async fn test_compare_runs_both_paths() {
    let (_mock, app) = app().await;
    let (status, body) = send(app, post_json("/v1/sql/compare", json!({"table": "trips"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service_principal"]["status"], "success");
    assert_eq!(body["on_behalf_of"]["error"], "missing_token");
}

#[tokio::test]
async fn test_genie_spaces_on_behalf_of_user() {
    let (mock, app) = app().await;
    let request = Request::get("/v1/genie/obo/spaces")
        .header("x-forwarded-access-token", USER_TOKEN)
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(app, request).await;

    assert_eq!(body["status"], "success");
    assert_eq!(body["rows"][0]["title"], "Sales");
    assert!(mock.bearers.lock().unwrap().iter().all(|b| b == USER_TOKEN));
}

#[tokio::test]
async fn test_warehouse_status_uses_configured_default() {
    let (_mock, app) = app().await;
    let (_, body) = send(
        app,
        Request::get("/v1/warehouses/status").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(body["rows"][0]["warehouse_id"], "wh1");
    assert_eq!(body["rows"][0]["status"], "running");
}

#[tokio::test]
async fn test_start_warehouse_requests_start_once() {
    let (mock, app) = app().await;
    mock.script_warehouse(&["STOPPED"]);
    let request = Request::post("/v1/warehouses/start").body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success", "{body}");
    assert_eq!(body["rows"][0]["warehouse_id"], "wh1");
    assert_eq!(body["rows"][0]["status"], "starting");
    assert_eq!(mock.starts(), 1);
}

#[tokio::test]
async fn test_identity_report() {
    let (_mock, app) = app().await;
    let request = Request::get("/v1/identity")
        .header("x-forwarded-preferred-username", "ana@example.com")
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(app, request).await;

    assert_eq!(body["username"], "ana@example.com");
    assert_eq!(body["has_token"], false);
    assert_eq!(body["readiness"], "no_token");
    assert_eq!(body["service_principal"], "4f1c-app-principal");
}

#[tokio::test]
async fn test_metrics_count_invocations() {
    let (_mock, app) = app().await;
    send(app.clone(), Request::get("/v1/warehouses").body(Body::empty()).unwrap()).await;

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains("lakeapps_invocations_total"));
    assert!(text.contains(r#"operation="sql.list_warehouses""#));
}

// =============================================================================
// Genie Tests
// =============================================================================

#[tokio::test]
async fn test_genie_ask_starts_conversation() {
    let (mock, app) = app().await;
    let (status, body) = send(
        app,
        post_json(
            "/v1/genie/sp/spaces/sales01/ask",
            json!({"question": "Revenue by region?"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success", "{body}");
    assert_eq!(body["rows"][0]["conversation_id"], "conv-new");
    assert_eq!(body["rows"][0]["status"], "EXECUTING_QUERY");
    assert_eq!(
        mock.requests_to("/api/2.0/genie/spaces/sales01/start-conversation"),
        1
    );
}

#[tokio::test]
async fn test_genie_status_available() {
    let (mock, app) = app().await;
    let (status, body) = send(app, get("/v1/genie/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configured"], true);
    assert_eq!(body["status"], "available");
    assert_eq!(body["default_space_id"], "sales01");
    assert_eq!(mock.requests_to("/api/2.0/preview/scim/v2/Me"), 1);
}

#[tokio::test]
async fn test_genie_status_unconfigured_without_space() {
    let (mock, app) = app_with(|s| s.genie_space_id = None).await;
    let (_, body) = send(app, get("/v1/genie/status")).await;

    assert_eq!(body["configured"], false);
    assert_eq!(body["status"], "unconfigured");
    assert_eq!(body["details"], json!(["Missing DATABRICKS_GENIE_SPACE_ID"]));
    assert_eq!(mock.request_count(), 0);
}

#[tokio::test]
async fn test_genie_status_unconfigured_without_service_principal() {
    let (mock, app) = app_with(|s| s.sp_secret = None).await;
    let (_, body) = send(app, get("/v1/genie/status")).await;

    assert_eq!(body["configured"], false);
    assert_eq!(body["status"], "unconfigured");
    assert!(body["details"][0]
        .as_str()
        .unwrap()
        .starts_with("Missing DATABRICKS_HOST"));
    assert_eq!(mock.request_count(), 0);
}

#[tokio::test]
async fn test_genie_status_connection_error() {
    let (_mock, app) = app_with(|s| s.host = Some("http://127.0.0.1:1".to_string())).await;
    let (status, body) = send(app, get("/v1/genie/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configured"], true);
    assert_eq!(body["status"], "connection_error");
    assert!(body["details"][0]
        .as_str()
        .unwrap()
        .starts_with("Connection failed: "));
}
