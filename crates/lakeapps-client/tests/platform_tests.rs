//! Integration tests against an in-process mock of the platform API.
//!
//! Each test spawns its own mock on an ephemeral port, so tests can run
//! in parallel without sharing scripted state.

use lakeapps_testkit::{self as common, MockPlatform, DENIED_TOKEN, USER_TOKEN};
use lakeapps_client::{
    Invoker, ListConversations, ListMessages, ListSpaces, ListWarehouses, MessageRoute,
    PlatformConnector, StartConversation, StatementQuery, TableQuery, WarehouseStatus, WhoAmI,
};
use lakeapps_core::{
    AuthMode, ErrorKind, PathState, QueryStatus, RequestContext, Settings, SpSecret,
    DEFAULT_TOKEN_HEADER,
};
use serde_json::json;
use std::sync::Arc;

fn invoker(settings: Settings) -> Invoker {
    Invoker::new(
        settings.credential_resolver(),
        PlatformConnector::new(Arc::new(settings)),
    )
}

fn user_ctx(token: &str) -> RequestContext {
    RequestContext::from_pairs([(DEFAULT_TOKEN_HEADER, token)])
}

async fn mock() -> (Arc<MockPlatform>, Settings) {
    let mock = MockPlatform::new();
    let host = common::spawn(mock.clone()).await;
    let settings = common::settings(&host);
    (mock, settings)
}

// =============================================================================
// Warehouse Handshake Tests
// =============================================================================

#[tokio::test]
async fn test_stopped_warehouse_is_started_once_then_queried() {
    let (mock, settings) = mock().await;
    mock.script_warehouse(&["STOPPED", "STOPPED", "STARTING", "RUNNING"]);
    let invoker = invoker(settings.clone());

    let op = TableQuery::new("samples.nyctaxi.trips", settings.warehouse(None));
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.status, QueryStatus::Success, "{}", result.message);
    assert_eq!(mock.starts(), 1);
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0]["city"], json!("Lisbon"));
    assert_eq!(
        result.trace,
        vec![
            PathState::Idle,
            PathState::Resolving,
            PathState::Connecting,
            PathState::Executing,
            PathState::Succeeded
        ]
    );
}

#[tokio::test]
async fn test_stopped_warehouse_without_auto_start_fails_to_connect() {
    let (mock, mut settings) = mock().await;
    mock.script_warehouse(&["STOPPED"]);
    settings.auto_start_warehouse = false;
    let invoker = invoker(settings.clone());

    let op = TableQuery::new("trips", settings.warehouse(None));
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.error, Some(ErrorKind::Connection));
    assert_eq!(mock.starts(), 0);
    assert_eq!(mock.requests_to("/api/2.0/sql/statements"), 0);
}

#[tokio::test]
async fn test_warehouse_never_ready_times_out() {
    let (mock, settings) = mock().await;
    mock.script_warehouse(&["STARTING"]);
    let invoker = invoker(settings.clone());

    let op = TableQuery::new("trips", settings.warehouse(None));
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.error, Some(ErrorKind::Connection));
    assert!(result.message.contains("did not become ready"));
    assert_eq!(mock.starts(), 0);
}

#[tokio::test]
async fn test_warehouse_status_does_not_start_warehouse() {
    let (mock, settings) = mock().await;
    mock.script_warehouse(&["STOPPED"]);
    let invoker = invoker(settings.clone());

    let op = WarehouseStatus::new(settings.warehouse(None));
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.status, QueryStatus::Success);
    assert_eq!(result.rows[0]["status"], json!("stopped"));
    assert_eq!(result.message, "SQL Warehouse is stopped");
    assert_eq!(mock.starts(), 0);
}

#[tokio::test]
async fn test_list_warehouses_sorted_and_filtered() {
    let (_mock, settings) = mock().await;
    let invoker = invoker(settings);

    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &ListWarehouses)
        .await;

    let names: Vec<_> = result.rows.iter().map(|r| r["name"].clone()).collect();
    assert_eq!(names, vec![json!("Alpha"), json!("Zeta")]);
}

// =============================================================================
// Statement Tests
// =============================================================================

#[tokio::test]
async fn test_zero_rows_is_empty_not_error() {
    let (mock, settings) = mock().await;
    mock.set_statement(common::succeeded_statement(&["id"], json!([])));
    let invoker = invoker(settings.clone());

    let op = TableQuery::new("empty_table", settings.warehouse(None));
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.status, QueryStatus::Empty);
    assert_eq!(result.title, "No Data");
    assert!(result.error.is_none());
    assert_eq!(*result.trace.last().unwrap(), PathState::Succeeded);
}

#[tokio::test]
async fn test_failed_statement_reports_platform_message() {
    let (mock, settings) = mock().await;
    mock.set_statement(json!({
        "statement_id": "s1",
        "status": {"state": "FAILED", "error": {"message": "TABLE_OR_VIEW_NOT_FOUND"}}
    }));
    let invoker = invoker(settings.clone());

    let op = StatementQuery::new("SELECT * FROM missing", settings.warehouse(None));
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.title, "Query Failed");
    assert_eq!(result.message, "Query failed: TABLE_OR_VIEW_NOT_FOUND");
    assert_eq!(*result.trace.last().unwrap(), PathState::Failed);
}

#[tokio::test]
async fn test_pending_statement_is_polled() {
    let (mock, settings) = mock().await;
    mock.set_statement(json!({"statement_id": "s9", "status": {"state": "PENDING"}}));
    let invoker = invoker(settings.clone());

    let op = StatementQuery::new("SELECT 1 AS id", settings.warehouse(None));
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.status, QueryStatus::Success, "{}", result.message);
    assert_eq!(mock.requests_to("/api/2.0/sql/statements/s9"), 1);
}

#[tokio::test]
async fn test_statement_display_window() {
    let (mock, settings) = mock().await;
    let data: Vec<_> = (0..25).map(|i| json!([i.to_string()])).collect();
    mock.set_statement(common::succeeded_statement(&["n"], json!(data)));
    let invoker = invoker(settings.clone());

    let op = StatementQuery::new("SELECT n FROM numbers", settings.warehouse(None));
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.rows.len(), 10);
    assert_eq!(result.message, "Query executed successfully (25 rows)");
}

#[tokio::test]
async fn test_statement_without_result_set_reports_affected_rows() {
    let (mock, settings) = mock().await;
    mock.set_statement(json!({
        "statement_id": "s2",
        "status": {"state": "SUCCEEDED"},
        "manifest": {"total_row_count": 3}
    }));
    let invoker = invoker(settings.clone());

    let op = StatementQuery::new("DELETE FROM t WHERE x = 1", settings.warehouse(None));
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.status, QueryStatus::Empty);
    assert_eq!(result.message, "Query completed. Affected 3 rows.");
}

#[tokio::test]
async fn test_invalid_table_name_makes_no_requests() {
    let (mock, settings) = mock().await;
    let invoker = invoker(settings.clone());

    let op = TableQuery::new("trips; DROP TABLE trips", settings.warehouse(None));
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.error, Some(ErrorKind::InvalidInput));
    assert_eq!(mock.request_count(), 0);
}

// =============================================================================
// Credential Tests
// =============================================================================

#[tokio::test]
async fn test_obo_without_token_makes_no_requests() {
    let (mock, settings) = mock().await;
    let invoker = invoker(settings.clone());

    let op = TableQuery::new("trips", settings.warehouse(None));
    let result = invoker
        .invoke(&user_ctx("  "), AuthMode::OnBehalfOf, &op)
        .await;

    assert_eq!(result.error, Some(ErrorKind::MissingToken));
    assert_eq!(result.title, "OBO Token Missing");
    assert_eq!(result.trace, vec![PathState::Idle, PathState::Resolving, PathState::Failed]);
    assert_eq!(mock.request_count(), 0);
}

#[tokio::test]
async fn test_obo_uses_forwarded_token() {
    let (mock, settings) = mock().await;
    let invoker = invoker(settings);

    let result = invoker
        .invoke(&user_ctx(USER_TOKEN), AuthMode::OnBehalfOf, &WhoAmI)
        .await;

    assert_eq!(result.rows[0]["user_name"], json!("ana@example.com"));
    assert_eq!(result.rows[0]["mode"], json!("obo"));
    assert!(mock.bearers.lock().unwrap().iter().all(|b| b == USER_TOKEN));
    // The handshake lookup is reused.
    assert_eq!(mock.requests_to("/api/2.0/preview/scim/v2/Me"), 1);
}

#[tokio::test]
async fn test_oauth_client_credentials_exchange() {
    let (mock, mut settings) = mock().await;
    settings.sp_secret = Some(SpSecret::OAuth {
        client_id: "app-id".to_string(),
        client_secret: "app-secret".to_string(),
    });
    let invoker = invoker(settings);

    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &WhoAmI)
        .await;

    assert_eq!(result.status, QueryStatus::Success, "{}", result.message);
    assert_eq!(mock.requests()[0], "POST /oidc/v1/token");
    assert!(mock.bearers.lock().unwrap().contains(&"m2m-token".to_string()));
}

#[tokio::test]
async fn test_dual_paths_are_independent() {
    let (_mock, settings) = mock().await;
    let invoker = invoker(settings);

    let dual = invoker.invoke_both(&user_ctx(DENIED_TOKEN), &ListSpaces).await;

    assert_eq!(dual.service_principal.status, QueryStatus::Success);
    assert_eq!(dual.service_principal.rows.len(), 2);
    assert_eq!(dual.on_behalf_of.error, Some(ErrorKind::Connection));
    assert!(dual.on_behalf_of.message.contains("handshake rejected"));
    assert_eq!(dual.get(AuthMode::OnBehalfOf).mode, AuthMode::OnBehalfOf);
}

#[tokio::test]
async fn test_rejected_token_on_warehouse_handshake_is_connection_error() {
    let (mock, settings) = mock().await;
    let invoker = invoker(settings.clone());

    let op = TableQuery::new("trips", settings.warehouse(None));
    let result = invoker
        .invoke(&user_ctx(DENIED_TOKEN), AuthMode::OnBehalfOf, &op)
        .await;

    assert_eq!(result.error, Some(ErrorKind::Connection));
    assert_eq!(result.title, "Connection Error");
    assert!(result.message.starts_with("handshake rejected"));
    assert_eq!(
        result.trace,
        vec![
            PathState::Idle,
            PathState::Resolving,
            PathState::Connecting,
            PathState::Failed
        ]
    );
    assert_eq!(mock.requests_to("/api/2.0/sql/statements"), 0);
}

#[tokio::test]
async fn test_unreachable_host_is_connection_error() {
    // Nothing listens on port 1.
    let settings = common::settings("http://127.0.0.1:1");
    let invoker = invoker(settings);

    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &ListSpaces)
        .await;

    assert_eq!(result.error, Some(ErrorKind::Connection));
    assert_eq!(result.title, "Connection Error");
}

#[tokio::test]
async fn test_missing_host_is_configuration_error() {
    let mut settings = common::settings("http://unused");
    settings.host = None;
    let invoker = invoker(settings);

    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &ListSpaces)
        .await;

    assert_eq!(result.error, Some(ErrorKind::Configuration));
    assert!(result.message.contains("DATABRICKS_HOST"));
}

// =============================================================================
// Genie Tests
// =============================================================================

#[tokio::test]
async fn test_spaces_empty_object_is_access_denied() {
    let (mock, settings) = mock().await;
    mock.set_spaces(json!({}));
    let invoker = invoker(settings);

    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &ListSpaces)
        .await;

    assert_eq!(result.status, QueryStatus::Error);
    assert_eq!(result.title, "Access Denied");
}

#[tokio::test]
async fn test_spaces_empty_list_is_empty() {
    let (mock, settings) = mock().await;
    mock.set_spaces(json!({"spaces": []}));
    let invoker = invoker(settings);

    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &ListSpaces)
        .await;

    assert_eq!(result.status, QueryStatus::Empty);
}

#[tokio::test]
async fn test_conversations_name_the_space() {
    let (_mock, settings) = mock().await;
    let invoker = invoker(settings);

    let result = invoker
        .invoke(
            &RequestContext::new(),
            AuthMode::ServicePrincipal,
            &ListConversations::new("sales01"),
        )
        .await;

    assert_eq!(result.rows[0]["id"], json!("conv01"));
    assert_eq!(result.rows[0]["created"], json!("2023-11-14T22:13:20+00:00"));
    assert!(result.message.contains("space Sales"));
}

#[tokio::test]
async fn test_message_routes_tried_in_order() {
    let (mock, settings) = mock().await;
    let invoker = invoker(settings);

    let result = invoker
        .invoke(
            &RequestContext::new(),
            AuthMode::ServicePrincipal,
            &ListMessages::new("sales01", "conv01"),
        )
        .await;

    assert_eq!(result.status, QueryStatus::Success, "{}", result.message);
    assert_eq!(result.rows[1]["content"], json!("Answer for conv01"));
    assert_eq!(result.rows[1]["role"], json!("assistant"));

    let requests = mock.requests();
    let first = requests
        .iter()
        .position(|r| r.ends_with("/spaces/sales01/conversations/conv01/messages"))
        .unwrap();
    let second = requests
        .iter()
        .position(|r| r.ends_with("/genie/conversations/conv01/messages"))
        .unwrap();
    assert!(first < second);
    assert!(!requests.iter().any(|r| r.ends_with("/spaces/sales01/conversations/conv01")));
}

#[tokio::test]
async fn test_all_message_routes_failing() {
    let (_mock, settings) = mock().await;
    let invoker = invoker(settings);

    let op = ListMessages::new("sales01", "conv01").with_routes(vec![
        MessageRoute::new("/api/2.0/genie/spaces/{space_id}/conversations/{conversation_id}", "messages"),
        MessageRoute::new("/api/2.0/genie/v2/{conversation_id}", "messages"),
    ]);
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.title, "No Message Endpoint");
    assert!(result.message.contains("/api/2.0/genie/v2/conv01"));
    assert!(result.message.contains("no `messages` list"));
}

#[tokio::test]
async fn test_start_conversation() {
    let (_mock, settings) = mock().await;
    let invoker = invoker(settings);

    let op = StartConversation::new("sales01", "Top products by revenue?");
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.rows[0]["conversation_id"], json!("conv-new"));
    assert_eq!(result.rows[0]["status"], json!("EXECUTING_QUERY"));
}

#[tokio::test]
async fn test_start_conversation_requires_question() {
    let (mock, settings) = mock().await;
    let invoker = invoker(settings);

    let op = StartConversation::new("sales01", " ");
    let result = invoker
        .invoke(&RequestContext::new(), AuthMode::ServicePrincipal, &op)
        .await;

    assert_eq!(result.message, "No question provided");
    assert_eq!(mock.request_count(), 0);
}
