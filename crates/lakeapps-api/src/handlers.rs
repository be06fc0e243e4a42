//! API Handlers
//!
//! Platform outcomes, failures included, are always `200` with a
//! [`QueryResult`] or [`DualResult`] body. Only malformed requests (an
//! unknown mode segment) are rejected with `400`.

use crate::error::ApiError;
use crate::middleware::request_context;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use lakeapps_client::{
    describe_identity, ListConversations, ListMessages, ListSpaces, ListWarehouses,
    PlatformClient, StartConversation, StartWarehouse, StatementQuery, TableQuery,
    WarehouseStatus,
};
use lakeapps_core::config::{
    KEY_CLIENT_ID, KEY_CLIENT_SECRET, KEY_GENIE_SPACE_ID, KEY_HOST, KEY_TOKEN,
};
use lakeapps_core::identity::inspect;
use lakeapps_core::{
    AuthMode, ClientFactory, Credential, DualResult, IdentityReport, Operation,
    QueryResult, ResourceLocator, LAKEAPPS_VERSION,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct TableRequest {
    #[serde(default)]
    pub table: String,
    /// Warehouse id or HTTP path; the configured warehouse when absent.
    #[serde(default)]
    pub http_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatementRequest {
    #[serde(default)]
    pub statement: String,
    #[serde(default)]
    pub warehouse: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WarehouseSelection {
    #[serde(default)]
    pub warehouse: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

async fn run<O>(
    state: &AppState,
    headers: &HeaderMap,
    mode: AuthMode,
    op: O,
) -> Json<QueryResult>
where
    O: Operation<PlatformClient>,
{
    let ctx = request_context(headers);
    let result = state.invoker.invoke(&ctx, mode, &op).await;
    state.metrics.observe(&result);
    Json(result)
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": LAKEAPPS_VERSION,
        "configured": state.settings.host.is_some(),
    }))
}

pub async fn identity(State(state): State<AppState>, headers: HeaderMap) -> Json<IdentityReport> {
    let ctx = request_context(&headers);
    let service_principal = if state.settings.host.is_none() {
        "Unknown".to_string()
    } else {
        match state
            .invoker
            .factory()
            .connect(&Credential::ServicePrincipal, &ResourceLocator::Workspace)
            .await
        {
            Ok(client) => describe_identity(&client).await,
            Err(e) => format!("Error ({})", e.detail()),
        }
    };
    Json(inspect(state.invoker.resolver(), &ctx, service_principal))
}

pub async fn list_warehouses(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<QueryResult> {
    run(&state, &headers, AuthMode::ServicePrincipal, ListWarehouses).await
}

pub async fn warehouse_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(selection): Query<WarehouseSelection>,
) -> Json<QueryResult> {
    let op = WarehouseStatus::new(state.settings.warehouse(selection.warehouse.as_deref()));
    run(&state, &headers, AuthMode::ServicePrincipal, op).await
}

pub async fn start_warehouse(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<WarehouseSelection>>,
) -> Json<QueryResult> {
    let selection = body.map(|Json(b)| b).unwrap_or_default();
    let op = StartWarehouse::new(state.settings.warehouse(selection.warehouse.as_deref()));
    run(&state, &headers, AuthMode::ServicePrincipal, op).await
}

pub async fn table_query(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    headers: HeaderMap,
    Json(request): Json<TableRequest>,
) -> Result<Json<QueryResult>, ApiError> {
    let mode: AuthMode = mode.parse()?;
    let op = TableQuery::new(
        request.table,
        state.settings.warehouse(request.http_path.as_deref()),
    );
    Ok(run(&state, &headers, mode, op).await)
}

pub async fn statement_query(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    headers: HeaderMap,
    Json(request): Json<StatementRequest>,
) -> Result<Json<QueryResult>, ApiError> {
    let mode: AuthMode = mode.parse()?;
    let op = StatementQuery::new(
        request.statement,
        state.settings.warehouse(request.warehouse.as_deref()),
    );
    Ok(run(&state, &headers, mode, op).await)
}

/// Same table under both identities, side by side.
pub async fn compare(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TableRequest>,
) -> Json<DualResult> {
    let ctx = request_context(&headers);
    let op = TableQuery::new(
        request.table,
        state.settings.warehouse(request.http_path.as_deref()),
    );
    let dual = state.invoker.invoke_both(&ctx, &op).await;
    state.metrics.observe(&dual.service_principal);
    state.metrics.observe(&dual.on_behalf_of);
    Json(dual)
}

/// Genie readiness: configuration first, then an SP handshake.
pub async fn genie_status(State(state): State<AppState>) -> Json<Value> {
    let settings = &state.settings;
    let mut details = Vec::new();
    if settings.host.is_none() || settings.sp_secret.is_none() {
        details.push(format!(
            "Missing {KEY_HOST} or {KEY_TOKEN} ({KEY_CLIENT_ID}/{KEY_CLIENT_SECRET})"
        ));
    }
    if settings.genie_space_id.is_none() {
        details.push(format!("Missing {KEY_GENIE_SPACE_ID}"));
    }
    let configured = details.is_empty();

    let status = if !configured {
        "unconfigured"
    } else {
        match state
            .invoker
            .factory()
            .connect(&Credential::ServicePrincipal, &ResourceLocator::Workspace)
            .await
        {
            Ok(_) => {
                details.push("Platform connection successful, Genie space configured".to_string());
                "available"
            }
            Err(e) => {
                tracing::warn!(error = %e, "genie status handshake failed");
                details.push(format!("Connection failed: {}", e.detail()));
                "connection_error"
            }
        }
    };

    Json(json!({
        "configured": configured,
        "status": status,
        "details": details,
        "default_space_id": settings.genie_space_id,
    }))
}

pub async fn list_spaces(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    headers: HeaderMap,
) -> Result<Json<QueryResult>, ApiError> {
    let mode: AuthMode = mode.parse()?;
    Ok(run(&state, &headers, mode, ListSpaces).await)
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Path((mode, space_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<QueryResult>, ApiError> {
    let mode: AuthMode = mode.parse()?;
    Ok(run(&state, &headers, mode, ListConversations::new(space_id)).await)
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path((mode, space_id, conversation_id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<QueryResult>, ApiError> {
    let mode: AuthMode = mode.parse()?;
    let op = ListMessages::new(space_id, conversation_id);
    Ok(run(&state, &headers, mode, op).await)
}

pub async fn ask(
    State(state): State<AppState>,
    Path((mode, space_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<AskRequest>,
) -> Result<Json<QueryResult>, ApiError> {
    let mode: AuthMode = mode.parse()?;
    let op = StartConversation::new(space_id, request.question);
    Ok(run(&state, &headers, mode, op).await)
}

pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .metrics
        .encode()
        .map_err(|e| ApiError::Internal(format!("metrics encoding failed: {e}")))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
