//! Lakeapps API /v1: REST endpoints
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use lakeapps_client::{Invoker, PlatformConnector};
use lakeapps_core::Settings;
use metrics::ApiMetrics;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared, immutable per-process state.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub invoker: Arc<Invoker>,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self, prometheus::Error> {
        let settings = Arc::new(settings);
        let invoker = Invoker::new(
            settings.credential_resolver(),
            PlatformConnector::new(settings.clone()),
        );
        Ok(Self {
            settings,
            invoker: Arc::new(invoker),
            metrics: Arc::new(ApiMetrics::new()?),
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(handlers::health))
        .route("/v1/identity", get(handlers::identity))
        .route("/v1/warehouses", get(handlers::list_warehouses))
        .route("/v1/warehouses/status", get(handlers::warehouse_status))
        .route("/v1/warehouses/start", post(handlers::start_warehouse))
        .route("/v1/sql/compare", post(handlers::compare))
        .route("/v1/sql/{mode}/table", post(handlers::table_query))
        .route("/v1/sql/{mode}/statement", post(handlers::statement_query))
        .route("/v1/genie/status", get(handlers::genie_status))
        .route("/v1/genie/{mode}/spaces", get(handlers::list_spaces))
        .route(
            "/v1/genie/{mode}/spaces/{space_id}/conversations",
            get(handlers::list_conversations),
        )
        .route(
            "/v1/genie/{mode}/spaces/{space_id}/conversations/{conversation_id}/messages",
            get(handlers::list_messages),
        )
        .route("/v1/genie/{mode}/spaces/{space_id}/ask", post(handlers::ask))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors())
        .with_state(state)
}

pub async fn run(state: AppState) -> anyhow::Result<()> {
    let addr = state.settings.addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        %addr,
        configured = state.settings.host.is_some(),
        "Lakeapps API listening"
    );
    axum::serve(listener, create_app(state))
        .await
        .context("server error")
}
