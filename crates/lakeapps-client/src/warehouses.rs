//! SQL warehouse management: listing, status, start, and readiness wait.
use crate::http::PlatformClient;
use async_trait::async_trait;
use lakeapps_core::{row, AppError, Operation, ResourceLocator, Row, Tabular, WarehouseRef};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;

pub const WAREHOUSES_PATH: &str = "/api/2.0/sql/warehouses";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarehouseState {
    Running,
    Starting,
    Stopping,
    Stopped,
    Deleting,
    Deleted,
    Other(String),
}

impl WarehouseState {
    pub fn parse(raw: &str) -> Self {
        // SDKs sometimes render the enum as `State.RUNNING`.
        let name = raw.rsplit('.').next().unwrap_or(raw).trim().to_ascii_uppercase();
        match name.as_str() {
            "RUNNING" => WarehouseState::Running,
            "STARTING" => WarehouseState::Starting,
            "STOPPING" => WarehouseState::Stopping,
            "STOPPED" => WarehouseState::Stopped,
            "DELETING" => WarehouseState::Deleting,
            "DELETED" => WarehouseState::Deleted,
            _ => WarehouseState::Other(name),
        }
    }

    pub fn status(&self) -> String {
        match self {
            WarehouseState::Other(name) if name.is_empty() => "unknown".to_string(),
            other => other.to_string().to_ascii_lowercase(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            WarehouseState::Running => "SQL Warehouse ready".to_string(),
            WarehouseState::Starting => "SQL Warehouse is starting...".to_string(),
            WarehouseState::Stopping => "SQL Warehouse is stopping...".to_string(),
            WarehouseState::Stopped => "SQL Warehouse is stopped".to_string(),
            other => format!("SQL Warehouse state: {other}"),
        }
    }
}

impl fmt::Display for WarehouseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarehouseState::Running => f.write_str("RUNNING"),
            WarehouseState::Starting => f.write_str("STARTING"),
            WarehouseState::Stopping => f.write_str("STOPPING"),
            WarehouseState::Stopped => f.write_str("STOPPED"),
            WarehouseState::Deleting => f.write_str("DELETING"),
            WarehouseState::Deleted => f.write_str("DELETED"),
            WarehouseState::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub odbc_params: Option<OdbcParams>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OdbcParams {
    #[serde(default)]
    pub path: Option<String>,
}

impl WarehouseInfo {
    pub fn state(&self) -> WarehouseState {
        WarehouseState::parse(self.state.as_deref().unwrap_or(""))
    }

    pub fn http_path(&self) -> Option<&str> {
        self.odbc_params
            .as_ref()
            .and_then(|p| p.path.as_deref())
            .filter(|p| !p.is_empty())
    }
}

fn decode<T: for<'de> Deserialize<'de>>(what: &str, body: Value) -> Result<T, AppError> {
    serde_json::from_value(body)
        .map_err(|e| AppError::upstream("Malformed Response", format!("{what}: {e}")))
}

pub async fn get_warehouse(
    client: &PlatformClient,
    warehouse: &WarehouseRef,
) -> Result<WarehouseInfo, AppError> {
    let body = client
        .get_json(&format!("{WAREHOUSES_PATH}/{}", warehouse.id))
        .await?;
    decode("warehouse", body)
}

pub async fn start_warehouse(
    client: &PlatformClient,
    warehouse: &WarehouseRef,
) -> Result<(), AppError> {
    client
        .post_json(&format!("{WAREHOUSES_PATH}/{}/start", warehouse.id), &json!({}))
        .await
        .map(|_| ())
}

/// Blocks until the warehouse reports `RUNNING`.
///
/// A stopped warehouse is started at most once, and only when `auto_start`
/// is set. The wait is bounded by the client's poll policy.
pub async fn ensure_running(
    client: &PlatformClient,
    warehouse: &WarehouseRef,
    auto_start: bool,
) -> Result<WarehouseState, AppError> {
    let mut state = get_warehouse(client, warehouse).await?.state();
    let mut started = false;

    match state {
        WarehouseState::Running => return Ok(state),
        WarehouseState::Starting => {}
        WarehouseState::Stopped if auto_start => {
            tracing::info!(warehouse = %warehouse, "starting stopped warehouse");
            start_warehouse(client, warehouse).await.map_err(|e| {
                AppError::connection(format!(
                    "Could not start the stopped SQL warehouse: {}",
                    e.detail()
                ))
            })?;
            started = true;
        }
        WarehouseState::Stopped => {
            return Err(AppError::connection("SQL Warehouse is stopped"));
        }
        other => {
            return Err(AppError::connection(format!(
                "SQL Warehouse is not available ({other})"
            )));
        }
    }

    let poll = client.poll();
    for _ in 0..poll.max_polls {
        tokio::time::sleep(poll.interval).await;
        state = get_warehouse(client, warehouse).await?.state();
        match state {
            WarehouseState::Running => {
                tracing::info!(warehouse = %warehouse, started, "warehouse ready");
                return Ok(state);
            }
            // A freshly started warehouse may still report STOPPED briefly.
            WarehouseState::Starting | WarehouseState::Stopped => continue,
            other => {
                return Err(AppError::connection(format!(
                    "SQL Warehouse is not available ({other})"
                )));
            }
        }
    }
    Err(AppError::connection(format!(
        "SQL Warehouse {warehouse} did not become ready after {} checks (last state {state})",
        poll.max_polls
    )))
}

/// Warehouses reachable over SQL, sorted by name.
pub struct ListWarehouses;

#[derive(Debug, Deserialize)]
struct WarehouseList {
    #[serde(default)]
    warehouses: Vec<WarehouseInfo>,
}

#[async_trait]
impl Operation<PlatformClient> for ListWarehouses {
    fn id(&self) -> &'static str {
        "sql.list_warehouses"
    }

    fn subject(&self) -> String {
        "SQL warehouses".to_string()
    }

    fn target(&self) -> Result<ResourceLocator, AppError> {
        Ok(ResourceLocator::Workspace)
    }

    async fn execute(&self, client: &PlatformClient) -> Result<Tabular, AppError> {
        let body = client.get_json(WAREHOUSES_PATH).await?;
        let list: WarehouseList = if body.is_null() {
            WarehouseList { warehouses: vec![] }
        } else {
            decode("warehouse list", body)?
        };

        let mut usable: Vec<WarehouseInfo> = list
            .warehouses
            .into_iter()
            .filter(|w| w.http_path().is_some())
            .collect();
        usable.sort_by(|a, b| a.name.cmp(&b.name));

        let rows: Vec<Row> = usable
            .iter()
            .map(|w| {
                row([
                    ("id", json!(w.id)),
                    ("name", json!(w.name)),
                    ("state", json!(w.state().to_string())),
                    ("http_path", json!(w.http_path())),
                ])
            })
            .collect();

        let data = Tabular::new(
            vec!["id".into(), "name".into(), "state".into(), "http_path".into()],
            rows,
        );
        if data.rows.is_empty() {
            return Ok(data.with_message("No warehouses found"));
        }
        Ok(data)
    }
}

pub struct WarehouseStatus {
    warehouse: Result<WarehouseRef, AppError>,
}

impl WarehouseStatus {
    pub fn new(warehouse: Result<WarehouseRef, AppError>) -> Self {
        Self { warehouse }
    }
}

#[async_trait]
impl Operation<PlatformClient> for WarehouseStatus {
    fn id(&self) -> &'static str {
        "sql.warehouse_status"
    }

    fn subject(&self) -> String {
        match &self.warehouse {
            Ok(wh) => format!("warehouse {wh}"),
            Err(_) => "warehouse".to_string(),
        }
    }

    // Status checks must not start the warehouse, so they stay workspace-level.
    fn target(&self) -> Result<ResourceLocator, AppError> {
        self.warehouse.clone().map(|_| ResourceLocator::Workspace)
    }

    async fn execute(&self, client: &PlatformClient) -> Result<Tabular, AppError> {
        let warehouse = self.warehouse.clone()?;
        let info = get_warehouse(client, &warehouse).await?;
        let state = info.state();
        let message = state.message();
        Ok(Tabular::from_rows(vec![row([
            ("warehouse_id", json!(warehouse.id)),
            ("name", json!(info.name)),
            ("status", json!(state.status())),
            ("message", json!(message)),
        ])])
        .with_message(message))
    }
}

pub struct StartWarehouse {
    warehouse: Result<WarehouseRef, AppError>,
}

impl StartWarehouse {
    pub fn new(warehouse: Result<WarehouseRef, AppError>) -> Self {
        Self { warehouse }
    }
}

#[async_trait]
impl Operation<PlatformClient> for StartWarehouse {
    fn id(&self) -> &'static str {
        "sql.start_warehouse"
    }

    fn subject(&self) -> String {
        match &self.warehouse {
            Ok(wh) => format!("warehouse {wh}"),
            Err(_) => "warehouse".to_string(),
        }
    }

    fn target(&self) -> Result<ResourceLocator, AppError> {
        self.warehouse.clone().map(|_| ResourceLocator::Workspace)
    }

    async fn execute(&self, client: &PlatformClient) -> Result<Tabular, AppError> {
        let warehouse = self.warehouse.clone()?;
        start_warehouse(client, &warehouse).await?;
        Ok(Tabular::from_rows(vec![row([
            ("warehouse_id", json!(warehouse.id)),
            ("status", json!("starting")),
        ])])
        .with_message(format!("Start requested for SQL warehouse {warehouse}")))
    }
}
