//! SQL over HTTP: the statement execution API.
//!
//! Statements are submitted with a synchronous wait window; anything still
//! pending afterwards is polled under the client's poll policy.

use crate::http::PlatformClient;
use async_trait::async_trait;
use lakeapps_core::{AppError, Operation, ResourceLocator, Row, Tabular, WarehouseRef};
use serde::Deserialize;
use serde_json::{json, Value};

pub const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";
pub const TABLE_QUERY_LIMIT: usize = 1000;
pub const STATEMENT_DISPLAY_ROWS: usize = 10;

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(default)]
    statement_id: Option<String>,
    #[serde(default)]
    status: Option<StatementStatus>,
    #[serde(default)]
    manifest: Option<Manifest>,
    #[serde(default)]
    result: Option<ResultChunk>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    schema: Option<Schema>,
    #[serde(default)]
    total_row_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Schema {
    #[serde(default)]
    columns: Vec<ColumnInfo>,
}

#[derive(Debug, Deserialize)]
struct ColumnInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResultChunk {
    #[serde(default)]
    data_array: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    row_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Row count reported by the platform; for DML, the affected rows.
    pub row_count: u64,
    /// False for statements that do not produce a result set.
    pub has_result_set: bool,
}

impl StatementResponse {
    fn state(&self) -> String {
        let raw = self
            .status
            .as_ref()
            .and_then(|s| s.state.as_deref())
            .unwrap_or("UNKNOWN");
        raw.rsplit('.').next().unwrap_or(raw).to_ascii_uppercase()
    }

    fn into_outcome(self) -> StatementOutcome {
        let mut columns: Vec<String> = self
            .manifest
            .as_ref()
            .and_then(|m| m.schema.as_ref())
            .map(|s| s.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default();
        let schema_known = !columns.is_empty();
        let total = self.manifest.as_ref().and_then(|m| m.total_row_count);
        let (data, chunk_count) = match self.result {
            Some(chunk) => (chunk.data_array.unwrap_or_default(), chunk.row_count),
            None => (Vec::new(), None),
        };

        if columns.is_empty() {
            if let Some(first) = data.first() {
                columns = (0..first.len()).map(|i| format!("Column{i}")).collect();
            }
        }

        let rows: Vec<Row> = data
            .into_iter()
            .map(|values| {
                values
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| {
                        let name = columns
                            .get(i)
                            .cloned()
                            .unwrap_or_else(|| format!("Column{i}"));
                        (name, v)
                    })
                    .collect()
            })
            .collect();

        let has_result_set = schema_known || !rows.is_empty();
        StatementOutcome {
            row_count: total.or(chunk_count).unwrap_or(rows.len() as u64),
            columns,
            rows,
            has_result_set,
        }
    }
}

fn parse_response(body: Value) -> Result<StatementResponse, AppError> {
    serde_json::from_value(body).map_err(|e| {
        AppError::upstream("Malformed Response", format!("statement response: {e}"))
    })
}

/// Submits `statement` and waits for a terminal state.
pub async fn execute_statement(
    client: &PlatformClient,
    warehouse: &WarehouseRef,
    statement: &str,
) -> Result<StatementOutcome, AppError> {
    let request = json!({
        "warehouse_id": warehouse.id,
        "statement": statement,
        "wait_timeout": "30s",
        "on_wait_timeout": "CONTINUE",
        "disposition": "INLINE",
        "format": "JSON_ARRAY",
    });
    let mut response = parse_response(client.post_json(STATEMENTS_PATH, &request).await?)?;

    let poll = client.poll();
    let mut polls = 0;
    loop {
        let state = response.state();
        match state.as_str() {
            "SUCCEEDED" => return Ok(response.into_outcome()),
            "FAILED" => {
                let message = response
                    .status
                    .and_then(|s| s.error)
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "Query failed with unknown error".to_string());
                return Err(AppError::upstream(
                    "Query Failed",
                    format!("Query failed: {message}"),
                ));
            }
            "PENDING" | "RUNNING" if polls < poll.max_polls => {
                let id = response.statement_id.clone().ok_or_else(|| {
                    AppError::upstream("Malformed Response", "pending statement without an id")
                })?;
                polls += 1;
                tokio::time::sleep(poll.interval).await;
                response =
                    parse_response(client.get_json(&format!("{STATEMENTS_PATH}/{id}")).await?)?;
            }
            "PENDING" | "RUNNING" => {
                return Err(AppError::upstream(
                    "Query Timeout",
                    format!("Statement still {state} after {} checks", poll.max_polls),
                ));
            }
            other => {
                return Err(AppError::upstream(
                    "Query Incomplete",
                    format!("Query in unexpected state: {other}"),
                ));
            }
        }
    }
}

/// Accepts `catalog.schema.table` style names; segments are plain identifiers
/// or backtick-quoted.
pub fn validate_table_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    let invalid = || AppError::invalid_input(format!("`{name}` is not a valid table name"));
    if name.is_empty() {
        return Err(AppError::invalid_input("Table name must be provided"));
    }

    let segments: Vec<&str> = split_segments(name).ok_or_else(invalid)?;
    if segments.len() > 3 {
        return Err(invalid());
    }
    for seg in segments {
        let ok = if let Some(inner) = seg.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
            !inner.is_empty() && !inner.contains('`')
        } else {
            !seg.is_empty()
                && seg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        };
        if !ok {
            return Err(invalid());
        }
    }
    Ok(name)
}

/// Splits on dots outside backticks; `None` on an unterminated quote.
fn split_segments(name: &str) -> Option<Vec<&str>> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in name.char_indices() {
        match c {
            '`' => quoted = !quoted,
            '.' if !quoted => {
                segments.push(&name[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quoted {
        return None;
    }
    segments.push(&name[start..]);
    Some(segments)
}

/// `SELECT * FROM {table} LIMIT 1000` on a running warehouse.
pub struct TableQuery {
    table: String,
    warehouse: Result<WarehouseRef, AppError>,
}

impl TableQuery {
    pub fn new(table: impl Into<String>, warehouse: Result<WarehouseRef, AppError>) -> Self {
        Self {
            table: table.into(),
            warehouse,
        }
    }
}

#[async_trait]
impl Operation<PlatformClient> for TableQuery {
    fn id(&self) -> &'static str {
        "sql.table_query"
    }

    fn subject(&self) -> String {
        format!("'{}'", self.table.trim())
    }

    fn target(&self) -> Result<ResourceLocator, AppError> {
        validate_table_name(&self.table)?;
        self.warehouse.clone().map(ResourceLocator::Warehouse)
    }

    async fn execute(&self, client: &PlatformClient) -> Result<Tabular, AppError> {
        let table = validate_table_name(&self.table)?;
        let warehouse = self.warehouse.clone()?;
        let statement = format!("SELECT * FROM {table} LIMIT {TABLE_QUERY_LIMIT}");
        let outcome = execute_statement(client, &warehouse, &statement).await?;
        Ok(Tabular::new(outcome.columns, outcome.rows))
    }
}

/// Arbitrary SQL; only the first rows are returned for display.
pub struct StatementQuery {
    statement: String,
    warehouse: Result<WarehouseRef, AppError>,
}

impl StatementQuery {
    pub fn new(statement: impl Into<String>, warehouse: Result<WarehouseRef, AppError>) -> Self {
        Self {
            statement: statement.into(),
            warehouse,
        }
    }
}

#[async_trait]
impl Operation<PlatformClient> for StatementQuery {
    fn id(&self) -> &'static str {
        "sql.statement"
    }

    fn subject(&self) -> String {
        "the statement".to_string()
    }

    fn target(&self) -> Result<ResourceLocator, AppError> {
        if self.statement.trim().is_empty() {
            return Err(AppError::invalid_input("Query must be provided"));
        }
        self.warehouse.clone().map(ResourceLocator::Warehouse)
    }

    async fn execute(&self, client: &PlatformClient) -> Result<Tabular, AppError> {
        let warehouse = self.warehouse.clone()?;
        let outcome = execute_statement(client, &warehouse, self.statement.trim()).await?;

        if !outcome.has_result_set {
            return Ok(Tabular::new(outcome.columns, Vec::new()).with_message(format!(
                "Query completed. Affected {} rows.",
                outcome.row_count
            )));
        }
        let total = outcome.rows.len();
        let rows = outcome.rows.into_iter().take(STATEMENT_DISPLAY_ROWS).collect();
        Ok(Tabular::new(outcome.columns, rows)
            .with_message(format!("Query executed successfully ({total} rows)")))
    }
}
