//! Data Model: QueryResult, Tabular, DualResult
use crate::credential::AuthMode;
use crate::error::{AppError, ErrorKind};
use crate::invoker::PathState;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One record, column name to value, in column order.
pub type Row = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Success,
    /// The call succeeded but produced no rows.
    Empty,
    Error,
}

/// What an operation hands back to the invoker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tabular {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Overrides the invoker's generic success/empty message.
    pub message: Option<String>,
}

impl Tabular {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            message: None,
        }
    }

    /// Columns are taken from the first row.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        Self::new(columns, rows)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub mode: AuthMode,
    pub operation: String,
    pub status: QueryStatus,
    pub title: String,
    pub message: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    pub trace: Vec<PathState>,
    pub latency_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl QueryResult {
    pub fn from_tabular(mode: AuthMode, operation: &str, subject: &str, data: Tabular) -> Self {
        let count = data.rows.len();
        let (status, title, default_message) = if count == 0 {
            (
                QueryStatus::Empty,
                "No Data",
                format!(
                    "Request ran successfully using {} but returned no data from {subject}.",
                    mode.describe()
                ),
            )
        } else {
            (
                QueryStatus::Success,
                "Success",
                format!(
                    "Success! Fetched {count} rows from {subject} using {}.",
                    mode.describe()
                ),
            )
        };
        Self {
            mode,
            operation: operation.to_string(),
            status,
            title: title.to_string(),
            message: data.message.unwrap_or(default_message),
            columns: data.columns,
            rows: data.rows,
            error: None,
            trace: Vec::new(),
            latency_ms: 0,
            finished_at: Utc::now(),
        }
    }

    pub fn from_error(mode: AuthMode, operation: &str, err: &AppError) -> Self {
        Self {
            mode,
            operation: operation.to_string(),
            status: QueryStatus::Error,
            title: err.title().to_string(),
            message: err.detail(),
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(err.kind()),
            trace: Vec::new(),
            latency_ms: 0,
            finished_at: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualResult {
    pub service_principal: QueryResult,
    pub on_behalf_of: QueryResult,
}

impl DualResult {
    pub fn get(&self, mode: AuthMode) -> &QueryResult {
        match mode {
            AuthMode::ServicePrincipal => &self.service_principal,
            AuthMode::OnBehalfOf => &self.on_behalf_of,
        }
    }
}

/// Builds a [`Row`] from `(column, value)` pairs.
pub fn row<I, K>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
