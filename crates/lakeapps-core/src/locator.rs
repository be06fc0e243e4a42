//! Target resources an authorized client connects to
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

const WAREHOUSE_PATH_PREFIX: &str = "/sql/1.0/warehouses/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseRef {
    pub id: String,
}

impl WarehouseRef {
    /// Accepts a bare warehouse id or an ODBC HTTP path
    /// (`/sql/1.0/warehouses/{id}`).
    pub fn parse(value: &str) -> Result<Self, AppError> {
        let value = value.trim();
        let id = value
            .strip_prefix(WAREHOUSE_PATH_PREFIX)
            .unwrap_or(value)
            .trim_matches('/');
        if id.is_empty() || id.contains('/') {
            return Err(AppError::invalid_input(format!(
                "`{value}` is neither a warehouse id nor a warehouse HTTP path"
            )));
        }
        Ok(Self { id: id.to_string() })
    }

    pub fn http_path(&self) -> String {
        format!("{WAREHOUSE_PATH_PREFIX}{}", self.id)
    }
}

impl fmt::Display for WarehouseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocator {
    Warehouse(WarehouseRef),
    /// Workspace-level REST APIs (identity, Genie, warehouse management).
    Workspace,
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceLocator::Warehouse(wh) => write!(f, "warehouse:{}", wh.id),
            ResourceLocator::Workspace => f.write_str("workspace"),
        }
    }
}
