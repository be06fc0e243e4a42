//! Settings loaded from a key-value source
//!
//! The process environment is the primary source. An optional `app.yaml`
//! (the platform's app manifest) supplies defaults through either an `env`
//! list of `{name, value}` entries or an `env_variables` map; environment
//! variables always win. Missing platform keys never fail loading: the
//! operations that need them report a configuration error instead.

use crate::credential::{CredentialResolver, DEFAULT_TOKEN_HEADER, DEFAULT_USERNAME_HEADER};
use crate::error::AppError;
use crate::locator::WarehouseRef;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const KEY_HOST: &str = "DATABRICKS_HOST";
pub const KEY_TOKEN: &str = "DATABRICKS_TOKEN";
pub const KEY_CLIENT_ID: &str = "DATABRICKS_CLIENT_ID";
pub const KEY_CLIENT_SECRET: &str = "DATABRICKS_CLIENT_SECRET";
pub const KEY_WAREHOUSE_ID: &str = "DATABRICKS_SQL_WAREHOUSE_ID";
pub const KEY_GENIE_SPACE_ID: &str = "DATABRICKS_GENIE_SPACE_ID";
pub const KEY_TOKEN_HEADER: &str = "LAKEAPPS_TOKEN_HEADER";
pub const KEY_USERNAME_HEADER: &str = "LAKEAPPS_USERNAME_HEADER";
pub const KEY_ADDR: &str = "LAKEAPPS_ADDR";
pub const KEY_REQUEST_TIMEOUT_SECS: &str = "LAKEAPPS_REQUEST_TIMEOUT_SECS";
pub const KEY_POLL_INTERVAL_MS: &str = "LAKEAPPS_POLL_INTERVAL_MS";
pub const KEY_MAX_POLLS: &str = "LAKEAPPS_MAX_POLLS";
pub const KEY_AUTO_START_WAREHOUSE: &str = "LAKEAPPS_AUTO_START_WAREHOUSE";
pub const KEY_CONFIG: &str = "LAKEAPPS_CONFIG";

pub const DEFAULT_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_CONFIG_PATH: &str = "app.yaml";

/// How long to wait on asynchronous platform state (statements, warehouses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_polls: 60,
        }
    }
}

/// Service principal secret material.
#[derive(Clone, PartialEq, Eq)]
pub enum SpSecret {
    Token(String),
    OAuth {
        client_id: String,
        client_secret: String,
    },
}

impl std::fmt::Debug for SpSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpSecret::Token(_) => f.write_str("SpSecret::Token(<redacted>)"),
            SpSecret::OAuth { client_id, .. } => f
                .debug_struct("SpSecret::OAuth")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Normalized base URL (`https://host`, no trailing slash).
    pub host: Option<String>,
    pub sp_secret: Option<SpSecret>,
    pub warehouse_id: Option<String>,
    pub genie_space_id: Option<String>,
    pub token_header: String,
    pub username_header: String,
    pub addr: String,
    pub request_timeout: Duration,
    pub poll: PollPolicy,
    pub auto_start_warehouse: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: None,
            sp_secret: None,
            warehouse_id: None,
            genie_space_id: None,
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            username_header: DEFAULT_USERNAME_HEADER.to_string(),
            addr: DEFAULT_ADDR.to_string(),
            request_timeout: Duration::from_secs(30),
            poll: PollPolicy::default(),
            auto_start_warehouse: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AppManifest {
    #[serde(default)]
    env: Vec<EnvEntry>,
    #[serde(default)]
    env_variables: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct EnvEntry {
    name: String,
    #[serde(default)]
    value: Option<serde_yaml::Value>,
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses an app manifest into a flat key-value map.
pub fn parse_manifest(yaml: &str) -> Result<HashMap<String, String>, String> {
    let manifest: AppManifest =
        serde_yaml::from_str(yaml).map_err(|e| format!("Invalid app manifest: {e}"))?;

    let mut vars: HashMap<String, String> = manifest
        .env_variables
        .iter()
        .filter_map(|(k, v)| yaml_scalar(v).map(|v| (k.clone(), v)))
        .collect();
    for entry in manifest.env {
        if let Some(value) = entry.value.as_ref().and_then(yaml_scalar) {
            vars.insert(entry.name, value);
        }
    }
    Ok(vars)
}

fn non_blank(source: &HashMap<String, String>, key: &str) -> Option<String> {
    source
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parsed<T: std::str::FromStr>(source: &HashMap<String, String>, key: &str, default: T) -> T {
    match non_blank(source, key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring malformed setting");
            default
        }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `adb-1.azuredatabricks.net/` → `https://adb-1.azuredatabricks.net`
pub fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

impl Settings {
    pub fn from_source(source: &HashMap<String, String>) -> Self {
        let defaults = Settings::default();

        let sp_secret = match (
            non_blank(source, KEY_TOKEN),
            non_blank(source, KEY_CLIENT_ID),
            non_blank(source, KEY_CLIENT_SECRET),
        ) {
            (Some(token), _, _) => Some(SpSecret::Token(token)),
            (None, Some(client_id), Some(client_secret)) => Some(SpSecret::OAuth {
                client_id,
                client_secret,
            }),
            _ => None,
        };

        let auto_start_warehouse = match non_blank(source, KEY_AUTO_START_WAREHOUSE) {
            None => defaults.auto_start_warehouse,
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                tracing::warn!(key = KEY_AUTO_START_WAREHOUSE, value = %raw, "ignoring malformed setting");
                defaults.auto_start_warehouse
            }),
        };

        Self {
            host: non_blank(source, KEY_HOST).map(|h| normalize_host(&h)),
            sp_secret,
            warehouse_id: non_blank(source, KEY_WAREHOUSE_ID),
            genie_space_id: non_blank(source, KEY_GENIE_SPACE_ID),
            token_header: non_blank(source, KEY_TOKEN_HEADER)
                .unwrap_or(defaults.token_header)
                .to_ascii_lowercase(),
            username_header: non_blank(source, KEY_USERNAME_HEADER)
                .unwrap_or(defaults.username_header)
                .to_ascii_lowercase(),
            addr: non_blank(source, KEY_ADDR).unwrap_or(defaults.addr),
            request_timeout: Duration::from_secs(parsed(
                source,
                KEY_REQUEST_TIMEOUT_SECS,
                defaults.request_timeout.as_secs(),
            )),
            poll: PollPolicy {
                interval: Duration::from_millis(parsed(
                    source,
                    KEY_POLL_INTERVAL_MS,
                    defaults.poll.interval.as_millis() as u64,
                )),
                max_polls: parsed(source, KEY_MAX_POLLS, defaults.poll.max_polls),
            },
            auto_start_warehouse,
        }
    }

    /// Process environment layered over the manifest at `LAKEAPPS_CONFIG`
    /// (default `app.yaml`). A missing manifest is not an error.
    pub fn load() -> Result<Self, String> {
        let env: HashMap<String, String> = std::env::vars().collect();
        let path = env
            .get(KEY_CONFIG)
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::load_layered(Path::new(&path), env)
    }

    pub fn load_layered(
        manifest_path: &Path,
        overrides: HashMap<String, String>,
    ) -> Result<Self, String> {
        let mut source = if manifest_path.exists() {
            let content = std::fs::read_to_string(manifest_path)
                .map_err(|e| format!("Failed to read {}: {e}", manifest_path.display()))?;
            parse_manifest(&content)?
        } else {
            tracing::debug!(path = %manifest_path.display(), "no app manifest, using environment only");
            HashMap::new()
        };
        source.extend(overrides);
        Ok(Self::from_source(&source))
    }

    pub fn require_host(&self) -> Result<&str, AppError> {
        self.host.as_deref().ok_or_else(|| {
            AppError::configuration(format!(
                "Platform SDK not configured. Check environment variables like {KEY_HOST}."
            ))
        })
    }

    pub fn require_sp_secret(&self) -> Result<&SpSecret, AppError> {
        self.sp_secret.as_ref().ok_or_else(|| {
            AppError::configuration(format!(
                "No service principal credentials configured. Set {KEY_TOKEN} or \
                 {KEY_CLIENT_ID}/{KEY_CLIENT_SECRET}."
            ))
        })
    }

    /// Explicit selection wins over the configured default warehouse.
    pub fn warehouse(&self, selected: Option<&str>) -> Result<WarehouseRef, AppError> {
        match selected.map(str::trim).filter(|s| !s.is_empty()) {
            Some(value) => WarehouseRef::parse(value),
            None => self
                .warehouse_id
                .as_deref()
                .map(WarehouseRef::parse)
                .unwrap_or_else(|| {
                    Err(AppError::configuration(format!(
                        "SQL Warehouse ID not configured ({KEY_WAREHOUSE_ID})"
                    )))
                }),
        }
    }

    pub fn credential_resolver(&self) -> CredentialResolver {
        CredentialResolver::new(&self.token_header, &self.username_header)
    }
}
