//! Authorized platform client handle.
//!
//! A `PlatformClient` is created by the factory for exactly one invocation
//! path. Dropping it releases the underlying connection pool.

use lakeapps_core::{AppError, AuthMode, PollPolicy, ResourceLocator, SecretToken};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;

pub struct PlatformClient {
    http: reqwest::Client,
    host: String,
    bearer: SecretToken,
    mode: AuthMode,
    target: ResourceLocator,
    poll: PollPolicy,
    current_user: Option<Value>,
}

impl PlatformClient {
    pub(crate) fn new(
        http: reqwest::Client,
        host: impl Into<String>,
        bearer: SecretToken,
        mode: AuthMode,
        target: ResourceLocator,
        poll: PollPolicy,
    ) -> Self {
        Self {
            http,
            host: host.into(),
            bearer,
            mode,
            target,
            poll,
            current_user: None,
        }
    }

    /// The mode of the credential this client was built from.
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn target(&self) -> &ResourceLocator {
        &self.target
    }

    pub fn poll(&self) -> PollPolicy {
        self.poll
    }

    /// Identity returned by the workspace handshake, if one was made.
    pub fn current_user(&self) -> Option<&Value> {
        self.current_user.as_ref()
    }

    pub(crate) fn set_current_user(&mut self, user: Value) {
        self.current_user = Some(user);
    }

    pub async fn get_json(&self, path: &str) -> Result<Value, AppError> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, AppError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.host, path))
            .bearer_auth(self.bearer.expose())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, AppError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let url = response.url().path().to_string();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(status_error(status, &url, &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            AppError::upstream("Malformed Response", format!("{url} returned invalid JSON: {e}"))
        })
    }
}

impl Drop for PlatformClient {
    fn drop(&mut self) {
        tracing::debug!(mode = %self.mode, target = %self.target, "released platform connection");
    }
}

pub(crate) fn transport_error(err: reqwest::Error) -> AppError {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    match err.url() {
        Some(url) => AppError::connection(format!("{} {kind}: {err}", url.path())),
        None => AppError::connection(format!("{kind}: {err}")),
    }
}

/// Platform error bodies look like `{"error_code": "...", "message": "..."}`.
fn platform_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

pub(crate) fn status_error(status: StatusCode, url: &str, body: &str) -> AppError {
    let detail = format!("{url} returned HTTP {}: {}", status.as_u16(), platform_message(body));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::access_denied(detail),
        StatusCode::NOT_FOUND => AppError::upstream("Not Found", detail),
        _ => AppError::upstream("API Error", detail),
    }
}

pub(crate) fn is_access_denied(err: &AppError) -> bool {
    matches!(err, AppError::Upstream { title, .. } if title == "Access Denied")
}
