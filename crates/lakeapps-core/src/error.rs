//! Unified Error Model
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// OBO was requested but the forwarded token header is absent or blank.
    #[error("AUTH/missing token: `{header}` not found on the request")]
    MissingToken { header: String },

    #[error("CONFIG/{0}")]
    Configuration(String),

    #[error("CONN/{0}")]
    Connection(String),

    /// Non-2xx or structurally unexpected response from the platform.
    #[error("UPSTREAM/{title}: {detail}")]
    Upstream { title: String, detail: String },

    #[error("INPUT/{0}")]
    InvalidInput(String),
}

/// Stable, serializable discriminant of [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingToken,
    Configuration,
    Connection,
    Upstream,
    InvalidInput,
}

impl AppError {
    pub fn missing_token(header: impl Into<String>) -> Self {
        AppError::MissingToken {
            header: header.into(),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        AppError::Connection(msg.into())
    }

    pub fn upstream(title: impl Into<String>, detail: impl Into<String>) -> Self {
        AppError::Upstream {
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn access_denied(detail: impl Into<String>) -> Self {
        Self::upstream("Access Denied", detail)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::MissingToken { .. } => ErrorKind::MissingToken,
            AppError::Configuration(_) => ErrorKind::Configuration,
            AppError::Connection(_) => ErrorKind::Connection,
            AppError::Upstream { .. } => ErrorKind::Upstream,
            AppError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Short heading suitable for an alert box.
    pub fn title(&self) -> &str {
        match self {
            AppError::MissingToken { .. } => "OBO Token Missing",
            AppError::Configuration(_) => "Configuration Error",
            AppError::Connection(_) => "Connection Error",
            AppError::Upstream { title, .. } => title,
            AppError::InvalidInput(_) => "Invalid Input",
        }
    }

    /// Human-readable body, without the category prefix used by `Display`.
    pub fn detail(&self) -> String {
        match self {
            AppError::MissingToken { header } => format!(
                "{header} not found. Cannot call the platform on behalf of the user; \
                 ensure user authorization is enabled for the app."
            ),
            AppError::Configuration(msg)
            | AppError::Connection(msg)
            | AppError::InvalidInput(msg) => msg.clone(),
            AppError::Upstream { detail, .. } => detail.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_title_and_detail() {
        let err = AppError::missing_token("x-forwarded-access-token");
        assert_eq!(err.kind(), ErrorKind::MissingToken);
        assert_eq!(err.title(), "OBO Token Missing");
        assert!(err.detail().starts_with("x-forwarded-access-token not found"));
    }

    #[test]
    fn test_upstream_carries_its_own_title() {
        let err = AppError::access_denied("empty response");
        assert_eq!(err.title(), "Access Denied");
        assert_eq!(err.to_string(), "UPSTREAM/Access Denied: empty response");
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::MissingToken).unwrap();
        assert_eq!(json, "\"missing_token\"");
    }
}
