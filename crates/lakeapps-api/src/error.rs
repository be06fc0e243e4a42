//! Request-level failures: the only non-200 responses the API produces.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lakeapps_core::AppError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// Unparseable route segment or request field.
    BadRequest(AppError),
    Internal(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::BadRequest(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(err) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: err.title().to_string(),
                    message: err.detail(),
                },
            ),
            ApiError::Internal(message) => {
                tracing::error!(%message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "Internal Error".to_string(),
                        message,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
