//! Service principal token acquisition.
use crate::http::transport_error;
use lakeapps_core::{AppError, SecretToken, SpSecret};
use serde::Deserialize;

pub const OIDC_TOKEN_PATH: &str = "/oidc/v1/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// A static token is used as-is; client credentials go through the
/// workspace OAuth machine-to-machine flow.
pub async fn service_principal_token(
    http: &reqwest::Client,
    host: &str,
    secret: &SpSecret,
) -> Result<SecretToken, AppError> {
    let (client_id, client_secret) = match secret {
        SpSecret::Token(token) => return Ok(SecretToken::new(token.clone())),
        SpSecret::OAuth {
            client_id,
            client_secret,
        } => (client_id, client_secret),
    };

    let response = http
        .post(format!("{host}{OIDC_TOKEN_PATH}"))
        .basic_auth(client_id, Some(client_secret))
        .form(&[("grant_type", "client_credentials"), ("scope", "all-apis")])
        .send()
        .await
        .map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::connection(format!(
            "Service principal token exchange failed with HTTP {}",
            status.as_u16()
        )));
    }

    let body: TokenResponse = response.json().await.map_err(|e| {
        AppError::upstream("Malformed Response", format!("token endpoint: {e}"))
    })?;
    body.access_token
        .filter(|t| !t.is_empty())
        .map(SecretToken::new)
        .ok_or_else(|| {
            AppError::upstream("Malformed Response", "token endpoint returned no access_token")
        })
}
