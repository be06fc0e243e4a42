//! Platform connector: builds an authorized client for one invocation path.
//!
//! Connecting performs a handshake against the target. Workspace targets
//! fetch the current user; warehouse targets wait for the warehouse to be
//! `RUNNING`, starting it once when allowed.

use crate::auth::service_principal_token;
use crate::http::{is_access_denied, PlatformClient};
use crate::identity::ME_PATH;
use crate::warehouses::ensure_running;
use async_trait::async_trait;
use lakeapps_core::{AppError, ClientFactory, Credential, ResourceLocator, SecretToken, Settings};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PlatformConnector {
    settings: Arc<Settings>,
}

impl PlatformConnector {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn http(&self) -> Result<reqwest::Client, AppError> {
        reqwest::Client::builder()
            .timeout(self.settings.request_timeout)
            .user_agent(concat!("lakeapps/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::connection(format!("could not build HTTP client: {e}")))
    }

    async fn bearer(
        &self,
        http: &reqwest::Client,
        host: &str,
        credential: &Credential,
    ) -> Result<SecretToken, AppError> {
        match credential {
            Credential::ServicePrincipal => {
                let secret = self.settings.require_sp_secret()?;
                service_principal_token(http, host, secret).await
            }
            Credential::OnBehalfOf(token) => Ok(token.clone()),
        }
    }
}

/// A rejected bearer during the handshake is a connection failure
/// (expired or revoked token), not an upstream answer.
fn handshake_error(err: AppError) -> AppError {
    if is_access_denied(&err) {
        AppError::connection(format!("handshake rejected: {}", err.detail()))
    } else {
        err
    }
}

#[async_trait]
impl ClientFactory for PlatformConnector {
    type Client = PlatformClient;

    async fn connect(
        &self,
        credential: &Credential,
        target: &ResourceLocator,
    ) -> Result<PlatformClient, AppError> {
        let host = self.settings.require_host()?;
        let http = self.http()?;
        let bearer = self.bearer(&http, host, credential).await?;
        let mut client = PlatformClient::new(
            http,
            host,
            bearer,
            credential.mode(),
            target.clone(),
            self.settings.poll,
        );

        match target {
            ResourceLocator::Workspace => {
                let user = client.get_json(ME_PATH).await.map_err(handshake_error)?;
                client.set_current_user(user);
            }
            ResourceLocator::Warehouse(warehouse) => {
                ensure_running(&client, warehouse, self.settings.auto_start_warehouse)
                    .await
                    .map_err(handshake_error)?;
            }
        }

        tracing::debug!(mode = %credential.mode(), %target, "platform connection ready");
        Ok(client)
    }
}
