//! Current-user lookups.
use crate::http::PlatformClient;
use async_trait::async_trait;
use lakeapps_core::{row, AppError, Operation, ResourceLocator, Tabular};
use serde_json::{json, Value};

pub const ME_PATH: &str = "/api/2.0/preview/scim/v2/Me";

fn first_of(user: &Value, keys: [&str; 2]) -> Option<String> {
    keys.iter()
        .filter_map(|k| user.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// `displayName`, then `userName`.
pub fn display_name(user: &Value) -> Option<String> {
    first_of(user, ["displayName", "userName"])
}

/// `userName`, then `displayName`. For a service principal the user name is
/// its application id, which is what operators grant permissions to.
pub fn principal_name(user: &Value) -> Option<String> {
    first_of(user, ["userName", "displayName"])
}

/// The caller's SCIM record, reusing the handshake lookup when there was one.
pub async fn current_user(client: &PlatformClient) -> Result<Value, AppError> {
    match client.current_user() {
        Some(user) => Ok(user.clone()),
        None => client.get_json(ME_PATH).await,
    }
}

/// Principal name for the identity behind `client`; never fails.
pub async fn describe_identity(client: &PlatformClient) -> String {
    match current_user(client).await {
        Ok(user) => principal_name(&user).unwrap_or_else(|| "Unknown".to_string()),
        Err(e) => format!("Error ({})", e.detail()),
    }
}

/// Who the platform thinks the caller is.
pub struct WhoAmI;

#[async_trait]
impl Operation<PlatformClient> for WhoAmI {
    fn id(&self) -> &'static str {
        "identity.who_am_i"
    }

    fn subject(&self) -> String {
        "the current user".to_string()
    }

    fn target(&self) -> Result<ResourceLocator, AppError> {
        Ok(ResourceLocator::Workspace)
    }

    async fn execute(&self, client: &PlatformClient) -> Result<Tabular, AppError> {
        let user = current_user(client).await?;
        let user_name = user.get("userName").and_then(Value::as_str);
        Ok(Tabular::from_rows(vec![row([
            ("user_name", json!(user_name)),
            ("display_name", json!(display_name(&user))),
            ("mode", json!(client.mode().as_str())),
        ])]))
    }
}
