//! Genie conversational-analytics API
//!
//! Spaces and conversations have one documented shape each. Messages do not:
//! several endpoint shapes exist across workspaces, so listing them walks an
//! ordered table of `(endpoint template, response key)` routes and stops at
//! the first response whose key holds an array.

use crate::http::PlatformClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lakeapps_core::{row, AppError, Operation, ResourceLocator, Row, Tabular};
use serde_json::{json, Map, Value};

pub const SPACES_PATH: &str = "/api/2.0/genie/spaces";

const ID_KEYS: &[&str] = &[
    "id",
    "space_id",
    "conversation_id",
    "message_id",
    "_id",
    "genie_space_id",
    "genie_conversation_id",
];
const TITLE_KEYS: &[&str] = &["title", "name", "display_name"];
const CONTENT_KEYS: &[&str] = &["content", "text", "message"];
const ROLE_KEYS: &[&str] = &["role", "type", "sender"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "created_at", "created_timestamp", "time"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRoute {
    /// Path with `{space_id}` and `{conversation_id}` placeholders.
    pub template: String,
    /// Response key expected to hold the message array.
    pub key: String,
}

impl MessageRoute {
    pub fn new(template: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            key: key.into(),
        }
    }

    pub fn render(&self, space_id: &str, conversation_id: &str) -> String {
        self.template
            .replace("{space_id}", space_id)
            .replace("{conversation_id}", conversation_id)
    }
}

/// Default lookup order. No route is authoritative; this is an ordering
/// choice, and workspaces that expose a different shape can pass their own.
pub fn default_message_routes() -> Vec<MessageRoute> {
    vec![
        MessageRoute::new(
            "/api/2.0/genie/spaces/{space_id}/conversations/{conversation_id}/messages",
            "messages",
        ),
        MessageRoute::new(
            "/api/2.0/genie/conversations/{conversation_id}/messages",
            "messages",
        ),
        MessageRoute::new(
            "/api/2.0/genie/spaces/{space_id}/conversations/{conversation_id}",
            "messages",
        ),
        MessageRoute::new(
            "/api/2.0/genie/spaces/{space_id}/conversations/{conversation_id}/messages",
            "items",
        ),
    ]
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First non-empty value among `keys`, in order.
pub fn sniff(item: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| item.get(*k).and_then(scalar_text))
}

/// Epoch milliseconds become RFC 3339; strings pass through.
fn sniff_timestamp(item: &Map<String, Value>) -> Option<String> {
    TIMESTAMP_KEYS.iter().find_map(|k| match item.get(*k)? {
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|t| t.to_rfc3339()),
        other => scalar_text(other),
    })
}

fn objects(items: &[Value]) -> impl Iterator<Item = &Map<String, Value>> {
    items.iter().filter_map(Value::as_object)
}

/// Ids end up in request paths.
fn validate_id<'a>(what: &str, value: &'a str) -> Result<&'a str, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::invalid_input(format!("Please select a {what} first.")));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::invalid_input(format!("`{value}` is not a valid {what} id")));
    }
    Ok(value)
}

/// Interprets a spaces response, telling permission problems apart from
/// format changes.
pub fn spaces_from(body: Value) -> Result<Vec<Value>, AppError> {
    match body {
        Value::Null => Err(AppError::access_denied(
            "Failed to retrieve Genie spaces. The identity may lack Genie API \
             permissions, Genie may not be enabled in this workspace, or the \
             endpoint is not reachable with these credentials.",
        )),
        Value::Object(map) if map.is_empty() => Err(AppError::access_denied(
            "Empty response from the Genie API. This typically means the \
             'dashboards.genie' scope or Genie access has not been granted.",
        )),
        Value::Object(mut map) => match map.remove("spaces") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) => Ok(Vec::new()),
            _ => {
                let keys: Vec<&String> = map.keys().collect();
                Err(AppError::upstream(
                    "API Error",
                    format!("Unexpected response structure from the Genie API. Response keys: {keys:?}"),
                ))
            }
        },
        other => Err(AppError::upstream(
            "API Error",
            format!(
                "Unexpected response type from the Genie API: expected an object, got {}",
                json_type(&other)
            ),
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn space_row(item: &Map<String, Value>) -> Row {
    row([
        ("id", json!(sniff(item, ID_KEYS).unwrap_or_else(|| "Unknown".into()))),
        ("title", json!(sniff(item, TITLE_KEYS).unwrap_or_else(|| "Untitled".into()))),
        ("description", json!(sniff(item, &["description"]))),
    ])
}

fn conversation_row(item: &Map<String, Value>) -> Row {
    row([
        ("id", json!(sniff(item, ID_KEYS).unwrap_or_else(|| "Unknown".into()))),
        ("title", json!(sniff(item, TITLE_KEYS).unwrap_or_else(|| "Untitled".into()))),
        ("created", json!(sniff_timestamp(item))),
    ])
}

fn message_row(item: &Map<String, Value>) -> Row {
    row([
        ("id", json!(sniff(item, ID_KEYS).unwrap_or_else(|| "Unknown".into()))),
        ("role", json!(sniff(item, ROLE_KEYS).unwrap_or_else(|| "Unknown".into()))),
        ("content", json!(sniff(item, CONTENT_KEYS).unwrap_or_else(|| "No content".into()))),
        ("timestamp", json!(sniff_timestamp(item).unwrap_or_else(|| "Unknown".into()))),
    ])
}

async fn fetch_spaces(client: &PlatformClient) -> Result<Vec<Value>, AppError> {
    spaces_from(client.get_json(SPACES_PATH).await?)
}

async fn fetch_conversations(
    client: &PlatformClient,
    space_id: &str,
) -> Result<Vec<Value>, AppError> {
    let body = client
        .get_json(&format!("{SPACES_PATH}/{space_id}/conversations"))
        .await?;
    match body.get("conversations") {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Ok(Vec::new()),
    }
}

/// Finds the title of the item with `id`; lookup failures are not fatal.
fn title_of(items: &[Value], id: &str) -> Option<String> {
    objects(items)
        .find(|item| sniff(item, ID_KEYS).as_deref() == Some(id))
        .and_then(|item| sniff(item, TITLE_KEYS))
}

async fn space_title(client: &PlatformClient, space_id: &str) -> String {
    let title = match fetch_spaces(client).await {
        Ok(spaces) => title_of(&spaces, space_id),
        Err(e) => {
            tracing::debug!(error = %e, "space title lookup failed");
            None
        }
    };
    title.unwrap_or_else(|| "Unknown Space".to_string())
}

pub struct ListSpaces;

#[async_trait]
impl Operation<PlatformClient> for ListSpaces {
    fn id(&self) -> &'static str {
        "genie.list_spaces"
    }

    fn subject(&self) -> String {
        "Genie spaces".to_string()
    }

    fn target(&self) -> Result<ResourceLocator, AppError> {
        Ok(ResourceLocator::Workspace)
    }

    async fn execute(&self, client: &PlatformClient) -> Result<Tabular, AppError> {
        let spaces = fetch_spaces(client).await?;
        let rows: Vec<Row> = objects(&spaces).map(space_row).collect();
        let data = Tabular::new(vec!["id".into(), "title".into(), "description".into()], rows);
        let message = if data.rows.is_empty() {
            "No Genie spaces found.".to_string()
        } else {
            format!(
                "Success! Found {} Genie spaces using {}.",
                data.rows.len(),
                client.mode().describe()
            )
        };
        Ok(data.with_message(message))
    }
}

pub struct ListConversations {
    space_id: String,
}

impl ListConversations {
    pub fn new(space_id: impl Into<String>) -> Self {
        Self {
            space_id: space_id.into(),
        }
    }
}

#[async_trait]
impl Operation<PlatformClient> for ListConversations {
    fn id(&self) -> &'static str {
        "genie.list_conversations"
    }

    fn subject(&self) -> String {
        format!("space {}", self.space_id)
    }

    fn target(&self) -> Result<ResourceLocator, AppError> {
        validate_id("space", &self.space_id)?;
        Ok(ResourceLocator::Workspace)
    }

    async fn execute(&self, client: &PlatformClient) -> Result<Tabular, AppError> {
        let space_id = validate_id("space", &self.space_id)?;
        let space_name = space_title(client, space_id).await;
        let conversations = fetch_conversations(client, space_id).await?;

        let rows: Vec<Row> = objects(&conversations).map(conversation_row).collect();
        let data = Tabular::new(vec!["id".into(), "title".into(), "created".into()], rows);
        let message = if data.rows.is_empty() {
            format!("No conversations found in space {space_name}.")
        } else {
            format!(
                "Success! Found {} conversations in space {space_name} using {}.",
                data.rows.len(),
                client.mode().describe()
            )
        };
        Ok(data.with_message(message))
    }
}

pub struct ListMessages {
    space_id: String,
    conversation_id: String,
    routes: Vec<MessageRoute>,
}

impl ListMessages {
    pub fn new(space_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            space_id: space_id.into(),
            conversation_id: conversation_id.into(),
            routes: default_message_routes(),
        }
    }

    pub fn with_routes(mut self, routes: Vec<MessageRoute>) -> Self {
        self.routes = routes;
        self
    }

    async fn fetch(
        &self,
        client: &PlatformClient,
        space_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<Value>, AppError> {
        let mut attempts = Vec::with_capacity(self.routes.len());
        for route in &self.routes {
            let path = route.render(space_id, conversation_id);
            match client.get_json(&path).await {
                Ok(mut body) => match body.get_mut(&route.key).map(Value::take) {
                    Some(Value::Array(items)) => {
                        tracing::debug!(%path, key = %route.key, "message route matched");
                        return Ok(items);
                    }
                    _ => attempts.push(format!("{path} (no `{}` list)", route.key)),
                },
                // Nothing else will get through either.
                Err(e @ AppError::Connection(_)) => return Err(e),
                Err(e) => attempts.push(format!("{path} ({})", e.detail())),
            }
        }
        Err(AppError::upstream(
            "No Message Endpoint",
            format!(
                "No message endpoint returned a message list. Tried: {}",
                attempts.join("; ")
            ),
        ))
    }
}

#[async_trait]
impl Operation<PlatformClient> for ListMessages {
    fn id(&self) -> &'static str {
        "genie.list_messages"
    }

    fn subject(&self) -> String {
        format!("conversation {}", self.conversation_id)
    }

    fn target(&self) -> Result<ResourceLocator, AppError> {
        validate_id("space", &self.space_id)?;
        validate_id("conversation", &self.conversation_id)?;
        Ok(ResourceLocator::Workspace)
    }

    async fn execute(&self, client: &PlatformClient) -> Result<Tabular, AppError> {
        let space_id = validate_id("space", &self.space_id)?;
        let conversation_id = validate_id("conversation", &self.conversation_id)?;

        let space_name = space_title(client, space_id).await;
        let conversation_name = match fetch_conversations(client, space_id).await {
            Ok(convs) => title_of(&convs, conversation_id),
            Err(_) => None,
        }
        .unwrap_or_else(|| "Unknown Conversation".to_string());

        let messages = self.fetch(client, space_id, conversation_id).await?;
        let rows: Vec<Row> = objects(&messages).map(message_row).collect();
        let data = Tabular::new(
            vec!["id".into(), "role".into(), "content".into(), "timestamp".into()],
            rows,
        );
        let message = if data.rows.is_empty() {
            format!("No messages found in conversation {conversation_name} in space {space_name}.")
        } else {
            format!(
                "Success! Found {} messages in conversation {conversation_name} in space {space_name} using {}.",
                data.rows.len(),
                client.mode().describe()
            )
        };
        Ok(data.with_message(message))
    }
}

/// Asks a question in a new conversation.
pub struct StartConversation {
    space_id: String,
    question: String,
}

impl StartConversation {
    pub fn new(space_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            space_id: space_id.into(),
            question: question.into(),
        }
    }
}

#[async_trait]
impl Operation<PlatformClient> for StartConversation {
    fn id(&self) -> &'static str {
        "genie.start_conversation"
    }

    fn subject(&self) -> String {
        format!("space {}", self.space_id)
    }

    fn target(&self) -> Result<ResourceLocator, AppError> {
        validate_id("space", &self.space_id)?;
        if self.question.trim().is_empty() {
            return Err(AppError::invalid_input("No question provided"));
        }
        Ok(ResourceLocator::Workspace)
    }

    async fn execute(&self, client: &PlatformClient) -> Result<Tabular, AppError> {
        let space_id = validate_id("space", &self.space_id)?;
        let body = client
            .post_json(
                &format!("{SPACES_PATH}/{space_id}/start-conversation"),
                &json!({ "content": self.question.trim() }),
            )
            .await?;

        let nested = |outer: &str, inner: &str| {
            body.get(outer)
                .and_then(Value::as_object)
                .and_then(|o| sniff(o, &[inner]))
        };
        let conversation_id = body
            .as_object()
            .and_then(|o| sniff(o, &["conversation_id"]))
            .or_else(|| nested("conversation", "id"));
        let message_id = body
            .as_object()
            .and_then(|o| sniff(o, &["message_id"]))
            .or_else(|| nested("message", "id"));
        let status = nested("message", "status").unwrap_or_else(|| "SUBMITTED".to_string());

        let Some(conversation_id) = conversation_id else {
            return Err(AppError::upstream(
                "API Error",
                "start-conversation response did not include a conversation id",
            ));
        };
        Ok(Tabular::from_rows(vec![row([
            ("conversation_id", json!(conversation_id)),
            ("message_id", json!(message_id)),
            ("status", json!(status)),
        ])])
        .with_message(format!(
            "Question submitted to space {space_id} using {}.",
            client.mode().describe()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_spaces_empty_object_is_access_denied() {
        let err = spaces_from(json!({})).unwrap_err();
        assert_eq!(err.title(), "Access Denied");
        assert_eq!(spaces_from(Value::Null).unwrap_err().title(), "Access Denied");
    }

    #[test]
    fn test_spaces_unexpected_keys_is_api_error() {
        let err = spaces_from(json!({"next_page_token": "x"})).unwrap_err();
        assert_eq!(err.title(), "API Error");
        assert!(err.detail().contains("next_page_token"));

        let err = spaces_from(json!([1, 2])).unwrap_err();
        assert!(err.detail().contains("got array"));
    }

    #[test]
    fn test_spaces_list() {
        let spaces = spaces_from(json!({"spaces": [{"space_id": "s1", "title": "Sales"}]})).unwrap();
        let row = space_row(spaces[0].as_object().unwrap());
        assert_eq!(row["id"], json!("s1"));
        assert_eq!(row["title"], json!("Sales"));
    }

    #[test]
    fn test_sniff_order() {
        let item = obj(json!({"_id": "fallback", "id": "", "space_id": "primary"}));
        assert_eq!(sniff(&item, ID_KEYS).as_deref(), Some("primary"));

        let item = obj(json!({"text": "hello", "sender": "user"}));
        let row = message_row(&item);
        assert_eq!(row["content"], json!("hello"));
        assert_eq!(row["role"], json!("user"));
        assert_eq!(row["id"], json!("Unknown"));
    }

    #[test]
    fn test_timestamp_millis_rendered() {
        let item = obj(json!({"created_timestamp": 1_700_000_000_000_i64}));
        assert_eq!(
            sniff_timestamp(&item).as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
    }

    #[test]
    fn test_route_render() {
        let routes = default_message_routes();
        assert_eq!(routes.len(), 4);
        assert_eq!(
            routes[1].render("s", "c"),
            "/api/2.0/genie/conversations/c/messages"
        );
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("space", "01ef-abc_9").is_ok());
        assert_eq!(
            validate_id("space", " ").unwrap_err().detail(),
            "Please select a space first."
        );
        assert!(validate_id("space", "../admin").is_err());
    }
}
