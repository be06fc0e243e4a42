//! Forwarded identity inspection.
//!
//! The forwarded token is decoded for display only. Its signature is never
//! checked here: the platform validates the token on every downstream call.

use crate::context::RequestContext;
use crate::credential::CredentialResolver;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OboReadiness {
    Ready,
    MissingSqlScope,
    NoToken,
}

impl OboReadiness {
    pub fn title(&self) -> &'static str {
        match self {
            OboReadiness::Ready => "OBO Ready",
            OboReadiness::MissingSqlScope => "Missing SQL Scope",
            OboReadiness::NoToken => "No OBO Token",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            OboReadiness::Ready => {
                "OBO token found with SQL scope. You can run queries using your identity."
            }
            OboReadiness::MissingSqlScope => {
                "OBO token found but missing SQL scope. Cannot run queries."
            }
            OboReadiness::NoToken => "No OBO token found. Cannot run queries using your identity.",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityReport {
    pub username: Option<String>,
    pub has_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_token: Option<String>,
    /// Pretty-printed claims, or the decode error.
    pub decoded: String,
    pub scopes: Vec<String>,
    pub readiness: OboReadiness,
    pub readiness_title: String,
    pub readiness_message: String,
    pub service_principal: String,
}

/// Decodes the payload segment of a JWT without verifying it.
pub fn decode_claims_unverified(token: &str) -> Result<Map<String, Value>, String> {
    let mut parts = token.trim().splitn(3, '.');
    let payload = match (parts.next(), parts.next()) {
        (Some(_header), Some(payload)) if !payload.is_empty() => payload,
        _ => return Err("Invalid JWT format: less than 2 segments".to_string()),
    };

    // Some issuers pad; the URL-safe engine here rejects padding.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| format!("Invalid JWT payload base64: {e}"))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(claims)) => Ok(claims),
        Ok(_) => Err("Invalid JWT payload: not a JSON object".to_string()),
        Err(e) => Err(format!("Invalid JWT payload JSON: {e}")),
    }
}

/// Space-separated `scope` claim, or an `scp` array.
pub fn scopes(claims: &Map<String, Value>) -> Vec<String> {
    match (claims.get("scope"), claims.get("scp")) {
        (Some(Value::String(s)), _) => s.split_whitespace().map(str::to_string).collect(),
        (_, Some(Value::Array(items))) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        (_, Some(Value::String(s))) => s.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

pub fn has_sql_scope(scopes: &[String]) -> bool {
    scopes.iter().any(|s| s.to_ascii_lowercase().contains("sql"))
}

/// Builds the identity report for a request. `service_principal` is the
/// already-resolved display name of the app identity.
pub fn inspect(
    resolver: &CredentialResolver,
    ctx: &RequestContext,
    service_principal: String,
) -> IdentityReport {
    let username = resolver.forwarded_username(ctx).map(str::to_string);
    let token = resolver.forwarded_token(ctx);

    let (decoded, scopes, readiness) = match token {
        None => (
            "No token to decode".to_string(),
            Vec::new(),
            OboReadiness::NoToken,
        ),
        Some(token) => match decode_claims_unverified(token) {
            Ok(claims) => {
                let scopes = scopes(&claims);
                let readiness = if has_sql_scope(&scopes) {
                    OboReadiness::Ready
                } else {
                    OboReadiness::MissingSqlScope
                };
                let pretty = serde_json::to_string_pretty(&Value::Object(claims))
                    .unwrap_or_else(|e| format!("Error rendering claims: {e}"));
                (pretty, scopes, readiness)
            }
            Err(e) => (
                format!("Error decoding JWT: {e}"),
                Vec::new(),
                OboReadiness::MissingSqlScope,
            ),
        },
    };

    IdentityReport {
        username,
        has_token: token.is_some(),
        raw_token: token.map(str::to_string),
        decoded,
        scopes,
        readiness,
        readiness_title: readiness.title().to_string(),
        readiness_message: readiness.message().to_string(),
        service_principal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{DEFAULT_TOKEN_HEADER, DEFAULT_USERNAME_HEADER};
    use serde_json::json;

    fn jwt(claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn test_decode_claims() {
        let token = jwt(json!({"sub": "user@example.com", "scope": "sql offline_access"}));
        let claims = decode_claims_unverified(&token).unwrap();
        assert_eq!(claims["sub"], json!("user@example.com"));
        assert_eq!(scopes(&claims), vec!["sql", "offline_access"]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_claims_unverified("not-a-jwt").is_err());
        assert!(decode_claims_unverified("a.!!!.c").is_err());
    }

    #[test]
    fn test_scp_array() {
        let claims = json!({"scp": ["dashboards.genie", "iam.current-user:read"]});
        let Value::Object(claims) = claims else { unreachable!() };
        assert_eq!(scopes(&claims).len(), 2);
        assert!(!has_sql_scope(&scopes(&claims)));
    }

    #[test]
    fn test_inspect_ready_with_sql_scope() {
        let token = jwt(json!({"scope": "iam.access-control:read SQL"}));
        let ctx = RequestContext::from_pairs([
            (DEFAULT_TOKEN_HEADER, token.as_str()),
            (DEFAULT_USERNAME_HEADER, "ana@example.com"),
        ]);
        let report = inspect(&CredentialResolver::default(), &ctx, "app-sp".to_string());

        assert_eq!(report.readiness, OboReadiness::Ready);
        assert_eq!(report.username.as_deref(), Some("ana@example.com"));
        assert!(report.has_token);
        assert_eq!(report.service_principal, "app-sp");
    }

    #[test]
    fn test_inspect_missing_scope() {
        let token = jwt(json!({"scope": "offline_access"}));
        let ctx = RequestContext::from_pairs([(DEFAULT_TOKEN_HEADER, token)]);
        let report = inspect(&CredentialResolver::default(), &ctx, String::new());
        assert_eq!(report.readiness, OboReadiness::MissingSqlScope);
        assert_eq!(report.readiness_title, "Missing SQL Scope");
    }

    #[test]
    fn test_inspect_without_token() {
        let ctx = RequestContext::from_pairs([(DEFAULT_TOKEN_HEADER, "")]);
        let report = inspect(&CredentialResolver::default(), &ctx, String::new());
        assert_eq!(report.readiness, OboReadiness::NoToken);
        assert!(!report.has_token);
        assert!(report.raw_token.is_none());
    }

    #[test]
    fn test_inspect_undecodable_token() {
        let ctx = RequestContext::from_pairs([(DEFAULT_TOKEN_HEADER, "opaque-token")]);
        let report = inspect(&CredentialResolver::default(), &ctx, String::new());
        assert!(report.has_token);
        assert!(report.decoded.starts_with("Error decoding JWT"));
        assert_eq!(report.readiness, OboReadiness::MissingSqlScope);
    }
}
