//! Credentials and the resolver that derives them from a request
//!
//! Two authorization modes exist. The service principal is the app's own
//! identity and needs nothing from the request. On-behalf-of reuses the end
//! user's token forwarded by the platform's proxy.

use crate::context::RequestContext;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TOKEN_HEADER: &str = "x-forwarded-access-token";
pub const DEFAULT_USERNAME_HEADER: &str = "x-forwarded-preferred-username";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthMode {
    #[serde(rename = "sp")]
    ServicePrincipal,
    #[serde(rename = "obo")]
    OnBehalfOf,
}

impl AuthMode {
    pub const ALL: [AuthMode; 2] = [AuthMode::ServicePrincipal, AuthMode::OnBehalfOf];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::ServicePrincipal => "sp",
            AuthMode::OnBehalfOf => "obo",
        }
    }

    /// Phrase used in result messages ("... using {}").
    pub fn describe(&self) -> &'static str {
        match self {
            AuthMode::ServicePrincipal => "the service principal's permissions",
            AuthMode::OnBehalfOf => "your OBO identity",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sp" | "service-principal" | "service_principal" => Ok(AuthMode::ServicePrincipal),
            "obo" | "on-behalf-of" | "on_behalf_of" => Ok(AuthMode::OnBehalfOf),
            other => Err(AppError::invalid_input(format!(
                "unknown authorization mode `{other}` (expected `sp` or `obo`)"
            ))),
        }
    }
}

/// A bearer token that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretToken(<{} bytes redacted>)", self.0.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// App identity; the factory supplies the actual secret from configuration.
    ServicePrincipal,
    OnBehalfOf(SecretToken),
}

impl Credential {
    pub fn mode(&self) -> AuthMode {
        match self {
            Credential::ServicePrincipal => AuthMode::ServicePrincipal,
            Credential::OnBehalfOf(_) => AuthMode::OnBehalfOf,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CredentialResolver {
    token_header: String,
    username_header: String,
}

impl CredentialResolver {
    pub fn new(token_header: impl Into<String>, username_header: impl Into<String>) -> Self {
        Self {
            token_header: token_header.into(),
            username_header: username_header.into(),
        }
    }

    pub fn token_header(&self) -> &str {
        &self.token_header
    }

    pub fn username_header(&self) -> &str {
        &self.username_header
    }

    pub fn resolve(&self, ctx: &RequestContext, mode: AuthMode) -> Result<Credential, AppError> {
        match mode {
            AuthMode::ServicePrincipal => Ok(Credential::ServicePrincipal),
            AuthMode::OnBehalfOf => self.on_behalf_of(ctx),
        }
    }

    pub fn on_behalf_of(&self, ctx: &RequestContext) -> Result<Credential, AppError> {
        ctx.non_blank_header(&self.token_header)
            .map(|token| Credential::OnBehalfOf(SecretToken::new(token)))
            .ok_or_else(|| AppError::missing_token(self.token_header.clone()))
    }

    pub fn forwarded_token<'a>(&self, ctx: &'a RequestContext) -> Option<&'a str> {
        ctx.non_blank_header(&self.token_header)
    }

    pub fn forwarded_username<'a>(&self, ctx: &'a RequestContext) -> Option<&'a str> {
        ctx.non_blank_header(&self.username_header)
    }
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_HEADER, DEFAULT_USERNAME_HEADER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_principal_ignores_request() {
        let resolver = CredentialResolver::default();
        let cred = resolver
            .resolve(&RequestContext::new(), AuthMode::ServicePrincipal)
            .unwrap();
        assert_eq!(cred, Credential::ServicePrincipal);
    }

    #[test]
    fn test_obo_requires_token() {
        let resolver = CredentialResolver::default();
        let err = resolver
            .resolve(&RequestContext::new(), AuthMode::OnBehalfOf)
            .unwrap_err();
        assert_eq!(err, AppError::missing_token(DEFAULT_TOKEN_HEADER));
    }

    #[test]
    fn test_obo_empty_token_is_missing() {
        let resolver = CredentialResolver::default();
        let ctx = RequestContext::from_pairs([(DEFAULT_TOKEN_HEADER, "")]);
        let err = resolver.resolve(&ctx, AuthMode::OnBehalfOf).unwrap_err();
        assert_eq!(err.title(), "OBO Token Missing");
    }

    #[test]
    fn test_obo_uses_configured_header() {
        let resolver = CredentialResolver::new("x-user-token", "x-user-name");
        let ctx = RequestContext::from_pairs([
            (DEFAULT_TOKEN_HEADER, "ignored"),
            ("X-User-Token", "tok-123"),
        ]);
        let cred = resolver.resolve(&ctx, AuthMode::OnBehalfOf).unwrap();
        assert_eq!(cred, Credential::OnBehalfOf(SecretToken::new("tok-123")));
        assert_eq!(cred.mode(), AuthMode::OnBehalfOf);
    }

    #[test]
    fn test_secret_token_debug_is_redacted() {
        let cred = Credential::OnBehalfOf(SecretToken::new("super-secret"));
        let printed = format!("{cred:?}");
        assert!(!printed.contains("super-secret"));
    }

    #[test]
    fn test_auth_mode_parsing() {
        assert_eq!("SP".parse::<AuthMode>().unwrap(), AuthMode::ServicePrincipal);
        assert_eq!("on-behalf-of".parse::<AuthMode>().unwrap(), AuthMode::OnBehalfOf);
        assert!("admin".parse::<AuthMode>().is_err());
        assert_eq!(serde_json::to_string(&AuthMode::OnBehalfOf).unwrap(), "\"obo\"");
    }
}
