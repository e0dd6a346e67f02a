//! Request context capture and API-key authentication.
//!
//! A [`ContextProvider`] runs before every MCP dispatch. It sees the request
//! headers and produces the [`CallContext`] that a new session snapshots.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Who made the call, as established by the authentication strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Strategy that authenticated the caller (e.g. `mcpApiKey`).
    pub strategy: String,
    /// User the key belongs to.
    pub user: String,
}

/// Application-defined parameter bag captured per call.
///
/// Sessions keep the context of their handshake request and hand it,
/// unchanged, to every tool invoked on that session.
#[derive(Debug, Clone, Serialize)]
pub struct CallContext {
    /// Transport the call arrived on.
    pub provider: String,
    pub identity: Option<Identity>,
    /// Request headers with lower-cased names. Credentials are not copied.
    pub headers: BTreeMap<String, String>,
    pub received_at: DateTime<Utc>,
}

impl CallContext {
    /// Context for an unauthenticated caller.
    pub fn anonymous() -> Self {
        Self {
            provider: "rest".to_string(),
            identity: None,
            headers: BTreeMap::new(),
            received_at: Utc::now(),
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn user(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.user.as_str())
    }
}

/// Authentication failures surfaced before dispatch.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("API key is missing")]
    Missing,
    #[error("Invalid API key")]
    Invalid,
}

/// Pre-dispatch hook: inspects the request and builds the call context.
pub trait ContextProvider: Send + Sync {
    fn provide(&self, headers: &HeaderMap) -> Result<CallContext, AuthError>;
}

/// Accepts every request and records its headers.
#[derive(Debug, Clone, Default)]
pub struct AnonymousContextProvider;

impl ContextProvider for AnonymousContextProvider {
    fn provide(&self, headers: &HeaderMap) -> Result<CallContext, AuthError> {
        Ok(capture_headers(CallContext::anonymous(), headers, None))
    }
}

/// API-key authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Header carrying the key, lower-cased.
    pub header: String,
    /// Accepted keys mapped to the user they belong to.
    pub api_keys: HashMap<String, String>,
}

impl AuthConfig {
    pub fn new(header: impl Into<String>, api_keys: HashMap<String, String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
            api_keys,
        }
    }

    /// Authentication is enabled when at least one key is configured.
    pub fn enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// Look up the user for a key.
    pub fn verify_api_key(&self, key: &str) -> Option<&str> {
        self.api_keys.get(key).map(String::as_str)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(header::AUTHORIZATION.as_str(), HashMap::new())
    }
}

/// Authenticates callers with an API key sent as `<header>: Bearer <key>`.
#[derive(Debug, Clone)]
pub struct ApiKeyContextProvider {
    config: AuthConfig,
}

impl ApiKeyContextProvider {
    pub const STRATEGY: &'static str = "mcpApiKey";

    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    fn extract_key<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let raw = headers.get(self.config.header.as_str())?.to_str().ok()?;
        let key = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
        (!key.is_empty()).then_some(key)
    }
}

impl ContextProvider for ApiKeyContextProvider {
    fn provide(&self, headers: &HeaderMap) -> Result<CallContext, AuthError> {
        let context = capture_headers(
            CallContext::anonymous(),
            headers,
            Some(self.config.header.as_str()),
        );

        if !self.config.enabled() {
            return Ok(context);
        }

        let key = self.extract_key(headers).ok_or(AuthError::Missing)?;
        let user = self.config.verify_api_key(key).ok_or_else(|| {
            warn!("MCP: Authentication failed - unknown API key");
            AuthError::Invalid
        })?;

        debug!("MCP: Authenticated user {}", user);
        Ok(context.with_identity(Identity {
            strategy: Self::STRATEGY.to_string(),
            user: user.to_string(),
        }))
    }
}

fn capture_headers(
    mut context: CallContext,
    headers: &HeaderMap,
    credential_header: Option<&str>,
) -> CallContext {
    for (name, value) in headers {
        if Some(name.as_str()) == credential_header || *name == header::AUTHORIZATION {
            continue;
        }
        if let Ok(value) = value.to_str() {
            context.headers.insert(name.as_str().to_string(), value.to_string());
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn provider() -> ApiKeyContextProvider {
        let mut keys = HashMap::new();
        keys.insert("secret-key".to_string(), "alice".to_string());
        ApiKeyContextProvider::new(AuthConfig::new("Authorization", keys))
    }

    #[test]
    fn missing_key_is_rejected() {
        assert_eq!(
            provider().provide(&HeaderMap::new()).unwrap_err(),
            AuthError::Missing
        );
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer nope"),
        );
        assert_eq!(
            provider().provide(&headers).unwrap_err(),
            AuthError::Invalid
        );
    }

    #[test]
    fn valid_key_sets_identity_and_hides_credential() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer secret-key"),
        );
        headers.insert("x-request-id", HeaderValue::from_static("req-1"));

        let context = provider().provide(&headers).unwrap();
        assert_eq!(context.user(), Some("alice"));
        assert_eq!(context.identity.unwrap().strategy, "mcpApiKey");
        assert_eq!(context.headers.get("x-request-id").unwrap(), "req-1");
        assert!(!context.headers.contains_key("authorization"));
    }

    #[test]
    fn custom_header_without_bearer_prefix() {
        let mut keys = HashMap::new();
        keys.insert("k1".to_string(), "bob".to_string());
        let provider = ApiKeyContextProvider::new(AuthConfig::new("X-API-Key", keys));

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("k1"));
        let context = provider.provide(&headers).unwrap();
        assert_eq!(context.user(), Some("bob"));
        assert!(!context.headers.contains_key("x-api-key"));
    }

    #[test]
    fn disabled_auth_yields_anonymous_context() {
        let provider = ApiKeyContextProvider::new(AuthConfig::default());
        let context = provider.provide(&HeaderMap::new()).unwrap();
        assert!(context.identity.is_none());
        assert_eq!(context.provider, "rest");
    }

    #[test]
    fn anonymous_provider_records_headers_but_not_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer x"));
        headers.insert("x-tenant", HeaderValue::from_static("acme"));

        let context = AnonymousContextProvider.provide(&headers).unwrap();
        assert!(context.identity.is_none());
        assert_eq!(context.header("x-tenant"), Some("acme"));
        assert!(context.header("authorization").is_none());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let context = CallContext::anonymous().with_header("X-Tenant", "acme");
        assert_eq!(context.header("x-tenant"), Some("acme"));
        assert_eq!(context.header("X-TENANT"), Some("acme"));
    }
}
