//! Request authentication.
//!
//! Owners present a per-owner token; agents present the shared secret.
//! Both arrive in the `Authorization` header, either bare or as
//! `Bearer <token>`.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};

use crate::error::AuthError;

/// Resolves an owner token to the identity that owns expressions.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Owner id for `token`, or `None` if the token is unknown.
    async fn resolve(&self, token: &str) -> Option<String>;
}

/// Fixed token → owner table, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, String>,
}

impl StaticTokens {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    /// Register one more owner.
    pub fn with_owner(mut self, owner: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), owner.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokens {
    async fn resolve(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}

/// Pull the credential out of the `Authorization` header.
///
/// Accepts a bare token or `Bearer <token>`. A scheme with no token is
/// treated as missing credentials.
pub fn credential(headers: &HeaderMap) -> Result<&str, AuthError> {
    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let raw = raw.trim_start();
    let token = match raw.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest,
        _ if raw.trim_end().eq_ignore_ascii_case("bearer") => "",
        _ => raw,
    }
    .trim();

    if token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(token)
}

/// Resolve the owner behind a request.
pub async fn authenticate_owner(
    provider: &dyn IdentityProvider,
    headers: &HeaderMap,
) -> Result<String, AuthError> {
    let token = credential(headers)?;
    provider
        .resolve(token)
        .await
        .ok_or(AuthError::InvalidCredentials)
}

/// Check that a request carries the shared agent secret.
pub fn authenticate_agent(secret: &SecretString, headers: &HeaderMap) -> Result<(), AuthError> {
    let token = credential(headers)?;
    if token == secret.expose_secret() {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bare_and_bearer_credentials() {
        assert_eq!(credential(&headers("abc")).unwrap(), "abc");
        assert_eq!(credential(&headers("Bearer abc")).unwrap(), "abc");
        assert_eq!(
            credential(&HeaderMap::new()),
            Err(AuthError::MissingCredentials)
        );
        assert_eq!(
            credential(&headers("Bearer ")),
            Err(AuthError::MissingCredentials)
        );
    }

    #[test]
    fn scheme_without_token_is_missing() {
        for value in ["Bearer", "bearer", "Bearer   ", "  Bearer", ""] {
            assert_eq!(
                credential(&headers(value)),
                Err(AuthError::MissingCredentials),
                "{value:?}"
            );
        }
        assert_eq!(credential(&headers("bearer  tok-a ")).unwrap(), "tok-a");
        assert_eq!(credential(&headers(" tok-a ")).unwrap(), "tok-a");
    }

    #[tokio::test]
    async fn owner_resolution() {
        let tokens = StaticTokens::default().with_owner("alice", "tok-a");
        assert_eq!(
            authenticate_owner(&tokens, &headers("tok-a")).await.unwrap(),
            "alice"
        );
        assert_eq!(
            authenticate_owner(&tokens, &headers("tok-b")).await,
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn agent_secret_must_match() {
        let secret = SecretString::from("s3cret");
        assert!(authenticate_agent(&secret, &headers("s3cret")).is_ok());
        assert!(authenticate_agent(&secret, &headers("Bearer s3cret")).is_ok());
        assert_eq!(
            authenticate_agent(&secret, &headers("nope")),
            Err(AuthError::InvalidCredentials)
        );
    }
}
