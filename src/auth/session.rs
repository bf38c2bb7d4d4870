//! JWT-backed session lookup.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AuthProvider, UserId};
use crate::error::{GateError, Result};

/// Cookie that carries the session token.
pub const DEFAULT_SESSION_COOKIE: &str = "emma.session-token";
/// Sessions last 30 days.
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Session token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Validates HS256 session tokens from the `Authorization` header or the
/// session cookie.
pub struct JwtSessionProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    cookie_name: String,
    max_age: Duration,
}

impl JwtSessionProvider {
    /// Create a provider with a shared secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            max_age: DEFAULT_SESSION_MAX_AGE,
        }
    }

    /// Set the session cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set how long issued sessions last.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Name of the session cookie.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Lifetime of issued sessions.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Issue a session token for a user.
    pub fn issue(&self, user: &UserId) -> Result<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let exp = now + chrono::Duration::from_std(self.max_age).unwrap_or_default();

        let claims = SessionClaims {
            sub: user.as_str().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| GateError::AuthLookup(format!("session encoding failed: {}", e)))?;

        Ok((token, exp))
    }

    /// Validate a token and return its claims.
    pub fn validate(&self, token: &str) -> Result<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| GateError::AuthLookup(e.to_string()))
    }

    /// Pull the raw token out of a bearer header or the session cookie.
    fn extract_token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        if bearer.is_some() {
            return bearer;
        }

        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value)
            .filter(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for JwtSessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSessionProvider")
            .field("cookie_name", &self.cookie_name)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthProvider for JwtSessionProvider {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<UserId>> {
        let Some(token) = self.extract_token(headers) else {
            return Ok(None);
        };

        match self.validate(token) {
            Ok(claims) => Ok(Some(UserId::new(claims.sub))),
            Err(e) => {
                debug!(error = %e, "Rejected session token");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &[u8] = b"test-secret-key-for-testing-only-32chars";

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_bearer_token_round_trip() {
        let provider = JwtSessionProvider::new(SECRET);
        let (token, expires_at) = provider.issue(&UserId::new("user_1")).unwrap();

        assert!(expires_at > Utc::now());
        let user = provider.authenticate(&bearer(&token)).await.unwrap();
        assert_eq!(user, Some(UserId::new("user_1")));
    }

    #[tokio::test]
    async fn test_cookie_token() {
        let provider = JwtSessionProvider::new(SECRET);
        let (token, _) = provider.issue(&UserId::new("user_2")).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {}={}", DEFAULT_SESSION_COOKIE, token)).unwrap(),
        );

        let user = provider.authenticate(&headers).await.unwrap();
        assert_eq!(user, Some(UserId::new("user_2")));
    }

    #[tokio::test]
    async fn test_missing_token_is_anonymous() {
        let provider = JwtSessionProvider::new(SECRET);
        assert_eq!(provider.authenticate(&HeaderMap::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_foreign_secret_is_anonymous() {
        let other = JwtSessionProvider::new(b"another-secret-another-secret-000");
        let (token, _) = other.issue(&UserId::new("user_3")).unwrap();

        let provider = JwtSessionProvider::new(SECRET);
        assert_eq!(provider.authenticate(&bearer(&token)).await.unwrap(), None);
        assert_eq!(provider.authenticate(&bearer("not-a-jwt")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_token_is_anonymous() {
        let provider = JwtSessionProvider::new(SECRET);
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: "user_4".to_string(),
            iat: now - 7_200,
            exp: now - 3_600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(provider.authenticate(&bearer(&token)).await.unwrap(), None);
    }
}
