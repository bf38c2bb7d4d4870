//! Authentication collaborators.
//!
//! The gate only needs to know whether a request carries a valid session and,
//! if so, whose. That question is answered by an [`AuthProvider`]; how sessions
//! are minted and stored is the provider's business.

mod credentials;
mod directory;
mod session;

pub use credentials::{authorize, Credentials, User, UserDirectory};
pub use directory::{hash_password, verify_password, AccountConfig, StaticUserDirectory};
pub use session::{JwtSessionProvider, SessionClaims, DEFAULT_SESSION_COOKIE, DEFAULT_SESSION_MAX_AGE};

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stable identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a user id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Looks up the session carried by a request.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Return the user behind the request's session, or `None` if there is no
    /// valid session. An `Err` means the lookup itself failed.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<UserId>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_display() {
        let id = UserId::new("clx0user");
        assert_eq!(id.to_string(), "clx0user");
        assert_eq!(id.as_str(), "clx0user");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"clx0user\"");
    }
}
