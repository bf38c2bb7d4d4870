//! Email and password sign-in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::Validate;

use super::UserId;
use crate::error::{GateError, Result};

/// Sign-in form input.
#[derive(Clone, Deserialize, Validate)]
pub struct Credentials {
    /// Account email
    #[validate(email)]
    pub email: String,
    /// Plaintext password, at least 6 characters
    #[validate(length(min = 6))]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A signed-in user as exposed to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Account storage that can check a password.
///
/// Password hashing lives behind this trait together with the user records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Return the user if `password` is correct for `email`.
    async fn verify(&self, email: &str, password: &str) -> Result<Option<User>>;
}

/// Check credentials against the directory.
///
/// Every failure (malformed input, unknown account, wrong password, directory
/// fault) becomes the same `InvalidCredentials` error.
pub async fn authorize(directory: &dyn UserDirectory, credentials: &Credentials) -> Result<User> {
    if let Err(e) = credentials.validate() {
        warn!(fields = ?e.field_errors().keys().collect::<Vec<_>>(), "Malformed sign-in attempt");
        return Err(GateError::InvalidCredentials);
    }

    match directory.verify(&credentials.email, &credentials.password).await {
        Ok(Some(user)) => {
            info!(user_id = %user.id, "User signed in");
            Ok(user)
        }
        Ok(None) => {
            warn!("Sign-in rejected");
            Err(GateError::InvalidCredentials)
        }
        Err(e) => {
            error!(error = %e, "User directory failed during sign-in");
            Err(GateError::InvalidCredentials)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneUser;

    #[async_trait]
    impl UserDirectory for OneUser {
        async fn verify(&self, email: &str, password: &str) -> Result<Option<User>> {
            if email == "ruth@example.com" && password == "correct horse" {
                Ok(Some(User {
                    id: UserId::new("u1"),
                    email: email.to_string(),
                    name: Some("Ruth".to_string()),
                    image: None,
                }))
            } else {
                Ok(None)
            }
        }
    }

    struct Offline;

    #[async_trait]
    impl UserDirectory for Offline {
        async fn verify(&self, _: &str, _: &str) -> Result<Option<User>> {
            Err(GateError::Config("database unreachable".to_string()))
        }
    }

    fn creds(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let user = authorize(&OneUser, &creds("ruth@example.com", "correct horse"))
            .await
            .unwrap();
        assert_eq!(user.id, UserId::new("u1"));
    }

    #[tokio::test]
    async fn test_failures_are_indistinguishable() {
        let cases = [
            creds("not-an-email", "correct horse"),
            creds("ruth@example.com", "short"),
            creds("ruth@example.com", "wrong password"),
            creds("nobody@example.com", "correct horse"),
        ];

        for case in &cases {
            let err = authorize(&OneUser, case).await.unwrap_err();
            assert!(matches!(err, GateError::InvalidCredentials));
            assert_eq!(err.to_string(), "Invalid credentials");
        }
    }

    #[tokio::test]
    async fn test_directory_fault_is_generic() {
        let err = authorize(&Offline, &creds("ruth@example.com", "correct horse"))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::InvalidCredentials));
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", creds("ruth@example.com", "correct horse"));
        assert!(!rendered.contains("correct horse"));
    }
}
