//! Account directory backed by configuration.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{User, UserDirectory, UserId};
use crate::error::{GateError, Result};

/// One account as written in the configuration file.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Stable user id carried in the session
    pub id: String,
    /// Sign-in email, matched case-insensitively
    pub email: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Avatar url
    #[serde(default)]
    pub image: Option<String>,
    /// Argon2 PHC string, as printed by `emma-gate hash-password`
    pub password_hash: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("id", &self.id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

struct Account {
    user: User,
    password_hash: String,
}

/// Fixed set of accounts checked with Argon2.
pub struct StaticUserDirectory {
    /// Keyed by lowercased email
    accounts: HashMap<String, Arc<Account>>,
}

impl StaticUserDirectory {
    /// Build a directory, rejecting malformed hashes and duplicate emails.
    pub fn from_accounts(accounts: &[AccountConfig]) -> Result<Self> {
        let mut by_email = HashMap::with_capacity(accounts.len());

        for account in accounts {
            PasswordHash::new(&account.password_hash).map_err(|e| {
                GateError::Config(format!("account '{}' has an invalid password hash: {}", account.id, e))
            })?;

            let key = account.email.trim().to_lowercase();
            let entry = Arc::new(Account {
                user: User {
                    id: UserId::new(account.id.clone()),
                    email: account.email.clone(),
                    name: account.name.clone(),
                    image: account.image.clone(),
                },
                password_hash: account.password_hash.clone(),
            });

            if by_email.insert(key, entry).is_some() {
                return Err(GateError::Config(format!("duplicate account email '{}'", account.email)));
            }
        }

        info!(accounts = by_email.len(), "User directory loaded");
        Ok(Self { accounts: by_email })
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl std::fmt::Debug for StaticUserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticUserDirectory")
            .field("accounts", &self.accounts.len())
            .finish()
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn verify(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(account) = self.accounts.get(&email.trim().to_lowercase()).cloned() else {
            debug!("Unknown account");
            return Ok(None);
        };

        let password = password.to_string();
        // Argon2 is CPU-bound
        let matched = tokio::task::spawn_blocking(move || {
            verify_password(&password, &account.password_hash).map(|ok| ok.then(|| account.user.clone()))
        })
        .await
        .map_err(|e| GateError::AuthLookup(format!("password check aborted: {}", e)))??;

        Ok(matched)
    }
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| GateError::Config(format!("password hashing failed: {}", e)))
}

/// Whether `password` matches the PHC string `hash`.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| GateError::Config(format!("invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
