//! Credential lookup boundary.
//!
//! The vault that stores account secrets lives in another service; the
//! automation core only needs a way to ask for the plaintext credentials of
//! one user at login time. The in-memory store exists for composition in
//! tests and small deployments.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Plaintext credentials for one external account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub email: String,
    pub password: String,
}

impl AccountCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credentials stored for user '{user_id}'")]
    Missing { user_id: String },
}

/// Source of account credentials, typically backed by an encrypted vault.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    async fn credentials_for(&self, user_id: &str) -> Result<AccountCredentials, CredentialError>;
}

/// Map-backed store.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    entries: Mutex<HashMap<String, AccountCredentials>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: impl Into<String>, credentials: AccountCredentials) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(user_id.into(), credentials);
        }
    }

    pub fn remove(&self, user_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(user_id);
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn credentials_for(&self, user_id: &str) -> Result<AccountCredentials, CredentialError> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(user_id).cloned())
            .ok_or_else(|| CredentialError::Missing {
                user_id: user_id.to_string(),
            })
    }
}
