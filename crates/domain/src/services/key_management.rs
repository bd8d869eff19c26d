//! API key management trait and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::lock;
use crate::error::DomainError;

/// An API key issued to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub key_id: String,
    pub user_id: String,
    pub secret: String,
}

/// Key management operations.
#[async_trait]
pub trait KeyManagement: Send + Sync {
    /// Issues a new key for the user.
    async fn create_key(&self, user_id: &str) -> Result<ApiKey, DomainError>;

    /// Revokes a key. Revoking an unknown key is not an error.
    async fn revoke_key(&self, key_id: &str) -> Result<(), DomainError>;

    /// Finds the user's active key id.
    async fn find_key(&self, user_id: &str) -> Result<Option<String>, DomainError>;

    /// Looks up the active key a bearer secret belongs to.
    async fn verify_secret(&self, secret: &str) -> Result<Option<ApiKey>, DomainError>;
}

#[derive(Debug, Default)]
struct InMemoryKeyState {
    keys: BTreeMap<String, ApiKey>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_revoke: bool,
}

/// In-memory key management for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyManagement {
    state: Arc<Mutex<InMemoryKeyState>>,
}

impl InMemoryKeyManagement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an existing key for a user.
    pub fn with_key(self, user_id: &str, key_id: &str) -> Self {
        lock(&self.state).keys.insert(
            key_id.to_string(),
            ApiKey {
                key_id: key_id.to_string(),
                user_id: user_id.to_string(),
                secret: format!("sk-{key_id}"),
            },
        );
        self
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        lock(&self.state).fail_on_create = fail;
    }

    pub fn set_fail_on_revoke(&self, fail: bool) {
        lock(&self.state).fail_on_revoke = fail;
    }

    pub fn key_count(&self) -> usize {
        lock(&self.state).keys.len()
    }

    pub fn is_active(&self, key_id: &str) -> bool {
        lock(&self.state).keys.contains_key(key_id)
    }
}

#[async_trait]
impl KeyManagement for InMemoryKeyManagement {
    async fn create_key(&self, user_id: &str) -> Result<ApiKey, DomainError> {
        let mut state = lock(&self.state);

        if state.fail_on_create {
            return Err(DomainError::upstream("key management", "quota exceeded"));
        }

        state.next_id += 1;
        let key_id = format!("KEY-{:04}", state.next_id);
        let key = ApiKey {
            key_id: key_id.clone(),
            user_id: user_id.to_string(),
            secret: format!("sk-{}", uuid::Uuid::new_v4().simple()),
        };
        state.keys.insert(key_id, key.clone());

        Ok(key)
    }

    async fn revoke_key(&self, key_id: &str) -> Result<(), DomainError> {
        let mut state = lock(&self.state);
        if state.fail_on_revoke {
            return Err(DomainError::upstream("key management", "revoke rejected"));
        }
        state.keys.remove(key_id);
        Ok(())
    }

    async fn find_key(&self, user_id: &str) -> Result<Option<String>, DomainError> {
        Ok(lock(&self.state)
            .keys
            .values()
            .find(|key| key.user_id == user_id)
            .map(|key| key.key_id.clone()))
    }

    async fn verify_secret(&self, secret: &str) -> Result<Option<ApiKey>, DomainError> {
        Ok(lock(&self.state)
            .keys
            .values()
            .find(|key| key.secret == secret)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_find_revoke() {
        let kms = InMemoryKeyManagement::new();
        let key = kms.create_key("u1").await.unwrap();
        assert!(key.key_id.starts_with("KEY-"));
        assert_eq!(kms.find_key("u1").await.unwrap(), Some(key.key_id.clone()));
        assert_eq!(kms.find_key("u2").await.unwrap(), None);

        kms.revoke_key(&key.key_id).await.unwrap();
        assert!(!kms.is_active(&key.key_id));
    }

    #[tokio::test]
    async fn test_verify_secret_only_matches_active_keys() {
        let kms = InMemoryKeyManagement::new();
        let key = kms.create_key("u1").await.unwrap();

        assert_eq!(kms.verify_secret(&key.secret).await.unwrap(), Some(key.clone()));
        assert_eq!(kms.verify_secret("sk-guess").await.unwrap(), None);

        kms.revoke_key(&key.key_id).await.unwrap();
        assert_eq!(kms.verify_secret(&key.secret).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_seeded_key() {
        let kms = InMemoryKeyManagement::new().with_key("u1", "k1");
        assert_eq!(kms.find_key("u1").await.unwrap(), Some("k1".to_string()));
    }
}
