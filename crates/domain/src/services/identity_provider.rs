//! Identity provider trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::lock;
use crate::error::DomainError;

/// A user created in the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedUser {
    pub user_id: String,
    pub email: String,
}

/// User directory operations.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates a user for the email address.
    async fn create_user(&self, email: &str) -> Result<ProvisionedUser, DomainError>;

    /// Deletes a user. Deleting an unknown user is not an error.
    async fn delete_user(&self, user_id: &str) -> Result<(), DomainError>;
}

#[derive(Debug, Default)]
struct InMemoryIdentityState {
    users: HashMap<String, String>,
    fail_on_create: bool,
    fail_on_delete: bool,
}

/// In-memory identity provider for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityProvider {
    state: Arc<Mutex<InMemoryIdentityState>>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the provider to fail on create calls.
    pub fn set_fail_on_create(&self, fail: bool) {
        lock(&self.state).fail_on_create = fail;
    }

    /// Configures the provider to fail on delete calls.
    pub fn set_fail_on_delete(&self, fail: bool) {
        lock(&self.state).fail_on_delete = fail;
    }

    pub fn user_count(&self) -> usize {
        lock(&self.state).users.len()
    }

    pub fn has_user(&self, user_id: &str) -> bool {
        lock(&self.state).users.contains_key(user_id)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn create_user(&self, email: &str) -> Result<ProvisionedUser, DomainError> {
        let mut state = lock(&self.state);

        if state.fail_on_create {
            return Err(DomainError::upstream("identity provider", "user pool unavailable"));
        }
        if state.users.values().any(|existing| existing.eq_ignore_ascii_case(email)) {
            return Err(DomainError::AccountExists(email.to_string()));
        }

        let user_id = uuid::Uuid::new_v4().to_string();
        state.users.insert(user_id.clone(), email.to_string());

        Ok(ProvisionedUser {
            user_id,
            email: email.to_string(),
        })
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), DomainError> {
        let mut state = lock(&self.state);
        if state.fail_on_delete {
            return Err(DomainError::upstream("identity provider", "delete rejected"));
        }
        state.users.remove(user_id);
        Ok(())
    }
}
