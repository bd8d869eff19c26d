//! Account provisioning across the identity provider, key management and
//! the item store.
//!
//! No transaction spans those systems, so provisioning runs as a saga:
//!
//! | step            | execute                    | compensate             |
//! |-----------------|----------------------------|------------------------|
//! | `create_user`   | create identity user       | delete the user        |
//! | `create_api_key`| issue an API key           | revoke the key         |
//! | `store_account` | put the account record     | delete the record      |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AppError, FieldError, UseCase, Validate, Violations};
use item_store::{Condition, ItemKey, ItemStore, to_item};
use saga::{SagaOrchestrator, SagaState, SagaStep};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::keys::account_key;
use crate::services::{ApiKey, IdentityProvider, KeyManagement, ProvisionedUser};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionAccountInput {
    pub email: String,
}

impl Validate for ProvisionAccountInput {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let email = self.email.trim();
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));

        let mut v = Violations::new();
        v.non_blank("email", email)
            .max_chars("email", email, 254)
            .check(email.is_empty() || well_formed, "email", "must be an email address");
        v.finish()
    }
}

/// Response of a successful provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedAccount {
    pub user_id: String,
    pub api_key_id: String,
    /// The key's bearer secret; only ever returned here.
    pub api_key: String,
    pub email: String,
}

/// The account record stored in the user's partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub user_id: String,
    pub email: String,
    pub api_key_id: String,
    pub created_at: DateTime<Utc>,
}

/// Output of one provisioning step.
#[derive(Debug, Clone)]
pub enum Provisioned {
    User(ProvisionedUser),
    Key(ApiKey),
    Record(ItemKey),
}

fn provisioned_user(completed: &[Provisioned]) -> Result<&ProvisionedUser, DomainError> {
    completed
        .iter()
        .find_map(|p| match p {
            Provisioned::User(user) => Some(user),
            _ => None,
        })
        .ok_or_else(|| DomainError::upstream("saga", "user step has not run"))
}

fn provisioned_key(completed: &[Provisioned]) -> Result<&ApiKey, DomainError> {
    completed
        .iter()
        .find_map(|p| match p {
            Provisioned::Key(key) => Some(key),
            _ => None,
        })
        .ok_or_else(|| DomainError::upstream("saga", "key step has not run"))
}

struct CreateUser {
    identity: Arc<dyn IdentityProvider>,
    email: String,
}

#[async_trait]
impl SagaStep<Provisioned, DomainError> for CreateUser {
    fn name(&self) -> &str {
        "create_user"
    }

    async fn execute(&self, _: &[Provisioned]) -> Result<Provisioned, DomainError> {
        let user = self.identity.create_user(&self.email).await?;
        Ok(Provisioned::User(user))
    }

    async fn compensate(&self, output: &Provisioned) -> Result<(), DomainError> {
        if let Provisioned::User(user) = output {
            self.identity.delete_user(&user.user_id).await?;
        }
        Ok(())
    }
}

struct CreateApiKey {
    keys: Arc<dyn KeyManagement>,
}

#[async_trait]
impl SagaStep<Provisioned, DomainError> for CreateApiKey {
    fn name(&self) -> &str {
        "create_api_key"
    }

    async fn execute(&self, completed: &[Provisioned]) -> Result<Provisioned, DomainError> {
        let user_id = provisioned_user(completed)?.user_id.clone();
        let key = self.keys.create_key(&user_id).await?;
        Ok(Provisioned::Key(key))
    }

    async fn compensate(&self, output: &Provisioned) -> Result<(), DomainError> {
        if let Provisioned::Key(key) = output {
            self.keys.revoke_key(&key.key_id).await?;
        }
        Ok(())
    }
}

struct StoreAccount {
    store: Arc<dyn ItemStore>,
}

#[async_trait]
impl SagaStep<Provisioned, DomainError> for StoreAccount {
    fn name(&self) -> &str {
        "store_account"
    }

    async fn execute(&self, completed: &[Provisioned]) -> Result<Provisioned, DomainError> {
        let user = provisioned_user(completed)?;
        let key = provisioned_key(completed)?;
        let record = AccountRecord {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            api_key_id: key.key_id.clone(),
            created_at: Utc::now(),
        };

        let item_key = account_key(&record.user_id);
        let mut item = to_item(&record)?;
        self.store.key_schema().stamp(&item_key, &mut item);
        self.store.put(item, Some(Condition::NotExists)).await?;

        Ok(Provisioned::Record(item_key))
    }

    async fn compensate(&self, output: &Provisioned) -> Result<(), DomainError> {
        if let Provisioned::Record(key) = output {
            self.store.delete(key).await?;
        }
        Ok(())
    }
}

/// Creates a user, an API key and an account record, or none of them.
pub struct ProvisionAccount {
    identity: Arc<dyn IdentityProvider>,
    keys: Arc<dyn KeyManagement>,
    store: Arc<dyn ItemStore>,
}

impl ProvisionAccount {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        keys: Arc<dyn KeyManagement>,
        store: Arc<dyn ItemStore>,
    ) -> Self {
        Self {
            identity,
            keys,
            store,
        }
    }

    fn saga(&self, email: &str) -> Result<SagaOrchestrator<Provisioned, DomainError>, DomainError> {
        Ok(SagaOrchestrator::builder("provision_account")
            .step(CreateUser {
                identity: Arc::clone(&self.identity),
                email: email.to_string(),
            })
            .step(CreateApiKey {
                keys: Arc::clone(&self.keys),
            })
            .step(StoreAccount {
                store: Arc::clone(&self.store),
            })
            .build()?)
    }
}

#[async_trait]
impl UseCase<ProvisionAccountInput> for ProvisionAccount {
    type Output = ProvisionedAccount;

    #[tracing::instrument(skip(self, input))]
    async fn execute(&self, input: ProvisionAccountInput) -> Result<ProvisionedAccount, AppError> {
        let email = input.email.trim().to_lowercase();
        let (report, result) = self.saga(&email)?.execute_with_report().await;

        if report.state == SagaState::Compensated && !report.compensation_failures.is_empty() {
            tracing::error!(
                failures = ?report.compensation_failures,
                "account provisioning rolled back partially"
            );
        }

        let completed = result?;
        let user = provisioned_user(&completed)?;
        let key = provisioned_key(&completed)?;

        metrics::counter!("accounts_provisioned_total").increment(1);
        tracing::info!(user_id = %user.user_id, "account provisioned");
        Ok(ProvisionedAccount {
            user_id: user.user_id.clone(),
            api_key_id: key.key_id.clone(),
            api_key: key.secret.clone(),
            email: user.email.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use common::parse_input;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_email_validation() {
        for email in ["", "  ", "no-at-sign", "@example.com", "a@localhost"] {
            assert!(
                parse_input::<ProvisionAccountInput>(json!({ "email": email })).is_err(),
                "{email:?}"
            );
        }
        assert!(parse_input::<ProvisionAccountInput>(json!({"email": "a@example.com"})).is_ok());
    }

    #[test]
    fn test_blank_email_reports_one_violation() {
        let err = parse_input::<ProvisionAccountInput>(json!({"email": " "})).unwrap_err();
        assert_eq!(err.field_errors().len(), 1);
    }
}
