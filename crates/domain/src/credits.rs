//! Credit balances per API key.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{AppError, FieldError, UseCase, Validate, Violations};
use item_store::{Condition, ItemStore, StoreError, Update};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::keys::credits_key;
use crate::services::KeyManagement;

const CREDITS: &str = "credits";

/// Balance operations keyed by API key id.
///
/// When `key_id` is `None` the ledger resolves the principal's key first.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Adds `amount` and returns the new balance.
    async fn increment(
        &self,
        principal_id: &str,
        key_id: Option<&str>,
        amount: i64,
    ) -> Result<i64, DomainError>;

    /// Removes `amount` if the balance covers it and returns the new balance.
    async fn decrement(
        &self,
        principal_id: &str,
        key_id: Option<&str>,
        amount: i64,
    ) -> Result<i64, DomainError>;

    /// Current balance of a key; zero when it never held credits.
    async fn balance(&self, key_id: &str) -> Result<i64, DomainError>;
}

/// Ledger stored as one item per key with a conditional decrement.
pub struct StoreCreditLedger {
    store: Arc<dyn ItemStore>,
    keys: Arc<dyn KeyManagement>,
}

impl StoreCreditLedger {
    pub fn new(store: Arc<dyn ItemStore>, keys: Arc<dyn KeyManagement>) -> Self {
        Self { store, keys }
    }

    async fn resolve_key(&self, principal_id: &str, key_id: Option<&str>) -> Result<String, DomainError> {
        if let Some(key_id) = key_id {
            return Ok(key_id.to_string());
        }
        tracing::debug!(principal_id, "resolving api key for principal");
        self.keys
            .find_key(principal_id)
            .await?
            .ok_or_else(|| DomainError::KeyNotFound(principal_id.to_string()))
    }

    async fn apply(&self, key_id: &str, update: Update) -> Result<i64, DomainError> {
        let update = update
            .set("keyId", key_id)
            .set("updatedAt", Utc::now().to_rfc3339());
        let item = self
            .store
            .update(&credits_key(key_id), update)
            .await
            .map_err(|err| match err {
                StoreError::ConditionFailed { .. } => DomainError::InsufficientCredits {
                    key_id: key_id.to_string(),
                },
                other => DomainError::Store(other),
            })?;
        Ok(item.get(CREDITS).and_then(|v| v.as_i64()).unwrap_or(0))
    }
}

#[async_trait]
impl CreditLedger for StoreCreditLedger {
    #[tracing::instrument(skip(self))]
    async fn increment(
        &self,
        principal_id: &str,
        key_id: Option<&str>,
        amount: i64,
    ) -> Result<i64, DomainError> {
        let key_id = self.resolve_key(principal_id, key_id).await?;
        self.apply(&key_id, Update::new().add(CREDITS, amount)).await
    }

    #[tracing::instrument(skip(self))]
    async fn decrement(
        &self,
        principal_id: &str,
        key_id: Option<&str>,
        amount: i64,
    ) -> Result<i64, DomainError> {
        let key_id = self.resolve_key(principal_id, key_id).await?;
        let update = Update::new()
            .add(CREDITS, -amount)
            .when(Condition::AtLeast {
                attribute: CREDITS.to_string(),
                value: amount,
            });
        self.apply(&key_id, update).await
    }

    async fn balance(&self, key_id: &str) -> Result<i64, DomainError> {
        let item = self.store.get(&credits_key(key_id)).await?;
        Ok(item
            .as_ref()
            .and_then(|i| i.get(CREDITS))
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }
}

/// Input of [`AddCredits`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCreditsInput {
    pub user_id: String,
    #[serde(default)]
    pub key_id: Option<String>,
    pub amount: i64,
}

impl AddCreditsInput {
    pub const MAX_AMOUNT: i64 = 100_000;
}

impl Validate for AddCreditsInput {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut v = Violations::new();
        v.non_blank("userId", &self.user_id).check(
            (1..=Self::MAX_AMOUNT).contains(&self.amount),
            "amount",
            "must be between 1 and 100000",
        );
        v.finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditBalance {
    pub remaining: i64,
}

/// Adds credits to the caller's API key.
pub struct AddCredits {
    ledger: Arc<dyn CreditLedger>,
}

impl AddCredits {
    pub fn new(ledger: Arc<dyn CreditLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl UseCase<AddCreditsInput> for AddCredits {
    type Output = CreditBalance;

    #[tracing::instrument(skip(self, input), fields(principal_id = %input.user_id, amount = input.amount))]
    async fn execute(&self, input: AddCreditsInput) -> Result<CreditBalance, AppError> {
        let remaining = self
            .ledger
            .increment(&input.user_id, input.key_id.as_deref(), input.amount)
            .await?;

        metrics::counter!("credits_added_total").increment(input.amount as u64);
        tracing::info!(remaining, "credits added");
        Ok(CreditBalance { remaining })
    }
}

#[cfg(test)]
mod tests {
    use common::parse_input;
    use item_store::InMemoryItemStore;
    use serde_json::json;

    use super::*;
    use crate::keys::table_schema;
    use crate::services::InMemoryKeyManagement;

    fn ledger() -> StoreCreditLedger {
        let store = Arc::new(InMemoryItemStore::new(table_schema()));
        let keys = Arc::new(InMemoryKeyManagement::new().with_key("u1", "k1"));
        StoreCreditLedger::new(store, keys)
    }

    #[tokio::test]
    async fn test_increment_resolves_key_when_absent() {
        let ledger = ledger();
        assert_eq!(ledger.increment("u1", None, 5).await.unwrap(), 5);
        assert_eq!(ledger.increment("u1", Some("k1"), 2).await.unwrap(), 7);
        assert_eq!(ledger.balance("k1").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_unknown_principal_without_key() {
        let result = ledger().increment("nobody", None, 1).await;
        assert!(matches!(result, Err(DomainError::KeyNotFound(_))));
    }

    #[tokio::test]
    async fn test_decrement_never_goes_negative() {
        let ledger = ledger();
        ledger.increment("u1", None, 1).await.unwrap();

        assert_eq!(ledger.decrement("u1", None, 1).await.unwrap(), 0);
        let result = ledger.decrement("u1", None, 1).await;
        assert!(matches!(result, Err(DomainError::InsufficientCredits { .. })));
        assert_eq!(ledger.balance("k1").await.unwrap(), 0);
    }

    #[test]
    fn test_amount_bounds() {
        for amount in [0, -1, 100_001] {
            let err = parse_input::<AddCreditsInput>(json!({"userId": "u1", "amount": amount}))
                .unwrap_err();
            assert_eq!(err.field_errors()[0].field, "amount");
        }
        let ok = parse_input::<AddCreditsInput>(json!({"userId": "u1", "amount": 100_000}));
        assert!(ok.is_ok());
    }
}
