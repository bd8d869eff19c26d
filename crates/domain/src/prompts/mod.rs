//! Prompt submission, lookup and asynchronous processing.

pub mod get;
pub mod process;
pub mod record;
pub mod submit;

use std::sync::Arc;

use chrono::Utc;
use item_store::{Condition, ItemQuery, ItemStore, ItemStoreExt, StoreError, to_item};
use serde_json::{Value, json};

pub use get::{GetPrompt, GetPromptInput, ListPrompts, ListPromptsInput, PromptList};
pub use process::{ProcessPrompt, ProcessPromptInput};
pub use record::{PromptRecord, PromptStatus};
pub use submit::{PromptAccepted, SubmitPrompt, SubmitPromptInput};

use crate::error::DomainError;
use crate::keys::{PROMPT_PREFIX, charge_key, prompt_key, user_partition};

/// Reads and writes prompt records in the item store.
#[derive(Clone)]
pub struct PromptRepository {
    store: Arc<dyn ItemStore>,
}

impl PromptRepository {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, user_id: &str, prompt_id: &str) -> Result<Option<PromptRecord>, DomainError> {
        Ok(self.store.get_as(&prompt_key(user_id, prompt_id)).await?)
    }

    /// Stores a new record; fails if the id is already taken.
    pub async fn insert(&self, record: &PromptRecord) -> Result<(), DomainError> {
        self.write(record, Some(Condition::NotExists)).await
    }

    /// Overwrites an existing record.
    pub async fn save(&self, record: &PromptRecord) -> Result<(), DomainError> {
        self.write(record, Some(Condition::Exists)).await
    }

    pub async fn delete(&self, user_id: &str, prompt_id: &str) -> Result<(), DomainError> {
        self.store.delete(&prompt_key(user_id, prompt_id)).await?;
        Ok(())
    }

    /// Records that the prompt is about to be charged.
    ///
    /// Returns `false` when a marker already exists, i.e. another delivery of
    /// the same prompt got there first.
    pub async fn claim_charge(&self, user_id: &str, prompt_id: &str) -> Result<bool, DomainError> {
        let key = charge_key(user_id, prompt_id);
        let mut item = to_item(&json!({
            "promptId": prompt_id,
            "claimedAt": Utc::now().to_rfc3339(),
        }))?;
        self.store.key_schema().stamp(&key, &mut item);
        match self.store.put(item, Some(Condition::NotExists)).await {
            Ok(()) => Ok(true),
            Err(StoreError::ConditionFailed { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Drops the charge marker so a later delivery can charge again.
    pub async fn release_charge(&self, user_id: &str, prompt_id: &str) -> Result<(), DomainError> {
        self.store.delete(&charge_key(user_id, prompt_id)).await?;
        Ok(())
    }

    /// Newest first; prompt ids are time-ordered (UUIDv7).
    pub async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<PromptRecord>, DomainError> {
        let query = ItemQuery::partition(user_partition(user_id))
            .begins_with(PROMPT_PREFIX)
            .descending()
            .limit(limit);
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(|item| serde_json::from_value(Value::Object(item)).map_err(DomainError::from))
            .collect()
    }

    async fn write(&self, record: &PromptRecord, condition: Option<Condition>) -> Result<(), DomainError> {
        let key = prompt_key(&record.user_id, &record.id);
        let mut item = to_item(record)?;
        self.store.key_schema().stamp(&key, &mut item);
        self.store.put(item, condition).await?;
        Ok(())
    }
}
