use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Item, ItemKey, ItemQuery, KeySchema, Result, StoreError};

/// A precondition on the current state of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The item must already exist.
    Exists,
    /// The item must not exist yet.
    NotExists,
    /// The integer attribute must be at least `value`; a missing attribute counts as 0.
    AtLeast { attribute: String, value: i64 },
}

impl Condition {
    /// Checks the condition against the current item.
    pub fn check(&self, key: &ItemKey, existing: Option<&Item>) -> Result<()> {
        let failed = |reason: String| StoreError::ConditionFailed {
            key: key.to_string(),
            reason,
        };
        match self {
            Condition::Exists if existing.is_none() => Err(failed("item does not exist".into())),
            Condition::NotExists if existing.is_some() => {
                Err(failed("item already exists".into()))
            }
            Condition::AtLeast { attribute, value } => {
                let current = integer_attribute(existing, attribute)?;
                if current < *value {
                    Err(failed(format!("{attribute} is {current}, need {value}")))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

/// A partial modification of one item.
///
/// Updating a missing item creates it (with its key attributes) unless the
/// update carries [`Condition::Exists`].
#[derive(Debug, Clone, Default)]
pub struct Update {
    /// Attributes to overwrite.
    pub set: Item,
    /// Attributes to delete.
    pub remove: Vec<String>,
    /// Integer attributes to increment (negative to decrement).
    pub add: Vec<(String, i64)>,
    /// Precondition evaluated against the item before the update.
    pub condition: Option<Condition>,
}

impl Update {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites an attribute.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(name.into(), value.into());
        self
    }

    /// Deletes an attribute.
    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.remove.push(name.into());
        self
    }

    /// Adds `delta` to an integer attribute.
    pub fn add(mut self, name: impl Into<String>, delta: i64) -> Self {
        self.add.push((name.into(), delta));
        self
    }

    /// Attaches a precondition.
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Applies the update to the current state of the item identified by `key`.
    pub fn apply(&self, schema: &KeySchema, key: &ItemKey, existing: Option<Item>) -> Result<Item> {
        if let Some(condition) = &self.condition {
            condition.check(key, existing.as_ref())?;
        }

        let is_key_attribute =
            |name: &str| name == schema.partition_key() || Some(name) == schema.sort_key();

        let mut item = existing.unwrap_or_default();
        for (name, value) in &self.set {
            if is_key_attribute(name) {
                return Err(StoreError::InvalidKey(format!(
                    "key attribute '{name}' cannot be updated"
                )));
            }
            item.insert(name.clone(), value.clone());
        }
        for name in &self.remove {
            if !is_key_attribute(name) {
                item.remove(name);
            }
        }
        for (name, delta) in &self.add {
            let current = integer_attribute(Some(&item), name)?;
            item.insert(name.clone(), Value::from(current + delta));
        }
        schema.stamp(key, &mut item);
        Ok(item)
    }
}

fn integer_attribute(item: Option<&Item>, name: &str) -> Result<i64> {
    match item.and_then(|i| i.get(name)) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value
            .as_i64()
            .ok_or_else(|| StoreError::NotNumeric(name.to_string())),
    }
}

/// Core trait for the persistence collaborator.
///
/// All implementations must be thread-safe (Send + Sync); callers share one
/// handle across concurrent invocations.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Returns the key schema of the table.
    fn key_schema(&self) -> &KeySchema;

    /// Fetches one item.
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>>;

    /// Writes a whole item, replacing any existing item with the same key.
    async fn put(&self, item: Item, condition: Option<Condition>) -> Result<()>;

    /// Applies a partial update and returns the item as written.
    async fn update(&self, key: &ItemKey, update: Update) -> Result<Item>;

    /// Deletes one item, returning it if it existed.
    async fn delete(&self, key: &ItemKey) -> Result<Option<Item>>;

    /// Reads the items of one partition in sort order.
    async fn query(&self, query: ItemQuery) -> Result<Vec<Item>>;

    /// Reads items across all partitions in key order.
    async fn scan(&self, limit: Option<usize>) -> Result<Vec<Item>>;

    /// Fetches several items; missing keys are skipped.
    async fn batch_get(&self, keys: &[ItemKey]) -> Result<Vec<Item>>;
}

/// Typed convenience methods on top of [`ItemStore`].
#[async_trait]
pub trait ItemStoreExt: ItemStore {
    /// Fetches one item and deserializes it.
    async fn get_as<T: DeserializeOwned + Send>(&self, key: &ItemKey) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(item) => Ok(Some(serde_json::from_value(Value::Object(item))?)),
            None => Ok(None),
        }
    }

    /// Serializes a value into an item and writes it.
    async fn put_as<T: Serialize + Sync>(
        &self,
        value: &T,
        condition: Option<Condition>,
    ) -> Result<()> {
        let item = to_item(value)?;
        self.put(item, condition).await
    }
}

impl<T: ItemStore + ?Sized> ItemStoreExt for T {}

/// Serializes a value that must become a JSON object.
pub fn to_item<T: Serialize>(value: &T) -> Result<Item> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::InvalidKey(
            "item must serialize to a JSON object".to_string(),
        )),
    }
}

pub(crate) fn record_operation(backend: &'static str, op: &'static str) {
    metrics::counter!("item_store_operations_total", "backend" => backend, "op" => op)
        .increment(1);
}
