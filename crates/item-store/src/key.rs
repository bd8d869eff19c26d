//! Key schema and item keys.

use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// A stored item: a JSON object whose key attributes are strings.
pub type Item = Map<String, Value>;

/// Names the attributes that form an item's primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    partition_key: String,
    sort_key: Option<String>,
}

impl KeySchema {
    /// Creates a schema keyed by a single partition attribute.
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    /// Adds a sort attribute.
    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn sort_key(&self) -> Option<&str> {
        self.sort_key.as_deref()
    }

    /// Reads the key attributes of `item`.
    pub fn key_of(&self, item: &Item) -> Result<ItemKey> {
        let partition = key_attribute(item, &self.partition_key)?;
        let sort = match &self.sort_key {
            Some(name) => Some(key_attribute(item, name)?),
            None => None,
        };
        Ok(ItemKey { partition, sort })
    }

    /// Checks that `key` has a sort value exactly when the schema has a sort key.
    pub fn check(&self, key: &ItemKey) -> Result<()> {
        match (&self.sort_key, &key.sort) {
            (Some(name), None) => Err(StoreError::InvalidKey(format!(
                "sort key '{name}' is required"
            ))),
            (None, Some(_)) => Err(StoreError::InvalidKey(
                "table has no sort key".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Writes the key attributes of `key` into `item`.
    pub fn stamp(&self, key: &ItemKey, item: &mut Item) {
        item.insert(
            self.partition_key.clone(),
            Value::String(key.partition.clone()),
        );
        if let (Some(name), Some(sort)) = (&self.sort_key, &key.sort) {
            item.insert(name.clone(), Value::String(sort.clone()));
        }
    }
}

fn key_attribute(item: &Item, name: &str) -> Result<String> {
    match item.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(StoreError::InvalidKey(format!(
            "key attribute '{name}' must be a non-empty string or number"
        ))),
        None => Err(StoreError::InvalidKey(format!(
            "key attribute '{name}' is missing"
        ))),
    }
}

/// The primary key of one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub partition: String,
    pub sort: Option<String>,
}

impl ItemKey {
    /// Creates a partition-only key.
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
        }
    }

    /// Creates a composite key.
    pub fn with_sort(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.sort {
            Some(sort) => write!(f, "{}/{}", self.partition, sort),
            None => write!(f, "{}", self.partition),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_key_of_partition_only() {
        let schema = KeySchema::new("id");
        let key = schema.key_of(&item(json!({"id": "a", "x": 1}))).unwrap();
        assert_eq!(key, ItemKey::new("a"));
    }

    #[test]
    fn test_key_of_composite_accepts_numbers() {
        let schema = KeySchema::new("pk").with_sort_key("sk");
        let key = schema.key_of(&item(json!({"pk": "user#1", "sk": 7}))).unwrap();
        assert_eq!(key, ItemKey::with_sort("user#1", "7"));
    }

    #[test]
    fn test_missing_or_bad_key_attribute() {
        let schema = KeySchema::new("pk").with_sort_key("sk");
        assert!(matches!(
            schema.key_of(&item(json!({"pk": "a"}))),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            schema.key_of(&item(json!({"pk": true, "sk": "b"}))),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_check_sort_presence() {
        let composite = KeySchema::new("pk").with_sort_key("sk");
        assert!(composite.check(&ItemKey::new("a")).is_err());
        assert!(KeySchema::new("pk").check(&ItemKey::with_sort("a", "b")).is_err());
        assert!(composite.check(&ItemKey::with_sort("a", "b")).is_ok());
    }

    #[test]
    fn test_stamp_writes_key_attributes() {
        let schema = KeySchema::new("pk").with_sort_key("sk");
        let mut it = Item::new();
        schema.stamp(&ItemKey::with_sort("a", "b"), &mut it);
        assert_eq!(Value::Object(it), json!({"pk": "a", "sk": "b"}));
    }

    #[test]
    fn test_display() {
        assert_eq!(ItemKey::with_sort("a", "b").to_string(), "a/b");
        assert_eq!(ItemKey::new("a").to_string(), "a");
    }
}
