use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::record_operation;
use crate::{Condition, Item, ItemKey, ItemQuery, ItemStore, KeySchema, Result, Update};

/// In-memory item store for tests and local development.
///
/// Provides the same interface and ordering guarantees as the PostgreSQL
/// implementation. Clones share the same underlying table.
#[derive(Clone)]
pub struct InMemoryItemStore {
    schema: KeySchema,
    items: Arc<RwLock<BTreeMap<ItemKey, Item>>>,
}

impl InMemoryItemStore {
    /// Creates a new empty table with the given key schema.
    pub fn new(schema: KeySchema) -> Self {
        Self {
            schema,
            items: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Returns the total number of items stored.
    pub async fn item_count(&self) -> usize {
        self.items.read().await.len()
    }

    /// Removes all items.
    pub async fn clear(&self) {
        self.items.write().await.clear();
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    fn key_schema(&self) -> &KeySchema {
        &self.schema
    }

    async fn get(&self, key: &ItemKey) -> Result<Option<Item>> {
        self.schema.check(key)?;
        record_operation("memory", "get");
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn put(&self, item: Item, condition: Option<Condition>) -> Result<()> {
        let key = self.schema.key_of(&item)?;
        record_operation("memory", "put");

        let mut items = self.items.write().await;
        if let Some(condition) = condition {
            condition.check(&key, items.get(&key))?;
        }
        items.insert(key, item);
        Ok(())
    }

    async fn update(&self, key: &ItemKey, update: Update) -> Result<Item> {
        self.schema.check(key)?;
        record_operation("memory", "update");

        let mut items = self.items.write().await;
        let updated = update.apply(&self.schema, key, items.get(key).cloned())?;
        items.insert(key.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, key: &ItemKey) -> Result<Option<Item>> {
        self.schema.check(key)?;
        record_operation("memory", "delete");
        Ok(self.items.write().await.remove(key))
    }

    async fn query(&self, query: ItemQuery) -> Result<Vec<Item>> {
        record_operation("memory", "query");
        let items = self.items.read().await;

        let matching = items.iter().filter(|(key, _)| {
            if key.partition != query.partition {
                return false;
            }
            match (&query.sort, &key.sort) {
                (Some(condition), Some(sort)) => condition.matches(sort),
                (Some(_), None) => false,
                (None, _) => true,
            }
        });

        let mut found: Vec<Item> = matching.map(|(_, item)| item.clone()).collect();
        if query.descending {
            found.reverse();
        }
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn scan(&self, limit: Option<usize>) -> Result<Vec<Item>> {
        record_operation("memory", "scan");
        let items = self.items.read().await;
        let all = items.values().cloned();
        Ok(match limit {
            Some(limit) => all.take(limit).collect(),
            None => all.collect(),
        })
    }

    async fn batch_get(&self, keys: &[ItemKey]) -> Result<Vec<Item>> {
        for key in keys {
            self.schema.check(key)?;
        }
        record_operation("memory", "batch_get");
        let items = self.items.read().await;
        Ok(keys.iter().filter_map(|k| items.get(k).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::{Value, json};

    use super::*;
    use crate::{ItemStoreExt, StoreError};

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    fn composite() -> InMemoryItemStore {
        InMemoryItemStore::new(KeySchema::new("pk").with_sort_key("sk"))
    }

    #[tokio::test]
    async fn put_and_get() {
        let store = composite();
        store
            .put(item(json!({"pk": "u1", "sk": "profile", "name": "Ada"})), None)
            .await
            .unwrap();

        let found = store
            .get(&ItemKey::with_sort("u1", "profile"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["name"], "Ada");
        assert_eq!(store.item_count().await, 1);
    }

    #[tokio::test]
    async fn put_if_not_exists_rejects_duplicate() {
        let store = composite();
        let it = item(json!({"pk": "u1", "sk": "profile"}));
        store
            .put(it.clone(), Some(Condition::NotExists))
            .await
            .unwrap();

        let result = store.put(it, Some(Condition::NotExists)).await;
        assert!(matches!(result, Err(StoreError::ConditionFailed { .. })));
    }

    #[tokio::test]
    async fn get_with_wrong_key_shape_fails() {
        let store = composite();
        let result = store.get(&ItemKey::new("u1")).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn update_increments_atomically_under_condition() {
        let store = composite();
        let key = ItemKey::with_sort("key-1", "balance");
        store
            .update(&key, Update::new().add("credits", 2))
            .await
            .unwrap();

        let decrement = || {
            Update::new().add("credits", -1).when(Condition::AtLeast {
                attribute: "credits".into(),
                value: 1,
            })
        };
        store.update(&key, decrement()).await.unwrap();
        let item = store.update(&key, decrement()).await.unwrap();
        assert_eq!(item["credits"], 0);

        let result = store.update(&key, decrement()).await;
        assert!(matches!(result, Err(StoreError::ConditionFailed { .. })));
    }

    #[tokio::test]
    async fn delete_returns_old_item() {
        let store = composite();
        let key = ItemKey::with_sort("u1", "profile");
        store
            .put(item(json!({"pk": "u1", "sk": "profile", "v": 1})), None)
            .await
            .unwrap();

        let old = store.delete(&key).await.unwrap().unwrap();
        assert_eq!(old["v"], 1);
        assert!(store.delete(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_orders_and_filters_by_sort_key() {
        let store = composite();
        for sk in ["prompt#2", "prompt#1", "profile", "prompt#3"] {
            store
                .put(item(json!({"pk": "u1", "sk": sk})), None)
                .await
                .unwrap();
        }
        store
            .put(item(json!({"pk": "u2", "sk": "prompt#9"})), None)
            .await
            .unwrap();

        let found = store
            .query(ItemQuery::partition("u1").begins_with("prompt#"))
            .await
            .unwrap();
        let sorts: Vec<_> = found.iter().map(|i| i["sk"].as_str().unwrap()).collect();
        assert_eq!(sorts, vec!["prompt#1", "prompt#2", "prompt#3"]);

        let latest = store
            .query(
                ItemQuery::partition("u1")
                    .begins_with("prompt#")
                    .descending()
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(latest[0]["sk"], "prompt#3");
    }

    #[tokio::test]
    async fn scan_and_batch_get() {
        let store = InMemoryItemStore::new(KeySchema::new("id"));
        for id in ["a", "b", "c"] {
            store.put(item(json!({"id": id})), None).await.unwrap();
        }

        assert_eq!(store.scan(None).await.unwrap().len(), 3);
        assert_eq!(store.scan(Some(2)).await.unwrap().len(), 2);

        let found = store
            .batch_get(&[ItemKey::new("c"), ItemKey::new("missing"), ItemKey::new("a")])
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|i| i["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        pk: String,
        sk: String,
        name: String,
    }

    #[tokio::test]
    async fn typed_round_trip_through_ext() {
        let store = composite();
        let profile = Profile {
            pk: "u1".into(),
            sk: "profile".into(),
            name: "Ada".into(),
        };
        store.put_as(&profile, None).await.unwrap();

        let loaded: Profile = store
            .get_as(&ItemKey::with_sort("u1", "profile"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, profile);
    }
}
