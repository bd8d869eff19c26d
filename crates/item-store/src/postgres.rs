use async_trait::async_trait;
use serde::de::Error as _;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::store::record_operation;
use crate::{
    Condition, Item, ItemKey, ItemQuery, ItemStore, KeySchema, Result, SortCondition, StoreError,
    Update,
};

/// Attempts at an update whose item keeps being created concurrently.
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// PostgreSQL-backed item store.
///
/// All logical tables share the `items` table, partitioned by `table_name`.
/// Items without a sort key are stored with an empty sort value.
#[derive(Clone)]
pub struct PostgresItemStore {
    pool: PgPool,
    table: String,
    schema: KeySchema,
}

impl PostgresItemStore {
    /// Creates a new store for the logical table `table`.
    pub fn new(pool: PgPool, table: impl Into<String>, schema: KeySchema) -> Self {
        Self {
            pool,
            table: table.into(),
            schema,
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    fn sort_value(key: &ItemKey) -> &str {
        key.sort.as_deref().unwrap_or("")
    }

    fn row_to_item(row: PgRow) -> Result<Item> {
        match row.try_get::<Value, _>("item")? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::Serialization(serde_json::Error::custom(
                "stored item is not a JSON object",
            ))),
        }
    }

    async fn lock_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &ItemKey,
    ) -> Result<Option<Item>> {
        let row = sqlx::query(
            "SELECT item FROM items WHERE table_name = $1 AND pk = $2 AND sk = $3 FOR UPDATE",
        )
        .bind(&self.table)
        .bind(&key.partition)
        .bind(Self::sort_value(key))
        .fetch_optional(&mut **tx)
        .await?;

        row.map(Self::row_to_item).transpose()
    }

    /// Inserts an item that was absent when locked.
    ///
    /// Returns `false` when a concurrent transaction created it first; the
    /// caller must then start over, since `FOR UPDATE` locked no row.
    async fn insert_new(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &ItemKey,
        item: &Item,
    ) -> Result<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO items (table_name, pk, sk, item)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (table_name, pk, sk) DO NOTHING
            "#,
        )
        .bind(&self.table)
        .bind(&key.partition)
        .bind(Self::sort_value(key))
        .bind(Value::Object(item.clone()))
        .execute(&mut **tx)
        .await?;
        Ok(inserted.rows_affected() == 1)
    }

    async fn upsert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &ItemKey,
        item: &Item,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO items (table_name, pk, sk, item, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (table_name, pk, sk)
            DO UPDATE SET item = EXCLUDED.item, updated_at = NOW()
            "#,
        )
        .bind(&self.table)
        .bind(&key.partition)
        .bind(Self::sort_value(key))
        .bind(Value::Object(item.clone()))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ItemStore for PostgresItemStore {
    fn key_schema(&self) -> &KeySchema {
        &self.schema
    }

    async fn get(&self, key: &ItemKey) -> Result<Option<Item>> {
        self.schema.check(key)?;
        record_operation("postgres", "get");

        let row =
            sqlx::query("SELECT item FROM items WHERE table_name = $1 AND pk = $2 AND sk = $3")
                .bind(&self.table)
                .bind(&key.partition)
                .bind(Self::sort_value(key))
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::row_to_item).transpose()
    }

    async fn put(&self, item: Item, condition: Option<Condition>) -> Result<()> {
        let key = self.schema.key_of(&item)?;
        record_operation("postgres", "put");

        // NotExists is enforced by the primary key so concurrent writers cannot both win.
        if condition == Some(Condition::NotExists) {
            let inserted = sqlx::query(
                r#"
                INSERT INTO items (table_name, pk, sk, item)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (table_name, pk, sk) DO NOTHING
                "#,
            )
            .bind(&self.table)
            .bind(&key.partition)
            .bind(Self::sort_value(&key))
            .bind(Value::Object(item))
            .execute(&self.pool)
            .await?;

            if inserted.rows_affected() == 0 {
                return Err(StoreError::ConditionFailed {
                    key: key.to_string(),
                    reason: "item already exists".to_string(),
                });
            }
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        if let Some(condition) = condition {
            let existing = self.lock_item(&mut tx, &key).await?;
            condition.check(&key, existing.as_ref())?;
        }
        self.upsert(&mut tx, &key, &item).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, key: &ItemKey, update: Update) -> Result<Item> {
        self.schema.check(key)?;
        record_operation("postgres", "update");

        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let mut tx = self.pool.begin().await?;
            let existing = self.lock_item(&mut tx, key).await?;
            let created = existing.is_none();
            let updated = update.apply(&self.schema, key, existing)?;

            if created {
                if !self.insert_new(&mut tx, key, &updated).await? {
                    tracing::debug!(%key, attempt, "item created concurrently, retrying update");
                    continue;
                }
            } else {
                self.upsert(&mut tx, key, &updated).await?;
            }
            tx.commit().await?;
            return Ok(updated);
        }

        Err(StoreError::ConditionFailed {
            key: key.to_string(),
            reason: "item kept being created concurrently".to_string(),
        })
    }

    async fn delete(&self, key: &ItemKey) -> Result<Option<Item>> {
        self.schema.check(key)?;
        record_operation("postgres", "delete");

        let row = sqlx::query(
            "DELETE FROM items WHERE table_name = $1 AND pk = $2 AND sk = $3 RETURNING item",
        )
        .bind(&self.table)
        .bind(&key.partition)
        .bind(Self::sort_value(key))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_item).transpose()
    }

    async fn query(&self, query: ItemQuery) -> Result<Vec<Item>> {
        record_operation("postgres", "query");

        let mut sql = String::from("SELECT item FROM items WHERE table_name = $1 AND pk = $2");
        let mut params: Vec<&str> = Vec::new();

        // Sort values compare bytewise, matching the in-memory ordering.
        match &query.sort {
            Some(SortCondition::Equals(v)) => {
                sql.push_str(" AND sk = $3");
                params.push(v);
            }
            Some(SortCondition::BeginsWith(prefix)) => {
                sql.push_str(" AND starts_with(sk, $3)");
                params.push(prefix);
            }
            Some(SortCondition::Between(lo, hi)) => {
                sql.push_str(r#" AND sk COLLATE "C" BETWEEN $3 AND $4"#);
                params.push(lo);
                params.push(hi);
            }
            None => {}
        }

        let direction = if query.descending { "DESC" } else { "ASC" };
        sql.push_str(&format!(r#" ORDER BY sk COLLATE "C" {direction}"#));
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query(&sql).bind(&self.table).bind(&query.partition);
        for param in params {
            q = q.bind(param);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn scan(&self, limit: Option<usize>) -> Result<Vec<Item>> {
        record_operation("postgres", "scan");

        let rows = sqlx::query(
            r#"
            SELECT item FROM items
            WHERE table_name = $1
            ORDER BY pk COLLATE "C", sk COLLATE "C"
            LIMIT $2
            "#,
        )
        .bind(&self.table)
        .bind(limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn batch_get(&self, keys: &[ItemKey]) -> Result<Vec<Item>> {
        for key in keys {
            self.schema.check(key)?;
        }
        record_operation("postgres", "batch_get");

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let partitions: Vec<String> = keys.iter().map(|k| k.partition.clone()).collect();
        let sorts: Vec<String> = keys.iter().map(|k| Self::sort_value(k).to_string()).collect();

        let rows = sqlx::query(
            r#"
            SELECT i.item
            FROM UNNEST($2::text[], $3::text[]) WITH ORDINALITY AS k(pk, sk, ord)
            JOIN items i ON i.table_name = $1 AND i.pk = k.pk AND i.sk = k.sk
            ORDER BY k.ord
            "#,
        )
        .bind(&self.table)
        .bind(&partitions)
        .bind(&sorts)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }
}
