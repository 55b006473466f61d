use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Collection, Record, RecordKey, RecordStoreError, Result, Version,
    store::{RecordStore, WriteOp, validate_batch},
};

/// PostgreSQL-backed record store implementation.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Creates a new PostgreSQL record store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store over a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<Record> {
        let collection: String = row.try_get("collection")?;
        let collection = Collection::parse(&collection).ok_or_else(|| {
            RecordStoreError::Database(sqlx::Error::Decode(
                format!("unknown collection {collection}").into(),
            ))
        })?;

        Ok(Record {
            key: RecordKey {
                collection,
                id: row.try_get("id")?,
            },
            version: Version::new(row.try_get("version")?),
            value: row.try_get("value")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT collection, id, version, value, updated_at
            FROM records
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(key.collection.as_str())
        .bind(&key.id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            r#"
            SELECT collection, id, version, value, updated_at
            FROM records
            WHERE collection = $1
            ORDER BY id ASC
            "#,
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn write_batch(&self, mut ops: Vec<WriteOp>) -> Result<Vec<Version>> {
        validate_batch(&ops)?;

        // Lock rows in key order so concurrent batches cannot deadlock.
        let mut order: Vec<usize> = (0..ops.len()).collect();
        order.sort_by(|a, b| ops[*a].key.cmp(&ops[*b].key));

        let mut tx = self.pool.begin().await?;

        let mut current = vec![Version::initial(); ops.len()];
        for &i in &order {
            let op = &ops[i];
            let version: Option<i64> = sqlx::query_scalar(
                "SELECT version FROM records WHERE collection = $1 AND id = $2 FOR UPDATE",
            )
            .bind(op.key.collection.as_str())
            .bind(&op.key.id)
            .fetch_optional(&mut *tx)
            .await?;

            let version = version.map(Version::new).unwrap_or_default();
            op.precondition.check(&op.key, version)?;
            current[i] = version;
        }

        let mut versions = vec![Version::initial(); ops.len()];
        for &i in &order {
            let value = ops[i].value.take();
            let op = &ops[i];
            let Some(value) = value else {
                sqlx::query("DELETE FROM records WHERE collection = $1 AND id = $2")
                    .bind(op.key.collection.as_str())
                    .bind(&op.key.id)
                    .execute(&mut *tx)
                    .await?;
                continue;
            };

            let next = current[i].next();
            let written = sqlx::query(
                r#"
                INSERT INTO records (collection, id, version, value, updated_at)
                VALUES ($1, $2, $3, $4, NOW())
                ON CONFLICT (collection, id) DO UPDATE SET
                    version = EXCLUDED.version,
                    value = EXCLUDED.value,
                    updated_at = EXCLUDED.updated_at
                WHERE records.version = $5
                "#,
            )
            .bind(op.key.collection.as_str())
            .bind(&op.key.id)
            .bind(next.as_i64())
            .bind(&value)
            .bind(current[i].as_i64())
            .execute(&mut *tx)
            .await?
            .rows_affected();

            // Zero rows: someone inserted a record we saw as absent.
            if written == 0 {
                return Err(RecordStoreError::ConcurrencyConflict {
                    key: op.key.clone(),
                    expected: op.precondition,
                    actual: next,
                });
            }

            versions[i] = next;
        }

        tx.commit().await?;
        Ok(versions)
    }
}
