//! PostgreSQL backend: translates the engine's conditional operations
//! into single statements whose rows-affected count carries the
//! conflict signal.
//!
//! Every batch runs in one transaction; the first conditional statement
//! that affects zero rows aborts it (dropping the transaction handle
//! rolls back). Audit timestamps are day-truncated UTC, computed in SQL
//! so all replicas of the service agree.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use vss_storage::{KeyVersion, Record, RecordStore, StorageError, WriteOp, GLOBAL_VERSION_KEY};

/// Connection and pool parameters, mapped from service configuration by
/// the caller.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Upper bound on open connections; also the effective request
    /// parallelism of the service.
    pub max_pool_size: u32,
    pub min_idle: u32,
    pub acquire_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub max_lifetime_ms: u64,
    pub statement_cache_size: usize,
}

/// One logical table; `value` is opaque bytes and the composite primary
/// key enforces record uniqueness per tenant and store.
const SCHEMA: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS vss_db (
    user_token character varying(120) NOT NULL CHECK (user_token <> ''),
    store_id character varying(120) NOT NULL CHECK (store_id <> ''),
    "key" character varying(600) NOT NULL,
    value bytea NULL,
    version bigint NOT NULL,
    created_at TIMESTAMP WITH TIME ZONE,
    last_updated_at TIMESTAMP WITH TIME ZONE,
    PRIMARY KEY (user_token, store_id, "key")
)
"#];

const INSERT_SQL: &str = r#"
INSERT INTO vss_db (user_token, store_id, "key", value, version, created_at, last_updated_at)
VALUES ($1, $2, $3, $4, 1, date_trunc('day', now()), date_trunc('day', now()))
ON CONFLICT (user_token, store_id, "key") DO NOTHING
"#;

const UPDATE_SQL: &str = r#"
UPDATE vss_db
SET value = $4, version = version + 1, last_updated_at = date_trunc('day', now())
WHERE user_token = $1 AND store_id = $2 AND "key" = $3 AND version = $5
"#;

const UPSERT_SQL: &str = r#"
INSERT INTO vss_db (user_token, store_id, "key", value, version, created_at, last_updated_at)
VALUES ($1, $2, $3, $4, 1, date_trunc('day', now()), date_trunc('day', now()))
ON CONFLICT (user_token, store_id, "key")
DO UPDATE SET value = EXCLUDED.value, version = 1, last_updated_at = EXCLUDED.last_updated_at
"#;

const DELETE_SQL: &str = r#"
DELETE FROM vss_db
WHERE user_token = $1 AND store_id = $2 AND "key" = $3 AND version = $4
"#;

const DELETE_ANY_SQL: &str = r#"
DELETE FROM vss_db WHERE user_token = $1 AND store_id = $2 AND "key" = $3
"#;

const FETCH_SQL: &str = r#"
SELECT "key", value, version, created_at, last_updated_at
FROM vss_db
WHERE user_token = $1 AND store_id = $2 AND "key" = $3
"#;

const SCAN_SQL: &str = r#"
SELECT "key", version
FROM vss_db
WHERE user_token = $1 AND store_id = $2
  AND "key" LIKE $3
  AND "key" > $4
  AND "key" <> $5
ORDER BY "key" ASC
LIMIT $6
"#;

/// PostgreSQL [`RecordStore`].
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Open a connection pool with the given parameters.
    pub async fn connect(config: &PoolConfig) -> Result<Self, StorageError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database)
            .statement_cache_capacity(config.statement_cache_size);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_pool_size)
            .min_connections(config.min_idle)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .idle_timeout(Duration::from_millis(config.idle_timeout_ms))
            .max_lifetime(Duration::from_millis(config.max_lifetime_ms))
            .connect_with(options)
            .await
            .map_err(db_err)?;

        tracing::info!(
            host = %config.host,
            database = %config.database,
            max_pool_size = config.max_pool_size,
            "connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, custom wiring).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table if it does not exist yet.
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }
}

/// Execute one op inside the transaction; returns rows affected.
async fn exec_op(
    tx: &mut Transaction<'_, Postgres>,
    user_token: &str,
    store_id: &str,
    op: &WriteOp,
) -> Result<u64, StorageError> {
    let result = match op {
        WriteOp::Insert { key, value } => {
            sqlx::query(INSERT_SQL)
                .bind(user_token)
                .bind(store_id)
                .bind(key)
                .bind(value.as_ref())
                .execute(&mut **tx)
                .await
        }
        WriteOp::Update { key, value, expect } => {
            sqlx::query(UPDATE_SQL)
                .bind(user_token)
                .bind(store_id)
                .bind(key)
                .bind(value.as_ref())
                .bind(expect)
                .execute(&mut **tx)
                .await
        }
        WriteOp::Upsert { key, value } => {
            sqlx::query(UPSERT_SQL)
                .bind(user_token)
                .bind(store_id)
                .bind(key)
                .bind(value.as_ref())
                .execute(&mut **tx)
                .await
        }
        WriteOp::Delete { key, expect } => {
            sqlx::query(DELETE_SQL)
                .bind(user_token)
                .bind(store_id)
                .bind(key)
                .bind(expect)
                .execute(&mut **tx)
                .await
        }
        WriteOp::DeleteAny { key } => {
            sqlx::query(DELETE_ANY_SQL)
                .bind(user_token)
                .bind(store_id)
                .bind(key)
                .execute(&mut **tx)
                .await
        }
    };
    Ok(result.map_err(db_err)?.rows_affected())
}

/// Whether a zero-row outcome means conflict for this op.
fn is_conditional(op: &WriteOp) -> bool {
    matches!(
        op,
        WriteOp::Insert { .. } | WriteOp::Update { .. } | WriteOp::Delete { .. }
    )
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn fetch(
        &self,
        user_token: &str,
        store_id: &str,
        key: &str,
    ) -> Result<Option<Record>, StorageError> {
        type Row = (
            String,
            Option<Vec<u8>>,
            i64,
            Option<chrono::DateTime<chrono::Utc>>,
            Option<chrono::DateTime<chrono::Utc>>,
        );
        let row: Option<Row> = sqlx::query_as(FETCH_SQL)
            .bind(user_token)
            .bind(store_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.map(|(key, value, version, created_at, last_updated_at)| Record {
            key,
            value: value.unwrap_or_default().into(),
            version,
            created_at: created_at.unwrap_or_default(),
            last_updated_at: last_updated_at.unwrap_or_default(),
        }))
    }

    async fn apply(
        &self,
        user_token: &str,
        store_id: &str,
        ops: &[WriteOp],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for op in ops {
            let rows = exec_op(&mut tx, user_token, store_id, op).await?;
            if rows == 0 && is_conditional(op) {
                // Returning drops `tx`, which rolls the transaction back.
                return Err(StorageError::Conflict(format!(
                    "conditional write affected zero rows for key {}",
                    op.key()
                )));
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn scan_keys(
        &self,
        user_token: &str,
        store_id: &str,
        prefix: &str,
        after: &str,
        limit: usize,
    ) -> Result<Vec<KeyVersion>, StorageError> {
        let pattern = format!("{}%", escape_like(prefix));
        let rows: Vec<(String, i64)> = sqlx::query_as(SCAN_SQL)
            .bind(user_token)
            .bind(store_id)
            .bind(pattern)
            .bind(after)
            .bind(GLOBAL_VERSION_KEY)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(key, version)| KeyVersion { key, version })
            .collect())
    }
}

/// Escape LIKE metacharacters so a prefix matches literally.
fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn db_err(err: sqlx::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_passes_plain_prefixes_through() {
        assert_eq!(escape_like("channel/"), "channel/");
        assert_eq!(escape_like(""), "");
    }

    #[test]
    fn test_escape_like_quotes_metacharacters() {
        assert_eq!(escape_like("a%b"), "a\\%b");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }
}
