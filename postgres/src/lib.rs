//! `PostgreSQL` remote store for the raffle manager.
//!
//! Implements the `RemoteStore` trait from `raffle-core` on top of `sqlx`.
//! Each collection lives in its own table with the same shape:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS sales (
//!     id TEXT PRIMARY KEY,
//!     data JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! )
//! ```
//!
//! Records are stored whole as JSONB; the application maps them to domain
//! types. `select_all` returns rows in insertion order.
//!
//! # Example
//!
//! ```ignore
//! use raffle_postgres::PostgresRemoteStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresRemoteStore::new("postgres://localhost/raffle").await?;
//!     store.migrate(&["raffle_config", "sales"]).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use raffle_core::remote::{Record, RemoteError, RemoteFuture, RemoteStore};
use sqlx::PgPool;

/// `PostgreSQL`-backed remote store.
#[derive(Debug, Clone)]
pub struct PostgresRemoteStore {
    pool: PgPool,
}

impl PostgresRemoteStore {
    /// Connect to the database at `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Unavailable`] if the connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self, RemoteError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the given tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] if a table name is invalid or a statement fails.
    pub async fn migrate(&self, tables: &[&str]) -> Result<(), RemoteError> {
        for table in tables {
            let table = checked_table(table)?;
            sqlx::query(&format!(
                r"
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    data JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
                )
                "
            ))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            tracing::debug!(table, "Ensured remote table exists");
        }
        Ok(())
    }
}

/// Table names are interpolated into SQL, so only `[a-z0-9_]` is accepted.
fn checked_table(table: &str) -> Result<&str, RemoteError> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(table)
    } else {
        Err(RemoteError::Query(format!("Invalid table name: {table}")))
    }
}

fn map_sqlx_error(error: sqlx::Error) -> RemoteError {
    metrics::counter!("remote.postgres.errors").increment(1);
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Tls(_) => RemoteError::Unavailable(error.to_string()),
        other => RemoteError::Query(other.to_string()),
    }
}

impl RemoteStore for PostgresRemoteStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn select_all<'a>(&'a self, table: &'a str) -> RemoteFuture<'a, Vec<Record>> {
        Box::pin(async move {
            let table = checked_table(table)?;
            let rows: Vec<(sqlx::types::JsonValue,)> = sqlx::query_as(&format!(
                "SELECT data FROM {table} ORDER BY created_at, id"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            Ok(rows.into_iter().map(|(data,)| data).collect())
        })
    }

    fn count<'a>(&'a self, table: &'a str) -> RemoteFuture<'a, u64> {
        Box::pin(async move {
            let table = checked_table(table)?;
            let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            Ok(u64::try_from(count).unwrap_or_default())
        })
    }

    fn upsert<'a>(&'a self, table: &'a str, id: &'a str, record: Record) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let table = checked_table(table)?;
            sqlx::query(&format!(
                r"
                INSERT INTO {table} (id, data)
                VALUES ($1, $2)
                ON CONFLICT (id) DO UPDATE
                SET data = EXCLUDED.data, updated_at = now()
                "
            ))
            .bind(id)
            .bind(record)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            tracing::trace!(table, id, "Upserted remote record");
            Ok(())
        })
    }

    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let table = checked_table(table)?;
            sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            Ok(())
        })
    }

    fn delete_all<'a>(&'a self, table: &'a str) -> RemoteFuture<'a, u64> {
        Box::pin(async move {
            let table = checked_table(table)?;
            let result = sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

            tracing::info!(table, rows = result.rows_affected(), "Cleared remote table");
            Ok(result.rows_affected())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_restricted() {
        assert_eq!(checked_table("number_owners"), Ok("number_owners"));
        assert!(checked_table("sales; DROP TABLE sales").is_err());
        assert!(checked_table("Sales").is_err());
        assert!(checked_table("").is_err());
    }

    #[test]
    fn pool_errors_map_to_unavailable() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            RemoteError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            RemoteError::Query(_)
        ));
    }
}
