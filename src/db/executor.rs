//! Query execution engine.
//!
//! Runs a [`CompiledQuery`] against a pool and converts the results.
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific fetch and write operations
//! - `postgres`: PostgreSQL-specific fetch and write operations
//! - `sqlite`: SQLite-specific fetch and write operations
//!
//! Each submodule provides identical functionality adapted to the database's type system.
//! No statement timeout is applied; pool acquisition is bounded by the pool's
//! acquire timeout.

use crate::db::compiler::CompiledQuery;
use crate::db::pool::DbPool;
use crate::db::schema::ModelSchema;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use serde_json::{Map, Value as JsonValue};
use std::time::Instant;
use tracing::debug;

/// A decoded row keyed by field name.
pub type JsonRow = Map<String, JsonValue>;

/// Executes compiled statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor;

impl QueryExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Execute a SELECT and decode every row against `schema`.
    pub async fn fetch_all(
        &self,
        pool: &DbPool,
        query: &CompiledQuery,
        schema: &ModelSchema,
    ) -> DbResult<Vec<JsonRow>> {
        let start = Instant::now();
        debug!(
            sql = %query.sql,
            params = query.params.len(),
            "Executing query"
        );

        let rows = impl_db_dispatch!(pool, {
            MySql(p) => mysql::fetch_rows(p, query).await.map(|rows| decode_rows(rows, schema)),
            Postgres(p) => postgres::fetch_rows(p, query).await.map(|rows| decode_rows(rows, schema)),
            SQLite(p) => sqlite::fetch_rows(p, query).await.map(|rows| decode_rows(rows, schema)),
        })
        .map_err(|e| pool_error(pool, e))?;

        debug!(
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query completed"
        );
        Ok(rows)
    }

    /// Execute a `SELECT COUNT(*)` style query and return the first column.
    pub async fn fetch_count(&self, pool: &DbPool, query: &CompiledQuery) -> DbResult<u64> {
        debug!(
            sql = %query.sql,
            params = query.params.len(),
            "Executing count"
        );

        let count = impl_db_dispatch!(pool, {
            MySql(p) => mysql::fetch_count(p, query).await,
            Postgres(p) => postgres::fetch_count(p, query).await,
            SQLite(p) => sqlite::fetch_count(p, query).await,
        })
        .map_err(|e| pool_error(pool, e))?;
        u64::try_from(count)
            .map_err(|_| DbError::internal(format!("negative row count: {}", count)))
    }

    /// Execute a write operation (INSERT, UPDATE, DELETE) and return affected rows.
    pub async fn execute(&self, pool: &DbPool, query: &CompiledQuery) -> DbResult<u64> {
        let start = Instant::now();
        debug!(
            sql = %query.sql,
            params = query.params.len(),
            "Executing write operation"
        );

        let rows_affected = impl_db_dispatch!(pool, {
            MySql(p) => mysql::execute(p, query).await,
            Postgres(p) => postgres::execute(p, query).await,
            SQLite(p) => sqlite::execute(p, query).await,
        })
        .map_err(|e| pool_error(pool, e))?;

        debug!(
            rows_affected,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Write completed"
        );
        Ok(rows_affected)
    }
}

/// Convert a driver error, reporting the pool's configured acquire timeout.
fn pool_error(pool: &DbPool, err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::PoolTimedOut => DbError::timeout(
            "connection pool acquire",
            pool.acquire_timeout().as_secs(),
        ),
        other => DbError::from(other),
    }
}

fn decode_rows<R: RowToJson>(rows: Vec<R>, schema: &ModelSchema) -> Vec<JsonRow> {
    rows.iter().map(|row| row.to_json_map(schema)).collect()
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlx::MySqlPool;
    use sqlx::mysql::MySqlRow;

    pub async fn fetch_rows(pool: &MySqlPool, query: &CompiledQuery) -> sqlx::Result<Vec<MySqlRow>> {
        let mut q = sqlx::query(&query.sql);
        for param in &query.params {
            q = bind_mysql_param(q, param);
        }
        q.fetch_all(pool).await
    }

    pub async fn fetch_count(pool: &MySqlPool, query: &CompiledQuery) -> sqlx::Result<i64> {
        use sqlx::Row;
        let mut q = sqlx::query(&query.sql);
        for param in &query.params {
            q = bind_mysql_param(q, param);
        }
        let row = q.fetch_one(pool).await?;
        row.try_get::<i64, _>(0)
    }

    pub async fn execute(pool: &MySqlPool, query: &CompiledQuery) -> sqlx::Result<u64> {
        let mut q = sqlx::query(&query.sql);
        for param in &query.params {
            q = bind_mysql_param(q, param);
        }
        let result = q.execute(pool).await?;
        Ok(result.rows_affected())
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use sqlx::PgPool;
    use sqlx::postgres::PgRow;

    pub async fn fetch_rows(pool: &PgPool, query: &CompiledQuery) -> sqlx::Result<Vec<PgRow>> {
        let mut q = sqlx::query(&query.sql);
        for param in &query.params {
            q = bind_postgres_param(q, param);
        }
        q.fetch_all(pool).await
    }

    pub async fn fetch_count(pool: &PgPool, query: &CompiledQuery) -> sqlx::Result<i64> {
        use sqlx::Row;
        let mut q = sqlx::query(&query.sql);
        for param in &query.params {
            q = bind_postgres_param(q, param);
        }
        let row = q.fetch_one(pool).await?;
        row.try_get::<i64, _>(0)
    }

    pub async fn execute(pool: &PgPool, query: &CompiledQuery) -> sqlx::Result<u64> {
        let mut q = sqlx::query(&query.sql);
        for param in &query.params {
            q = bind_postgres_param(q, param);
        }
        let result = q.execute(pool).await?;
        Ok(result.rows_affected())
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_rows(pool: &SqlitePool, query: &CompiledQuery) -> sqlx::Result<Vec<SqliteRow>> {
        let mut q = sqlx::query(&query.sql);
        for param in &query.params {
            q = bind_sqlite_param(q, param);
        }
        q.fetch_all(pool).await
    }

    pub async fn fetch_count(pool: &SqlitePool, query: &CompiledQuery) -> sqlx::Result<i64> {
        use sqlx::Row;
        let mut q = sqlx::query(&query.sql);
        for param in &query.params {
            q = bind_sqlite_param(q, param);
        }
        let row = q.fetch_one(pool).await?;
        row.try_get::<i64, _>(0)
    }

    pub async fn execute(pool: &SqlitePool, query: &CompiledQuery) -> sqlx::Result<u64> {
        let mut q = sqlx::query(&query.sql);
        for param in &query.params {
            q = bind_sqlite_param(q, param);
        }
        let result = q.execute(pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_timeout_reports_configured_limit() {
        let pool = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(7))
            .connect_lazy("sqlite::memory:")
            .unwrap();
        let pool = DbPool::SQLite(pool);

        let err = pool_error(&pool, sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DbError::Timeout { elapsed_secs: Some(7), .. }));
        assert!(err.is_retryable());

        let err = pool_error(&pool, sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
