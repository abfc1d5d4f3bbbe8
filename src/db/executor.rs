//! Statement execution.
//!
//! This module provides query execution functionality with support for:
//! - Placeholder arity checks and dialect rewriting
//! - Row limits (enforced via streaming - only fetches needed rows)
//! - Autocommit or wrapped-in-transaction writes
//! - Optional statement deadlines
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific query and write operations
//! - `postgres`: PostgreSQL-specific query and write operations
//! - `sqlite`: SQLite-specific query and write operations
//!
//! They run on a bare connection, so pooled connections and transactions
//! share them.

use crate::db::Row;
use crate::db::params::bind_values;
use crate::db::placeholder::prepare;
use crate::db::pool::{BackendConnection, Pool, PooledConnection};
use crate::db::transaction::Transaction;
use crate::db::types::RowToValues;
use crate::error::{DbError, DbResult};
use crate::models::{FieldKind, Value};
use futures_util::{Stream, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs statements against the pool.
///
/// Cheap to clone: it only holds the shared [`Pool`] handle.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    pool: Pool,
    query_timeout: Option<Duration>,
}

impl QueryExecutor {
    /// Create an executor without a statement deadline.
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            query_timeout: None,
        }
    }

    /// Fail statements that run longer than `limit`.
    pub fn with_query_timeout(mut self, limit: Duration) -> Self {
        self.query_timeout = Some(limit);
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }

    /// Run a query and return at most `size` rows.
    pub async fn select(
        &self,
        sql: &str,
        args: &[Value],
        size: Option<usize>,
    ) -> DbResult<Vec<Row>> {
        let db_type = self.pool.db_type().await?;
        let sql = prepare(sql, args.len(), db_type)?;
        debug!(sql = %sql, args = ?args, "SQL");

        let mut conn = self.pool.acquire().await?;
        let rows = with_deadline(
            self.query_timeout,
            "query execution",
            fetch_on(&mut conn, &sql, args, size),
        )
        .await?;
        conn.release();

        debug!(rows = rows.len(), "rows returned");
        Ok(rows)
    }

    /// Run a write statement using the pool's default autocommit mode.
    pub async fn execute(&self, sql: &str, args: &[Value]) -> DbResult<u64> {
        let autocommit = self.pool.autocommit().await?;
        self.execute_with(sql, args, autocommit).await
    }

    /// Run a write statement and return the number of affected rows.
    ///
    /// Without autocommit the statement runs in its own transaction, which
    /// is rolled back when the statement fails. The statement's error is
    /// returned even if the rollback fails too.
    pub async fn execute_with(&self, sql: &str, args: &[Value], autocommit: bool) -> DbResult<u64> {
        self.write(sql, args, &[], autocommit).await
    }

    /// [`QueryExecutor::execute`] with NULL arguments typed by `kinds`.
    pub(crate) async fn execute_typed(
        &self,
        sql: &str,
        args: &[Value],
        kinds: &[FieldKind],
    ) -> DbResult<u64> {
        let autocommit = self.pool.autocommit().await?;
        self.write(sql, args, kinds, autocommit).await
    }

    async fn write(
        &self,
        sql: &str,
        args: &[Value],
        kinds: &[FieldKind],
        autocommit: bool,
    ) -> DbResult<u64> {
        let db_type = self.pool.db_type().await?;
        let sql = prepare(sql, args.len(), db_type)?;
        debug!(sql = %sql, args = ?args, autocommit, "SQL");

        let affected = if autocommit {
            let mut conn = self.pool.acquire().await?;
            let affected = with_deadline(
                self.query_timeout,
                "write operation",
                execute_on(&mut conn, &sql, args, kinds),
            )
            .await?;
            conn.release();
            affected
        } else {
            let mut tx = self.begin().await?;
            match tx.execute_prepared(&sql, args, kinds).await {
                Ok(affected) => {
                    tx.commit().await?;
                    affected
                }
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "Rollback failed after statement error");
                    }
                    return Err(e);
                }
            }
        };

        debug!(affected, "statement executed");
        Ok(affected)
    }

    /// Begin a transaction for multi-statement atomicity.
    pub async fn begin(&self) -> DbResult<Transaction> {
        let tx = self.pool.begin().await?;
        Ok(tx.with_query_timeout(self.query_timeout))
    }
}

async fn fetch_on(
    conn: &mut PooledConnection,
    sql: &str,
    args: &[Value],
    size: Option<usize>,
) -> DbResult<Vec<Row>> {
    match conn.backend_mut() {
        BackendConnection::MySql(c) => mysql::fetch_rows(c, sql, args, size).await,
        BackendConnection::Postgres(c) => postgres::fetch_rows(c, sql, args, size).await,
        BackendConnection::SQLite(c) => sqlite::fetch_rows(c, sql, args, size).await,
    }
}

async fn execute_on(
    conn: &mut PooledConnection,
    sql: &str,
    args: &[Value],
    kinds: &[FieldKind],
) -> DbResult<u64> {
    match conn.backend_mut() {
        BackendConnection::MySql(c) => mysql::execute_write(c, sql, args, kinds).await,
        BackendConnection::Postgres(c) => postgres::execute_write(c, sql, args, kinds).await,
        BackendConnection::SQLite(c) => sqlite::execute_write(c, sql, args, kinds).await,
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

/// Await `fut`, failing with a timeout error once `limit` elapses.
pub(crate) async fn with_deadline<T>(
    limit: Option<Duration>,
    operation: &str,
    fut: impl Future<Output = DbResult<T>>,
) -> DbResult<T> {
    match limit {
        Some(limit) => match timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(operation, limit)),
        },
        None => fut.await,
    }
}

/// Drain a row stream, stopping after `size` rows.
async fn take_rows<R, S>(stream: S, size: Option<usize>) -> DbResult<Vec<Row>>
where
    R: RowToValues,
    S: Stream<Item = Result<R, sqlx::Error>>,
{
    let results: Vec<Result<R, sqlx::Error>> = match size {
        Some(n) => stream.take(n).collect().await,
        None => stream.collect().await,
    };
    let rows = collect_rows(results)?;
    Ok(rows.iter().map(RowToValues::to_values).collect())
}

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(DbError::from)?);
    }
    Ok(rows)
}

fn timeout_error(operation: &str, limit: Duration) -> DbError {
    DbError::timeout(operation, limit.as_secs())
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

pub(crate) mod mysql {
    use super::*;
    use sqlx::{MySql, MySqlConnection};

    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        sql: &str,
        args: &[Value],
        size: Option<usize>,
    ) -> DbResult<Vec<Row>> {
        let query = bind_values::<MySql>(sqlx::query(sql), args, &[]);
        take_rows(query.fetch(conn), size).await
    }

    pub async fn execute_write(
        conn: &mut MySqlConnection,
        sql: &str,
        args: &[Value],
        kinds: &[FieldKind],
    ) -> DbResult<u64> {
        let query = bind_values::<MySql>(sqlx::query(sql), args, kinds);
        Ok(query.execute(conn).await?.rows_affected())
    }
}

pub(crate) mod postgres {
    use super::*;
    use sqlx::{PgConnection, Postgres};

    pub async fn fetch_rows(
        conn: &mut PgConnection,
        sql: &str,
        args: &[Value],
        size: Option<usize>,
    ) -> DbResult<Vec<Row>> {
        let query = bind_values::<Postgres>(sqlx::query(sql), args, &[]);
        take_rows(query.fetch(conn), size).await
    }

    pub async fn execute_write(
        conn: &mut PgConnection,
        sql: &str,
        args: &[Value],
        kinds: &[FieldKind],
    ) -> DbResult<u64> {
        let query = bind_values::<Postgres>(sqlx::query(sql), args, kinds);
        Ok(query.execute(conn).await?.rows_affected())
    }
}

pub(crate) mod sqlite {
    use super::*;
    use sqlx::{Sqlite, SqliteConnection};

    pub async fn fetch_rows(
        conn: &mut SqliteConnection,
        sql: &str,
        args: &[Value],
        size: Option<usize>,
    ) -> DbResult<Vec<Row>> {
        let query = bind_values::<Sqlite>(sqlx::query(sql), args, &[]);
        take_rows(query.fetch(conn), size).await
    }

    pub async fn execute_write(
        conn: &mut SqliteConnection,
        sql: &str,
        args: &[Value],
        kinds: &[FieldKind],
    ) -> DbResult<u64> {
        let query = bind_values::<Sqlite>(sqlx::query(sql), args, kinds);
        Ok(query.execute(conn).await?.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_elapses() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, DbError>(1)
        };
        let result = with_deadline(Some(Duration::from_millis(10)), "query execution", slow).await;
        assert!(matches!(result, Err(DbError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_no_deadline_waits() {
        let fast = async { Ok::<_, DbError>(7) };
        assert_eq!(with_deadline(None, "query execution", fast).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_executor_on_uninitialized_pool() {
        let executor = QueryExecutor::new(Pool::new());
        let err = executor.select("SELECT 1", &[], None).await.unwrap_err();
        assert!(matches!(err, DbError::Lifecycle { .. }));
        let err = executor.execute("DELETE FROM t", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::Lifecycle { .. }));
    }
}
