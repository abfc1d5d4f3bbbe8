//! Scoped transactions.
//!
//! A [`Transaction`] owns one pooled connection until it is committed or
//! rolled back. Dropping it without committing rolls back, so an early `?`
//! return or a cancelled task never leaves partial writes behind.

use crate::db::Row;
use crate::db::executor::{mysql, postgres, sqlite, with_deadline};
use crate::db::placeholder::prepare;
use crate::db::pool::DbPool;
use crate::error::DbResult;
use crate::models::{DatabaseType, FieldKind, Value};
use sqlx::{MySql, Postgres, Sqlite};
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

/// Database-specific transaction wrapper.
pub(crate) enum DbTransaction {
    MySql(sqlx::Transaction<'static, MySql>),
    Postgres(sqlx::Transaction<'static, Postgres>),
    SQLite(sqlx::Transaction<'static, Sqlite>),
}

impl DbTransaction {
    pub(crate) async fn begin(pool: &DbPool) -> Result<Self, sqlx::Error> {
        let inner = match pool {
            DbPool::MySql(p) => DbTransaction::MySql(p.begin().await?),
            DbPool::Postgres(p) => DbTransaction::Postgres(p.begin().await?),
            DbPool::SQLite(p) => DbTransaction::SQLite(p.begin().await?),
        };
        debug!(db_type = %pool.db_type(), "Transaction started");
        Ok(inner)
    }
}

pub struct Transaction {
    inner: DbTransaction,
    query_timeout: Option<Duration>,
    statements: usize,
    // Keeps the pool from finishing `destroy` while this is open
    _checkout: OwnedSemaphorePermit,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("db_type", &self.db_type())
            .field("statements", &self.statements)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(inner: DbTransaction, checkout: OwnedSemaphorePermit) -> Self {
        Self {
            inner,
            query_timeout: None,
            statements: 0,
            _checkout: checkout,
        }
    }

    pub(crate) fn with_query_timeout(mut self, limit: Option<Duration>) -> Self {
        self.query_timeout = limit;
        self
    }

    /// Get the database type for this transaction.
    pub fn db_type(&self) -> DatabaseType {
        match &self.inner {
            DbTransaction::MySql(_) => DatabaseType::MySQL,
            DbTransaction::Postgres(_) => DatabaseType::PostgreSQL,
            DbTransaction::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Run a query inside the transaction.
    pub async fn select(
        &mut self,
        sql: &str,
        args: &[Value],
        size: Option<usize>,
    ) -> DbResult<Vec<Row>> {
        let sql = prepare(sql, args.len(), self.db_type())?;
        debug!(sql = %sql, args = ?args, "SQL (transaction)");

        let query_timeout = self.query_timeout;
        let fetch = async {
            match &mut self.inner {
                DbTransaction::MySql(tx) => mysql::fetch_rows(tx, &sql, args, size).await,
                DbTransaction::Postgres(tx) => postgres::fetch_rows(tx, &sql, args, size).await,
                DbTransaction::SQLite(tx) => sqlite::fetch_rows(tx, &sql, args, size).await,
            }
        };
        let rows = with_deadline(query_timeout, "query execution", fetch).await?;
        self.statements += 1;
        debug!(rows = rows.len(), "rows returned");
        Ok(rows)
    }

    /// Run a write statement inside the transaction.
    pub async fn execute(&mut self, sql: &str, args: &[Value]) -> DbResult<u64> {
        self.execute_typed(sql, args, &[]).await
    }

    /// [`Transaction::execute`] with NULL arguments typed by `kinds`.
    pub(crate) async fn execute_typed(
        &mut self,
        sql: &str,
        args: &[Value],
        kinds: &[FieldKind],
    ) -> DbResult<u64> {
        let sql = prepare(sql, args.len(), self.db_type())?;
        debug!(sql = %sql, args = ?args, "SQL (transaction)");
        self.execute_prepared(&sql, args, kinds).await
    }

    /// Run a statement already rewritten for this backend.
    pub(crate) async fn execute_prepared(
        &mut self,
        sql: &str,
        args: &[Value],
        kinds: &[FieldKind],
    ) -> DbResult<u64> {
        let query_timeout = self.query_timeout;
        let write = async {
            match &mut self.inner {
                DbTransaction::MySql(tx) => mysql::execute_write(tx, sql, args, kinds).await,
                DbTransaction::Postgres(tx) => postgres::execute_write(tx, sql, args, kinds).await,
                DbTransaction::SQLite(tx) => sqlite::execute_write(tx, sql, args, kinds).await,
            }
        };
        let affected = with_deadline(query_timeout, "write operation", write).await?;
        self.statements += 1;
        debug!(affected, "statement executed in transaction");
        Ok(affected)
    }

    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        let statements = self.statements;
        match self.inner {
            DbTransaction::MySql(tx) => tx.commit().await?,
            DbTransaction::Postgres(tx) => tx.commit().await?,
            DbTransaction::SQLite(tx) => tx.commit().await?,
        }
        debug!(statements, "Transaction committed");
        Ok(())
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> DbResult<()> {
        let statements = self.statements;
        match self.inner {
            DbTransaction::MySql(tx) => tx.rollback().await?,
            DbTransaction::Postgres(tx) => tx.rollback().await?,
            DbTransaction::SQLite(tx) => tx.rollback().await?,
        }
        debug!(statements, "Transaction rolled back");
        Ok(())
    }
}
