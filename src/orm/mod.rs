//! Record runtime.
//!
//! A [`Model`] pairs a [`Schema`] with a [`QueryExecutor`] and turns record
//! operations into the schema's SQL templates. Lookups return fresh
//! [`Record`]s; writes return the affected-row count and only log when it
//! is not exactly one, so callers decide how strict to be.

pub mod query;

pub use query::{FindAll, Limit};

use crate::db::{QueryExecutor, Transaction};
use crate::error::{DbError, DbResult};
use crate::models::schema::quote;
use crate::models::{Field, FieldKind, Record, Schema, Value};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Column alias used by [`Model::find_number`].
const NUMBER_ALIAS: &str = "_num_";

#[derive(Debug, Clone)]
pub struct Model {
    schema: Arc<Schema>,
    executor: QueryExecutor,
}

impl Model {
    pub fn new(schema: Arc<Schema>, executor: QueryExecutor) -> Self {
        Self { schema, executor }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Empty record of this type.
    pub fn record(&self) -> Record {
        Record::new(Arc::clone(&self.schema))
    }

    pub fn record_from<I, K, V>(&self, pairs: I) -> Record
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Record::from_pairs(Arc::clone(&self.schema), pairs)
    }

    pub fn record_from_typed<T: Serialize>(&self, value: &T) -> DbResult<Record> {
        Record::from_typed(Arc::clone(&self.schema), value)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Record with the given primary key, if any.
    pub async fn find(&self, pk: impl Into<Value>) -> DbResult<Option<Record>> {
        let sql = format!(
            "{} WHERE {}=?",
            self.schema.select_sql(),
            quote(self.schema.primary_key())
        );
        let rows = self.executor.select(&sql, &[pk.into()], Some(1)).await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| Record::from_row(Arc::clone(&self.schema), row)))
    }

    /// Single aggregate, e.g. `count(id)`; `None` when no row or NULL.
    pub async fn find_number(
        &self,
        select_field: &str,
        filter: Option<&str>,
        args: &[Value],
    ) -> DbResult<Option<Value>> {
        let mut sql = format!(
            "SELECT {} {} FROM {}",
            select_field,
            NUMBER_ALIAS,
            quote(self.schema.table())
        );
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }

        let rows = self.executor.select(&sql, args, Some(1)).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(NUMBER_ALIAS))
            .filter(|v| !v.is_null()))
    }

    /// Records matching `query`, in database order unless it sets one.
    pub async fn find_all(&self, query: FindAll) -> DbResult<Vec<Record>> {
        let db_type = self.executor.pool().db_type().await?;
        let (sql, args) = query.build(&self.schema, db_type)?;
        let rows = self.executor.select(&sql, &args, None).await?;
        Ok(rows
            .into_iter()
            .map(|row| Record::from_row(Arc::clone(&self.schema), row))
            .collect())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert the record, filling absent fields from their defaults.
    ///
    /// Resolved defaults are written back, so the record afterwards holds
    /// exactly what was inserted (including a generated primary key).
    pub async fn save(&self, record: &mut Record) -> DbResult<u64> {
        let args = self.insert_args(record)?;
        let affected = self
            .executor
            .execute_typed(self.schema.insert_sql(), &args, &self.column_kinds())
            .await?;
        self.check_affected("insert", affected);
        Ok(affected)
    }

    /// Update every ordinary field from the record's current values.
    pub async fn update(&self, record: &Record) -> DbResult<u64> {
        let args = self.update_args(record)?;
        let affected = self
            .executor
            .execute_typed(self.schema.update_sql(), &args, &self.column_kinds())
            .await?;
        self.check_affected("update by primary key", affected);
        Ok(affected)
    }

    /// Delete the row with the record's primary key.
    pub async fn remove(&self, record: &Record) -> DbResult<u64> {
        let args = self.delete_args(record)?;
        let affected = self
            .executor
            .execute_typed(self.schema.delete_sql(), &args, &[self.key_kind()])
            .await?;
        self.check_affected("remove by primary key", affected);
        Ok(affected)
    }

    /// [`Model::save`] inside an open transaction.
    pub async fn save_in(&self, tx: &mut Transaction, record: &mut Record) -> DbResult<u64> {
        let args = self.insert_args(record)?;
        let affected = tx
            .execute_typed(self.schema.insert_sql(), &args, &self.column_kinds())
            .await?;
        self.check_affected("insert", affected);
        Ok(affected)
    }

    /// [`Model::update`] inside an open transaction.
    pub async fn update_in(&self, tx: &mut Transaction, record: &Record) -> DbResult<u64> {
        let args = self.update_args(record)?;
        let affected = tx
            .execute_typed(self.schema.update_sql(), &args, &self.column_kinds())
            .await?;
        self.check_affected("update by primary key", affected);
        Ok(affected)
    }

    /// [`Model::remove`] inside an open transaction.
    pub async fn remove_in(&self, tx: &mut Transaction, record: &Record) -> DbResult<u64> {
        let args = self.delete_args(record)?;
        let affected = tx
            .execute_typed(self.schema.delete_sql(), &args, &[self.key_kind()])
            .await?;
        self.check_affected("remove by primary key", affected);
        Ok(affected)
    }

    fn insert_args(&self, record: &mut Record) -> DbResult<Vec<Value>> {
        self.check_schema(record)?;
        let columns: Vec<String> = self.schema.columns().map(str::to_string).collect();
        Ok(columns
            .iter()
            .map(|column| record.value_or_default(column))
            .collect())
    }

    fn update_args(&self, record: &Record) -> DbResult<Vec<Value>> {
        self.check_schema(record)?;
        if self.schema.fields().is_empty() {
            return Err(DbError::invalid_input(format!(
                "{} has no fields to update besides its primary key",
                self.schema.name()
            )));
        }
        let pk = self.require_primary_key(record)?;
        let mut args: Vec<Value> = self
            .schema
            .fields()
            .iter()
            .map(|field| record.value(field))
            .collect();
        args.push(pk);
        Ok(args)
    }

    fn delete_args(&self, record: &Record) -> DbResult<Vec<Value>> {
        self.check_schema(record)?;
        Ok(vec![self.require_primary_key(record)?])
    }

    /// Kind of every template column, in [`Schema::columns`] order.
    fn column_kinds(&self) -> Vec<FieldKind> {
        self.schema
            .columns()
            .filter_map(|column| self.schema.field(column))
            .map(Field::kind)
            .collect()
    }

    fn key_kind(&self) -> FieldKind {
        self.schema.primary_key_field().kind()
    }

    fn check_schema(&self, record: &Record) -> DbResult<()> {
        if record.schema().name() != self.schema.name() {
            return Err(DbError::invalid_input(format!(
                "record of type {} cannot be stored through the {} model",
                record.schema().name(),
                self.schema.name()
            )));
        }
        Ok(())
    }

    fn require_primary_key(&self, record: &Record) -> DbResult<Value> {
        record.primary_key().cloned().ok_or_else(|| {
            DbError::invalid_input(format!(
                "{} record has no value for primary key {}",
                self.schema.name(),
                self.schema.primary_key()
            ))
        })
    }

    fn check_affected(&self, operation: &str, affected: u64) {
        if affected != 1 {
            warn!(
                table = %self.schema.table(),
                affected,
                "failed to {} record: affected rows: {}",
                operation,
                affected
            );
        }
    }
}
