//! Find-all options: filter, ordering and limit.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Schema, Value};

/// Row window for `find_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// First `n` rows.
    Count(u64),
    /// `count` rows after skipping `offset`.
    Range { offset: u64, count: u64 },
}

impl Limit {
    /// SQL fragment and its arguments; offset comes first in both dialects.
    fn to_sql(self, db_type: DatabaseType) -> DbResult<(&'static str, Vec<Value>)> {
        match self {
            Limit::Count(count) => Ok(("LIMIT ?", vec![to_arg(count)?])),
            Limit::Range { offset, count } => {
                let fragment = match db_type {
                    DatabaseType::PostgreSQL => "OFFSET ? LIMIT ?",
                    DatabaseType::MySQL | DatabaseType::SQLite => "LIMIT ?, ?",
                };
                Ok((fragment, vec![to_arg(offset)?, to_arg(count)?]))
            }
        }
    }
}

fn to_arg(n: u64) -> DbResult<Value> {
    i64::try_from(n)
        .map(Value::Int)
        .map_err(|_| DbError::binding(format!("limit value out of range: {}", n)))
}

impl From<u64> for Limit {
    fn from(count: u64) -> Self {
        Limit::Count(count)
    }
}

impl From<(u64, u64)> for Limit {
    fn from((offset, count): (u64, u64)) -> Self {
        Limit::Range { offset, count }
    }
}

fn limit_part(value: &Value) -> DbResult<u64> {
    value
        .as_i64()
        .filter(|_| !matches!(value, Value::Bool(_)))
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| DbError::binding(format!("Invalid limit value: {}", value)))
}

impl TryFrom<&[Value]> for Limit {
    type Error = DbError;

    fn try_from(values: &[Value]) -> DbResult<Self> {
        match values {
            [count] => Ok(Limit::Count(limit_part(count)?)),
            [offset, count] => Ok(Limit::Range {
                offset: limit_part(offset)?,
                count: limit_part(count)?,
            }),
            _ => Err(DbError::binding(format!(
                "Invalid limit value: expected 1 or 2 values, got {}",
                values.len()
            ))),
        }
    }
}

impl TryFrom<serde_json::Value> for Limit {
    type Error = DbError;

    fn try_from(json: serde_json::Value) -> DbResult<Self> {
        match json {
            serde_json::Value::Array(items) => {
                let values = items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<DbResult<Vec<_>>>()?;
                Limit::try_from(values.as_slice())
            }
            serde_json::Value::Number(_) => {
                let value = Value::try_from(json)?;
                Ok(Limit::Count(limit_part(&value)?))
            }
            other => Err(DbError::binding(format!("Invalid limit value: {}", other))),
        }
    }
}

/// Options for `Model::find_all`.
///
/// ```
/// use tinyorm::orm::FindAll;
///
/// let query = FindAll::new()
///     .filter("`user_id`=?")
///     .arg("u-1")
///     .order_by("`created_at` desc")
///     .limit((10u64, 5u64));
/// assert_eq!(query.filter_args().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAll {
    filter: Option<String>,
    args: Vec<Value>,
    order_by: Option<String>,
    limit: Option<Limit>,
}

impl FindAll {
    pub fn new() -> Self {
        Self::default()
    }

    /// WHERE clause body, with `?` placeholders.
    pub fn filter(mut self, clause: impl Into<String>) -> Self {
        self.filter = Some(clause.into());
        self
    }

    /// Append one placeholder argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by = Some(clause.into());
        self
    }

    pub fn limit(mut self, limit: impl Into<Limit>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    /// Filter arguments given so far (limit arguments are added at build time).
    pub fn filter_args(&self) -> &[Value] {
        &self.args
    }

    /// Complete statement and argument list for `schema`.
    pub(crate) fn build(
        &self,
        schema: &Schema,
        db_type: DatabaseType,
    ) -> DbResult<(String, Vec<Value>)> {
        let mut sql = schema.select_sql().to_string();
        let mut args = self.args.clone();

        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        if let Some(order_by) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        if let Some(limit) = self.limit {
            let (fragment, limit_args) = limit.to_sql(db_type)?;
            sql.push(' ');
            sql.push_str(fragment);
            args.extend(limit_args);
        }
        Ok((sql, args))
    }
}
