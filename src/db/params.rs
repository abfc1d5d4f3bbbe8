//! Argument binding.
//!
//! A single generic binder serves all three backends; the where-clause lists
//! the Rust types a backend must be able to encode for a [`Value`].

use crate::models::{FieldKind, Value};
use sqlx::query::Query;
use sqlx::{Database, Encode, Type};

pub(crate) type BackendQuery<'q, DB> = Query<'q, DB, <DB as Database>::Arguments<'q>>;

/// Bind every argument in order.
///
/// `kinds` gives the column kind of each argument by position, when known.
/// PostgreSQL infers a parameter's type from the bound value, so a NULL
/// destined for a `bigint` column has to be sent as an integer NULL. Missing
/// entries fall back to a text NULL, which MySQL and SQLite accept anywhere.
pub(crate) fn bind_values<'q, DB>(
    mut query: BackendQuery<'q, DB>,
    values: &'q [Value],
    kinds: &[FieldKind],
) -> BackendQuery<'q, DB>
where
    DB: Database,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    &'q str: Encode<'q, DB> + Type<DB>,
    Option<bool>: Encode<'q, DB>,
    Option<i64>: Encode<'q, DB>,
    Option<f64>: Encode<'q, DB>,
    Option<&'q str>: Encode<'q, DB>,
{
    for (i, value) in values.iter().enumerate() {
        query = match value {
            Value::Null => match kinds.get(i) {
                Some(FieldKind::Integer) => query.bind(None::<i64>),
                Some(FieldKind::Float) => query.bind(None::<f64>),
                Some(FieldKind::Boolean) => query.bind(None::<bool>),
                Some(FieldKind::String | FieldKind::Text) | None => query.bind(None::<&'q str>),
            },
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::String(v) => query.bind(v.as_str()),
        };
    }
    query
}
