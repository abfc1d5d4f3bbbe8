//! Row decoding into [`Value`]s.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction

use crate::db::Row;
use crate::models::{DatabaseType, Value};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row as _, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    /// Anything decoded as text: varchar, text, dates, json, uuid.
    Text,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Checked first: "numeric" would otherwise look like a float
    if lower.contains("decimal") || lower.contains("numeric") {
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    TypeCategory::Text
}

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Binary columns surface as text; invalid UTF-8 is replaced.
fn bytes_to_value(bytes: Vec<u8>) -> Value {
    Value::String(String::from_utf8_lossy(&bytes).into_owned())
}

fn unsigned_to_value(v: u64) -> Value {
    i64::try_from(v)
        .map(Value::Int)
        .unwrap_or_else(|_| Value::String(v.to_string()))
}

// =============================================================================
// Row Decoding Trait
// =============================================================================

/// Trait for converting backend rows into [`Row`] maps.
pub trait RowToValues {
    fn to_values(&self) -> Row;
}

macro_rules! impl_row_to_values {
    ($row:ty, $db:expr, $decoder:ident) => {
        impl RowToValues for $row {
            fn to_values(&self) -> Row {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let category = categorize_type(col.type_info().name(), $db);
                        (col.name().to_string(), $decoder::decode_column(self, idx, category))
                    })
                    .collect()
            }
        }
    };
}

impl_row_to_values!(MySqlRow, DatabaseType::MySQL, mysql);
impl_row_to_values!(PgRow, DatabaseType::PostgreSQL, postgres);
impl_row_to_values!(SqliteRow, DatabaseType::SQLite, sqlite);

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Value {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Text => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Value {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(v) => v.map(|d| Value::String(d.0)).unwrap_or_default(),
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                Value::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Int(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return unsigned_to_value(v);
        }
        Value::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or_default()
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return Value::Float(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return Value::Float(v.into());
        }
        Value::Null
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(bytes_to_value)
            .unwrap_or_default()
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::String).unwrap_or_default();
        }
        // JSON and some collations only decode as bytes
        decode_binary(row, idx)
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Value {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Text => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> Value {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(v) => v.map(|d| Value::String(d.0)).unwrap_or_default(),
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                Value::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Value {
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return Value::Int(v);
        }
        Value::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> Value {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or_default()
    }

    fn decode_float(row: &PgRow, idx: usize) -> Value {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return Value::Float(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return Value::Float(v.into());
        }
        Value::Null
    }

    fn decode_binary(row: &PgRow, idx: usize) -> Value {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(bytes_to_value)
            .unwrap_or_default()
    }

    fn decode_text(row: &PgRow, idx: usize) -> Value {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or_default()
    }
}

mod sqlite {
    use super::*;

    /// SQLite columns are dynamically typed, so each decoder falls back to
    /// whatever storage class the value actually has.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> Value {
        let decoded = match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Text => decode_text(row, idx),
        };
        decoded.or_else(|| decode_any(row, idx)).unwrap_or_default()
    }

    fn decode_any(row: &SqliteRow, idx: usize) -> Option<Value> {
        decode_integer(row, idx)
            .or_else(|| decode_float(row, idx))
            .or_else(|| decode_text(row, idx))
            .or_else(|| decode_binary(row, idx))
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<i64>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Int).unwrap_or_default())
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Bool).unwrap_or_default())
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<f64>, _>(idx)
            .ok()
            .map(|v| v.map(Value::Float).unwrap_or_default())
    }

    fn decode_binary(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .map(|v| v.map(bytes_to_value).unwrap_or_default())
    }

    fn decode_text(row: &SqliteRow, idx: usize) -> Option<Value> {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .map(|v| v.map(Value::String).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_field_kinds() {
        // Column types generated by the field descriptors
        for db in [DatabaseType::MySQL, DatabaseType::PostgreSQL, DatabaseType::SQLite] {
            assert_eq!(categorize_type("VARCHAR", db), TypeCategory::Text);
            assert_eq!(categorize_type("BIGINT", db), TypeCategory::Integer);
            assert_eq!(categorize_type("BOOLEAN", db), TypeCategory::Boolean);
            assert_eq!(categorize_type("REAL", db), TypeCategory::Float);
            assert_eq!(categorize_type("TEXT", db), TypeCategory::Text);
        }
    }

    #[test]
    fn test_categorize_backend_names() {
        assert_eq!(
            categorize_type("INT8", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("FLOAT8", DatabaseType::PostgreSQL),
            TypeCategory::Float
        );
        assert_eq!(
            categorize_type("TINYINT UNSIGNED", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BYTEA", DatabaseType::PostgreSQL),
            TypeCategory::Binary
        );
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::MySQL),
            TypeCategory::Text
        );
    }

    #[test]
    fn test_categorize_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_unsigned_overflow_becomes_string() {
        assert_eq!(unsigned_to_value(42), Value::Int(42));
        assert_eq!(
            unsigned_to_value(u64::MAX),
            Value::String(u64::MAX.to_string())
        );
    }

    #[test]
    fn test_bytes_to_value() {
        assert_eq!(bytes_to_value(b"hello".to_vec()), Value::from("hello"));
        assert_eq!(
            bytes_to_value(vec![0x66, 0xFF]),
            Value::String("f\u{FFFD}".to_string())
        );
    }
}
