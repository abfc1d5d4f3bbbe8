//! Field descriptors.
//!
//! A `Field` describes one mapped column: its name, SQL type, whether it is
//! the primary key, and how a missing value is filled in on insert.

use crate::models::Value;
use std::fmt;
use std::sync::Arc;

/// Kind of a mapped column. Determines the default SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    Float,
    Text,
}

impl FieldKind {
    /// Default column DDL for this kind.
    pub fn default_sql_type(&self) -> &'static str {
        match self {
            Self::String => "varchar(255)",
            Self::Integer => "bigint",
            Self::Boolean => "boolean",
            Self::Float => "real",
            Self::Text => "text",
        }
    }

    /// Boolean and text columns are never keys.
    pub fn can_be_primary_key(&self) -> bool {
        !matches!(self, Self::Boolean | Self::Text)
    }

    fn display_name(&self) -> &'static str {
        match self {
            Self::String => "StringField",
            Self::Integer => "IntegerField",
            Self::Boolean => "BooleanField",
            Self::Float => "FloatField",
            Self::Text => "TextField",
        }
    }
}

/// Policy for filling a field that has no value at insert time.
#[derive(Clone, Default)]
pub enum FieldDefault {
    #[default]
    None,
    Static(Value),
    /// Invoked at most once per record; the result is cached on the record.
    Producer(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldDefault {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Resolve to a concrete value, running the producer if there is one.
    pub fn resolve(&self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Static(v) => Some(v.clone()),
            Self::Producer(f) => Some(f()),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Static(v) => f.debug_tuple("Static").field(v).finish(),
            Self::Producer(_) => write!(f, "Producer(<fn>)"),
        }
    }
}

/// Declaration of a single mapped column.
#[derive(Debug, Clone)]
pub struct Field {
    name: Option<String>,
    kind: FieldKind,
    sql_type: String,
    primary_key: bool,
    default: FieldDefault,
}

impl Field {
    fn of_kind(kind: FieldKind) -> Self {
        Self {
            name: None,
            kind,
            sql_type: kind.default_sql_type().to_string(),
            primary_key: false,
            default: FieldDefault::None,
        }
    }

    /// `varchar(255)` column unless overridden with [`Field::ddl`].
    pub fn string() -> Self {
        Self::of_kind(FieldKind::String)
    }

    /// `bigint` column.
    pub fn integer() -> Self {
        Self::of_kind(FieldKind::Integer)
    }

    /// `boolean` column.
    pub fn boolean() -> Self {
        Self::of_kind(FieldKind::Boolean)
    }

    /// `real` column, defaulting to `0.0`.
    pub fn float() -> Self {
        Self {
            default: FieldDefault::Static(Value::Float(0.0)),
            ..Self::of_kind(FieldKind::Float)
        }
    }

    /// `text` column.
    pub fn text() -> Self {
        Self::of_kind(FieldKind::Text)
    }

    /// Override the column name (defaults to the declaring attribute).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the column DDL, e.g. `varchar(50)`.
    pub fn ddl(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = sql_type.into();
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Static default used when the record has no value for this field.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = FieldDefault::Static(value.into());
        self
    }

    /// Default produced on demand, e.g. a fresh id or the current time.
    pub fn default_with<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = FieldDefault::Producer(Arc::new(producer));
        self
    }

    /// Remove any default, including the implicit `0.0` of float fields.
    pub fn no_default(mut self) -> Self {
        self.default = FieldDefault::None;
        self
    }

    pub fn column_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn sql_type(&self) -> &str {
        &self.sql_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn default_policy(&self) -> &FieldDefault {
        &self.default
    }

    /// Value used when the record has none for this field.
    pub fn resolve_default(&self) -> Option<Value> {
        self.default.resolve()
    }

    /// Fill in the declaring attribute name when no explicit name was given.
    pub(crate) fn resolved(mut self, attr: &str) -> Self {
        if self.name.is_none() {
            self.name = Some(attr.to_string());
        }
        self
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}, {}:{}>",
            self.kind.display_name(),
            self.sql_type,
            self.name.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_sql_types() {
        assert_eq!(Field::string().sql_type(), "varchar(255)");
        assert_eq!(Field::integer().sql_type(), "bigint");
        assert_eq!(Field::boolean().sql_type(), "boolean");
        assert_eq!(Field::float().sql_type(), "real");
        assert_eq!(Field::text().sql_type(), "text");
        assert_eq!(Field::string().ddl("varchar(50)").sql_type(), "varchar(50)");
    }

    #[test]
    fn test_display() {
        let field = Field::string().ddl("varchar(50)").resolved("email");
        assert_eq!(field.to_string(), "<StringField, varchar(50):email>");

        let field = Field::float().name("created").resolved("created_at");
        assert_eq!(field.to_string(), "<FloatField, real:created>");
    }

    #[test]
    fn test_float_defaults_to_zero() {
        assert_eq!(Field::float().resolve_default(), Some(Value::Float(0.0)));
        assert_eq!(Field::float().no_default().resolve_default(), None);
        assert_eq!(Field::string().resolve_default(), None);
    }

    #[test]
    fn test_producer_runs_on_each_resolve() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let field = Field::integer().default_with(move || {
            Value::Int(counter.fetch_add(1, Ordering::SeqCst) as i64)
        });

        assert_eq!(field.resolve_default(), Some(Value::Int(0)));
        assert_eq!(field.resolve_default(), Some(Value::Int(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_primary_key_eligibility() {
        assert!(FieldKind::String.can_be_primary_key());
        assert!(FieldKind::Integer.can_be_primary_key());
        assert!(!FieldKind::Boolean.can_be_primary_key());
        assert!(!FieldKind::Text.can_be_primary_key());
    }
}
