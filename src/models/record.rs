//! In-memory record values.
//!
//! A [`Record`] is a plain mapping from field name to [`Value`] tied to the
//! [`Schema`] it belongs to. It holds no database state: reading it again
//! means running another query.

use crate::db::Row;
use crate::error::{DbError, DbResult};
use crate::models::{Schema, Value};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: BTreeMap<String, Value>,
}

impl Record {
    /// Empty record of the given type.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            values: BTreeMap::new(),
        }
    }

    /// Record built from key/value pairs.
    pub fn from_pairs<I, K, V>(schema: Arc<Schema>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            schema,
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Materialize a result row.
    pub fn from_row(schema: Arc<Schema>, row: Row) -> Self {
        Self {
            schema,
            values: row,
        }
    }

    /// Record built from any struct that serializes to a flat JSON object.
    pub fn from_typed<T: Serialize>(schema: Arc<Schema>, value: &T) -> DbResult<Self> {
        let json = serde_json::to_value(value)
            .map_err(|e| DbError::invalid_input(format!("cannot serialize record: {}", e)))?;
        let serde_json::Value::Object(map) = json else {
            return Err(DbError::invalid_input("record must serialize to an object"));
        };

        let mut values = BTreeMap::new();
        for (key, json) in map {
            values.insert(key, Value::try_from(json)?);
        }
        Ok(Self { schema, values })
    }

    /// Deserialize into a typed struct.
    pub fn to_typed<T: DeserializeOwned>(&self) -> DbResult<T> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| DbError::invalid_input(format!("cannot convert record: {}", e)))
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Current value, `None` when the key was never set.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Primary key value, if set and not null.
    pub fn primary_key(&self) -> Option<&Value> {
        self.get(self.schema.primary_key())
            .filter(|v| !v.is_null())
    }

    /// Current value, NULL when absent.
    pub fn value(&self, key: &str) -> Value {
        self.get(key).cloned().unwrap_or_default()
    }

    /// Current value, or the field's default when absent or NULL.
    ///
    /// A resolved default is stored back on the record, so a producer runs at
    /// most once and later reads see the same value.
    pub fn value_or_default(&mut self, key: &str) -> Value {
        if let Some(value) = self.get(key).filter(|v| !v.is_null()) {
            return value.clone();
        }

        let default = self
            .schema
            .field(key)
            .and_then(|field| field.resolve_default());
        match default {
            Some(value) => {
                debug!(field = %key, value = %value, "using default value");
                self.values.insert(key.to_string(), value.clone());
                value
            }
            None => Value::Null,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }
}

/// Records render as flat objects (e.g. for templates or JSON APIs).
impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.values.serialize(serializer)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name() == other.schema.name() && self.values == other.values
    }
}
