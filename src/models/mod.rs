//! Data models for tinyorm.
//!
//! This module re-exports the declaration-side types: values, field
//! descriptors, schemas and records.

pub mod connection;
pub mod defaults;
pub mod field;
pub mod record;
pub mod schema;
pub mod value;

// Re-export commonly used types
pub use connection::{ConnectionInfo, DatabaseType};
pub use field::{Field, FieldDefault, FieldKind};
pub use record::Record;
pub use schema::{Registry, Schema, SchemaBuilder};
pub use value::Value;
