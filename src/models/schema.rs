//! Schema derivation and registry.
//!
//! A [`Schema`] is derived once from a declarative field list and carries the
//! four canonical statements used by the record runtime. Derivation fails fast
//! on malformed declarations so problems surface at startup, not at query time.

use crate::error::{DbError, DbResult};
use crate::models::Field;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Immutable mapping between a record type and its table.
#[derive(Debug)]
pub struct Schema {
    name: String,
    table: String,
    primary_key: String,
    fields: Vec<String>,
    mappings: HashMap<String, Field>,
    select_sql: String,
    insert_sql: String,
    update_sql: String,
    delete_sql: String,
}

impl Schema {
    /// Start declaring a record type. The table name defaults to `name`.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            table: None,
            fields: Vec::new(),
        }
    }

    /// Record type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Non-key fields in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.mappings.get(name)
    }

    /// The primary key descriptor.
    pub fn primary_key_field(&self) -> &Field {
        // Every schema is built with its key present in `mappings`.
        &self.mappings[&self.primary_key]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mappings.contains_key(name)
    }

    /// Ordinary fields followed by the primary key; the column order of every template.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.primary_key.as_str()))
    }

    pub fn select_sql(&self) -> &str {
        &self.select_sql
    }

    pub fn insert_sql(&self) -> &str {
        &self.insert_sql
    }

    pub fn update_sql(&self) -> &str {
        &self.update_sql
    }

    pub fn delete_sql(&self) -> &str {
        &self.delete_sql
    }
}

/// Declarative definition of a record type.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    table: Option<String>,
    fields: Vec<(String, Field)>,
}

impl SchemaBuilder {
    /// Explicit table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Declare a field. Order matters: it is the column order of the generated SQL.
    pub fn field(mut self, attr: impl Into<String>, field: Field) -> Self {
        self.fields.push((attr.into(), field));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Derive the schema and its SQL templates.
    pub fn build(self) -> DbResult<Schema> {
        let table = self.table.unwrap_or_else(|| self.name.clone());
        if table.is_empty() || table.contains('`') {
            return Err(DbError::definition(
                format!("Invalid table name: '{}'", table),
                &self.name,
            ));
        }

        let mut mappings = HashMap::with_capacity(self.fields.len());
        let mut fields = Vec::new();
        let mut primary_key: Option<String> = None;

        for (attr, field) in self.fields {
            let field = field.resolved(&attr);
            let name = field.column_name().unwrap_or(&attr).to_string();
            if name.is_empty() || name.contains('`') {
                return Err(DbError::definition(
                    format!("Invalid field name: '{}'", name),
                    &self.name,
                ));
            }
            if mappings.contains_key(&name) {
                return Err(DbError::definition(
                    format!("Duplicate field: {}", name),
                    &self.name,
                ));
            }

            if field.is_primary_key() {
                if !field.kind().can_be_primary_key() {
                    return Err(DbError::definition(
                        format!("Field {} cannot be a primary key", field),
                        &self.name,
                    ));
                }
                if primary_key.is_some() {
                    return Err(DbError::definition(
                        format!("Duplicate primary key for field: {}", name),
                        &self.name,
                    ));
                }
                primary_key = Some(name.clone());
            } else {
                fields.push(name.clone());
            }
            mappings.insert(name, field);
        }

        let primary_key =
            primary_key.ok_or_else(|| DbError::definition("Primary key not found", &self.name))?;

        let escaped_fields: Vec<String> = fields.iter().map(|f| quote(f)).collect();
        let all_fields = escaped_fields
            .iter()
            .cloned()
            .chain(std::iter::once(quote(&primary_key)))
            .collect::<Vec<_>>()
            .join(",");
        let update_fields = escaped_fields
            .iter()
            .map(|f| format!("{}=?", f))
            .collect::<Vec<_>>()
            .join(",");

        let select_sql = format!("SELECT {} FROM {}", all_fields, quote(&table));
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&table),
            all_fields,
            placeholders(fields.len() + 1)
        );
        let update_sql = format!(
            "UPDATE {} SET {} WHERE {}=?",
            quote(&table),
            update_fields,
            quote(&primary_key)
        );
        let delete_sql = format!(
            "DELETE FROM {} WHERE {}=?",
            quote(&table),
            quote(&primary_key)
        );

        Ok(Schema {
            name: self.name,
            table,
            primary_key,
            fields,
            mappings,
            select_sql,
            insert_sql,
            update_sql,
            delete_sql,
        })
    }
}

/// Backtick-quote an identifier.
pub(crate) fn quote(ident: &str) -> String {
    format!("`{}`", ident)
}

/// `n` comma-separated `?` placeholders.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

/// Registered schemas, keyed by record type name.
///
/// Built at startup and then shared read-only; registering the same name twice
/// returns the schema derived the first time.
#[derive(Debug, Default)]
pub struct Registry {
    schemas: HashMap<String, Arc<Schema>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive and cache a schema, or return the cached one.
    pub fn register(&mut self, builder: SchemaBuilder) -> DbResult<Arc<Schema>> {
        if let Some(schema) = self.schemas.get(builder.name()) {
            return Ok(Arc::clone(schema));
        }

        let schema = Arc::new(builder.build()?);
        info!(
            model = %schema.name(),
            table = %schema.table(),
            primary_key = %schema.primary_key(),
            "Found model"
        );
        for column in schema.columns() {
            if let Some(field) = schema.field(column) {
                debug!(model = %schema.name(), "  found mapping: {} ==> {}", column, field);
            }
        }

        self.schemas
            .insert(schema.name().to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
