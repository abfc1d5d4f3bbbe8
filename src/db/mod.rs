//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool lifecycle
//! - Placeholder checking and dialect rewriting
//! - Statement execution with optional row limits
//! - Scoped transactions
//! - Row decoding into [`Value`]s

pub mod executor;
pub mod params;
pub mod placeholder;
pub mod pool;
pub mod transaction;
pub mod types;

use crate::models::Value;
use std::collections::BTreeMap;

/// A decoded result row, keyed by column name.
pub type Row = BTreeMap<String, Value>;

pub use executor::QueryExecutor;
pub use pool::{DbPool, Pool, PoolStatus, PooledConnection};
pub use transaction::Transaction;
