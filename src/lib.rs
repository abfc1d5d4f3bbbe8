//! tinyorm library
//!
//! A lightweight asynchronous ORM over sqlx: declare record types with
//! [`Schema::builder`] and [`Field`] descriptors, open a [`Pool`], and run
//! CRUD operations through a [`Model`].
//!
//! ```no_run
//! use tinyorm::{Field, FindAll, Model, Pool, PoolConfig, QueryExecutor, Registry, Schema};
//! use tinyorm::models::defaults::{next_id, now_timestamp};
//!
//! # async fn run() -> tinyorm::DbResult<()> {
//! let mut registry = Registry::new();
//! let blog = registry.register(
//!     Schema::builder("Blog")
//!         .table("blogs")
//!         .field("id", Field::string().ddl("varchar(50)").primary_key().default_with(next_id))
//!         .field("name", Field::string().ddl("varchar(50)"))
//!         .field("created_at", Field::float().default_with(now_timestamp)),
//! )?;
//!
//! let pool = Pool::connect(PoolConfig::mysql("www-data", "www-data", "awesome")).await?;
//! let blogs = Model::new(blog, QueryExecutor::new(pool.clone()));
//!
//! let mut record = blogs.record().with("name", "Test Blog");
//! blogs.save(&mut record).await?;
//! let latest = blogs.find_all(FindAll::new().order_by("`created_at` desc").limit(5u64)).await?;
//! # drop(latest);
//! pool.destroy().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod orm;

pub use config::{Config, PoolConfig};
pub use db::{Pool, QueryExecutor, Row, Transaction};
pub use error::{DbError, DbResult};
pub use models::{Field, Record, Registry, Schema, Value};
pub use orm::{FindAll, Limit, Model};
