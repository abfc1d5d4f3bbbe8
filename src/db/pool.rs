//! Connection pool management.
//!
//! This module provides connection pooling functionality using database-specific
//! pools (MySqlPool, PgPool, SqlitePool) to ensure full type support.
//!
//! A [`Pool`] is a cheap-to-clone handle with an explicit lifecycle:
//! `Uninitialized -> Active -> Destroyed`, and it may be created again after
//! being destroyed. The state lock is only held to read or swap the state,
//! never across a connect or acquire.

use crate::config::PoolConfig;
use crate::db::transaction::{DbTransaction, Transaction};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionInfo, DatabaseType};
use sqlx::pool::PoolConnection;
use sqlx::{
    MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool, mysql::MySqlConnectOptions,
    mysql::MySqlPoolOptions, postgres::PgConnectOptions, postgres::PgPoolOptions,
    sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{debug, info, warn};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Check out one connection, waiting in line when all are busy.
    pub(crate) async fn acquire(&self) -> Result<BackendConnection, sqlx::Error> {
        Ok(match self {
            DbPool::MySql(pool) => BackendConnection::MySql(pool.acquire().await?),
            DbPool::Postgres(pool) => BackendConnection::Postgres(pool.acquire().await?),
            DbPool::SQLite(pool) => BackendConnection::SQLite(pool.acquire().await?),
        })
    }

    fn status(&self) -> PoolStatus {
        let (size, idle, max_size) = match self {
            DbPool::MySql(p) => (p.size(), p.num_idle(), p.options().get_max_connections()),
            DbPool::Postgres(p) => (p.size(), p.num_idle(), p.options().get_max_connections()),
            DbPool::SQLite(p) => (p.size(), p.num_idle(), p.options().get_max_connections()),
        };
        PoolStatus::new(size, idle, max_size)
    }
}

/// Database-specific pooled connection.
#[derive(Debug)]
pub(crate) enum BackendConnection {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

/// A connection checked out of the pool.
///
/// Dropping it returns the connection to the pool, on every exit path.
#[derive(Debug)]
pub struct PooledConnection {
    // Dropped before the checkout, so the connection is back in the pool
    // by the time `destroy` sees the checkout returned.
    conn: BackendConnection,
    _checkout: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn db_type(&self) -> DatabaseType {
        match &self.conn {
            BackendConnection::MySql(_) => DatabaseType::MySQL,
            BackendConnection::Postgres(_) => DatabaseType::PostgreSQL,
            BackendConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub(crate) fn backend_mut(&mut self) -> &mut BackendConnection {
        &mut self.conn
    }

    /// Return the connection to the pool now rather than at end of scope.
    pub fn release(self) {
        debug!(db_type = %self.db_type(), "Releasing connection");
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStatus {
    /// Open connections, idle or in use.
    pub size: u32,
    pub idle: usize,
    pub max_size: u32,
}

impl PoolStatus {
    fn new(size: u32, idle: usize, max_size: u32) -> Self {
        Self {
            size,
            idle,
            max_size,
        }
    }

    /// Connections currently checked out.
    pub fn in_use(&self) -> u32 {
        let idle = u32::try_from(self.idle).unwrap_or(u32::MAX);
        self.size.saturating_sub(idle)
    }
}

/// Upper bound on simultaneous checkouts; far above any `maxsize`.
const CHECKOUT_PERMITS: u32 = u32::MAX >> 4;

/// Tracks connections and transactions handed out by one active pool.
///
/// Each checkout holds one permit. `drain` takes every permit, so it waits
/// for all outstanding checkouts and refuses new ones while waiting.
#[derive(Debug, Clone)]
struct Checkouts(Arc<Semaphore>);

impl Checkouts {
    fn new() -> Self {
        Self(Arc::new(Semaphore::new(CHECKOUT_PERMITS as usize)))
    }

    fn checkout(&self) -> DbResult<OwnedSemaphorePermit> {
        Arc::clone(&self.0)
            .try_acquire_owned()
            .map_err(|_| DbError::lifecycle("connection pool is being destroyed"))
    }

    fn outstanding(&self) -> usize {
        (CHECKOUT_PERMITS as usize).saturating_sub(self.0.available_permits())
    }

    async fn drain(&self) {
        let outstanding = self.outstanding();
        if outstanding > 0 {
            debug!(outstanding, "Waiting for checked-out connections");
        }
        // Only fails once closed, and nothing else closes it
        let _all = self.0.acquire_many(CHECKOUT_PERMITS).await;
        self.0.close();
    }
}

#[derive(Debug)]
struct ActivePool {
    pool: DbPool,
    config: PoolConfig,
    server_version: Option<String>,
    checkouts: Checkouts,
}

#[derive(Debug)]
enum PoolState {
    Uninitialized,
    Active(ActivePool),
    Destroyed,
}

impl PoolState {
    fn label(&self) -> &'static str {
        match self {
            PoolState::Uninitialized => "not created",
            PoolState::Active(_) => "active",
            PoolState::Destroyed => "destroyed",
        }
    }
}

/// Shared handle to the process connection pool.
#[derive(Debug, Clone)]
pub struct Pool {
    state: Arc<RwLock<PoolState>>,
}

impl Pool {
    /// Create an uninitialized pool handle.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(PoolState::Uninitialized)),
        }
    }

    /// Build a handle and create the pool in one step.
    pub async fn connect(config: PoolConfig) -> DbResult<Self> {
        let pool = Self::new();
        pool.create(config).await?;
        Ok(pool)
    }

    /// Open the pool. Fails if it is already active.
    pub async fn create(&self, config: PoolConfig) -> DbResult<ConnectionInfo> {
        config.validate()?;

        // Early check for an active pool
        {
            let state = self.state.read().await;
            if let PoolState::Active(_) = &*state {
                return Err(DbError::lifecycle("connection pool is already active"));
            }
        }

        info!(
            db_type = %config.db_type,
            target = %config.display_target(),
            minsize = config.minsize,
            maxsize = config.maxsize,
            "Creating database connection pool"
        );

        let pool = create_pool(&config).await?;
        let server_version = get_server_version(&pool).await;

        // Re-check after async work to prevent TOCTOU race
        let duplicate: Option<DbPool> = {
            let mut state = self.state.write().await;
            if let PoolState::Active(_) = &*state {
                Some(pool)
            } else {
                *state = PoolState::Active(ActivePool {
                    pool,
                    config: config.clone(),
                    server_version: server_version.clone(),
                    checkouts: Checkouts::new(),
                });
                None
            }
        }; // Lock released here

        if let Some(pool) = duplicate {
            pool.close().await;
            return Err(DbError::lifecycle(
                "connection pool was created concurrently",
            ));
        }

        info!(server_version = ?server_version, "Connection pool ready");

        Ok(ConnectionInfo {
            database_type: config.db_type,
            server_version,
            database: config.database,
            min_size: config.minsize,
            max_size: config.maxsize,
            autocommit: config.autocommit,
        })
    }

    /// Close the pool and wait for checked-out connections to come back.
    ///
    /// The pool is marked destroyed before closing, so acquires that start
    /// afterwards fail immediately with a lifecycle error.
    pub async fn destroy(&self) -> DbResult<()> {
        let active = {
            let mut state = self.state.write().await;
            match std::mem::replace(&mut *state, PoolState::Destroyed) {
                PoolState::Active(active) => active,
                other => {
                    let err = DbError::lifecycle(format!(
                        "cannot destroy a connection pool that is {}",
                        other.label()
                    ));
                    *state = other;
                    return Err(err);
                }
            }
        }; // Lock released here

        info!(db_type = %active.pool.db_type(), "Closing connection pool");
        tokio::join!(active.checkouts.drain(), active.pool.close());
        info!("Connection pool closed");
        Ok(())
    }

    /// Check out a connection.
    ///
    /// Waits in FIFO order while all `maxsize` connections are busy, for at
    /// most the configured acquire timeout.
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        let (pool, checkouts, timeout_secs) = self.checkout_source().await?;

        let conn = pool
            .acquire()
            .await
            .map_err(|e| acquire_error(e, timeout_secs))?;
        // A destroy that started while we waited refuses the checkout
        let checkout = checkouts.checkout()?;
        Ok(PooledConnection {
            conn,
            _checkout: checkout,
        })
    }

    /// Start a transaction on a freshly checked-out connection.
    pub async fn begin(&self) -> DbResult<Transaction> {
        let (pool, checkouts, timeout_secs) = self.checkout_source().await?;

        let inner = DbTransaction::begin(&pool)
            .await
            .map_err(|e| acquire_error(e, timeout_secs))?;
        let checkout = checkouts.checkout()?;
        Ok(Transaction::new(inner, checkout))
    }

    async fn checkout_source(&self) -> DbResult<(DbPool, Checkouts, u64)> {
        self.with_active(|a| {
            (
                a.pool.clone(),
                a.checkouts.clone(),
                a.config.acquire_timeout_secs,
            )
        })
        .await
    }

    /// Clone of the underlying sqlx pool.
    pub async fn inner(&self) -> DbResult<DbPool> {
        self.with_active(|a| a.pool.clone()).await
    }

    pub async fn db_type(&self) -> DbResult<DatabaseType> {
        self.with_active(|a| a.pool.db_type()).await
    }

    pub async fn server_version(&self) -> DbResult<Option<String>> {
        self.with_active(|a| a.server_version.clone()).await
    }

    /// Default autocommit mode for write statements.
    pub async fn autocommit(&self) -> DbResult<bool> {
        self.with_active(|a| a.config.autocommit).await
    }

    pub async fn config(&self) -> DbResult<PoolConfig> {
        self.with_active(|a| a.config.clone()).await
    }

    pub async fn status(&self) -> DbResult<PoolStatus> {
        self.with_active(|a| a.pool.status()).await
    }

    pub async fn is_active(&self) -> bool {
        matches!(&*self.state.read().await, PoolState::Active(_))
    }

    async fn with_active<T>(&self, f: impl FnOnce(&ActivePool) -> T) -> DbResult<T> {
        let state = self.state.read().await;
        match &*state {
            PoolState::Active(active) => Ok(f(active)),
            other => Err(DbError::lifecycle(format!(
                "connection pool is {}",
                other.label()
            ))),
        }
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

fn acquire_error(err: sqlx::Error, timeout_secs: u64) -> DbError {
    match err {
        sqlx::Error::PoolTimedOut => {
            warn!(timeout_secs, "Timed out waiting for a free connection");
            DbError::timeout("connection pool acquire", timeout_secs)
        }
        other => DbError::from(other),
    }
}

/// Create a connection pool for the given configuration.
async fn create_pool(config: &PoolConfig) -> DbResult<DbPool> {
    let acquire_timeout = config.acquire_timeout();
    let idle_timeout = Some(config.idle_timeout());

    match config.db_type {
        DatabaseType::MySQL => {
            let mut options = MySqlConnectOptions::new()
                .host(&config.host)
                .port(config.port_or_default())
                .username(&config.user)
                .database(&config.database)
                .charset(&config.charset);
            if !config.password.is_empty() {
                options = options.password(&config.password);
            }

            let pool = MySqlPoolOptions::new()
                .min_connections(config.minsize)
                .max_connections(config.maxsize)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .test_before_acquire(config.test_before_acquire)
                .connect_with(options)
                .await
                .map_err(|e| {
                    DbError::connection(
                        format!("Failed to connect: {}", e),
                        connection_suggestion(config.db_type, &e),
                    )
                })?;
            Ok(DbPool::MySql(pool))
        }
        DatabaseType::PostgreSQL => {
            let mut options = PgConnectOptions::new()
                .host(&config.host)
                .port(config.port_or_default())
                .username(&config.user)
                .database(&config.database);
            if !config.password.is_empty() {
                options = options.password(&config.password);
            }

            let pool = PgPoolOptions::new()
                .min_connections(config.minsize)
                .max_connections(config.maxsize)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .test_before_acquire(config.test_before_acquire)
                .connect_with(options)
                .await
                .map_err(|e| {
                    DbError::connection(
                        format!("Failed to connect: {}", e),
                        connection_suggestion(config.db_type, &e),
                    )
                })?;
            Ok(DbPool::Postgres(pool))
        }
        DatabaseType::SQLite => {
            let options = if config.database == ":memory:" {
                SqliteConnectOptions::from_str("sqlite::memory:")?
            } else {
                SqliteConnectOptions::new()
                    .filename(&config.database)
                    .create_if_missing(true)
            };

            let pool = SqlitePoolOptions::new()
                .min_connections(config.minsize)
                .max_connections(config.maxsize)
                .acquire_timeout(acquire_timeout)
                .idle_timeout(idle_timeout)
                .test_before_acquire(config.test_before_acquire)
                .connect_with(options)
                .await
                .map_err(|e| {
                    DbError::connection(
                        format!("Failed to connect: {}", e),
                        connection_suggestion(config.db_type, &e),
                    )
                })?;
            Ok(DbPool::SQLite(pool))
        }
    }
}

/// Get the server version from the connected database.
async fn get_server_version(pool: &DbPool) -> Option<String> {
    let result = match pool {
        DbPool::MySql(pool) => {
            sqlx::query_scalar::<_, String>("SELECT version()")
                .fetch_one(pool)
                .await
        }
        DbPool::Postgres(pool) => {
            sqlx::query_scalar::<_, String>("SELECT version()")
                .fetch_one(pool)
                .await
        }
        DbPool::SQLite(pool) => {
            sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
                .fetch_one(pool)
                .await
        }
    };

    match result {
        Ok(version) => {
            debug!(version = %version, "Got server version");
            Some(version)
        }
        Err(e) => {
            warn!(error = %e, "Failed to get server version");
            None
        }
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the user and password settings".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if matches!(error, sqlx::Error::PoolTimedOut) {
        return "The server did not accept a connection within the acquire timeout".to_string();
    }

    match db_type {
        DatabaseType::SQLite => {
            "Verify the database file path is accessible and its directory exists".to_string()
        }
        _ => format!(
            "Verify host, port and credentials (default port {})",
            db_type.default_port().unwrap_or_default()
        ),
    }
}
