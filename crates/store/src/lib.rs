use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod migrations;
pub mod partition;
pub mod people;
pub mod scope;

pub use partition::{PartitionName, ensure_partition};
pub use people::Person;
pub use scope::{ScopeError, ScopeOutcome, TransactionScope, UnitOfWork, run_within};

#[derive(Debug)]
pub enum StoreError {
    InvalidPartitionName(String),
    Timeout,
    Sqlx(sqlx::Error),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Sqlx(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }

    /// True when the pool could not hand out a connection at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout
                | StoreError::Sqlx(
                    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
                )
        )
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::InvalidPartitionName(reason) => {
                write!(f, "invalid partition name: {}", reason)
            }
            StoreError::Timeout => write!(f, "store operation timed out"),
            StoreError::Sqlx(err) => write!(f, "store sql error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        StoreError::Sqlx(value)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout: Duration::from_secs(2),
        }
    }
}

impl PoolSettings {
    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
    }
}

/// Opens the shared pool and waits for the first connection.
pub async fn connect(db_url: &str, settings: PoolSettings) -> Result<PgPool, StoreError> {
    let pool = tokio::time::timeout(settings.acquire_timeout, settings.options().connect(db_url))
        .await
        .map_err(|_| StoreError::Timeout)??;
    Ok(pool)
}

/// Builds the pool without connecting; connections are opened on first acquire.
pub fn connect_lazy(db_url: &str, settings: PoolSettings) -> Result<PgPool, StoreError> {
    Ok(settings.options().connect_lazy(db_url)?)
}

pub async fn ping(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
