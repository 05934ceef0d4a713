use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::StoreError;
use crate::partition::{PartitionName, ensure_partition};

/// Work executed against a partition-scoped connection.
///
/// Returning `Err` is the only rollback signal.
#[async_trait]
pub trait UnitOfWork: Send {
    type Output: Send;
    type Error: Send;

    async fn run(self, conn: &mut PgConnection) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOutcome {
    Committed,
    RolledBack,
}

impl ScopeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeOutcome::Committed => "committed",
            ScopeOutcome::RolledBack => "rolled_back",
        }
    }
}

#[derive(Debug)]
pub enum ScopeError<E> {
    Begin(StoreError),
    Provision(StoreError),
    Unit(E),
    Commit(StoreError),
}

impl<E> ScopeError<E> {
    /// Every failure except a failed begin leaves the scope rolled back.
    pub fn outcome(&self) -> Option<ScopeOutcome> {
        match self {
            ScopeError::Begin(_) => None,
            _ => Some(ScopeOutcome::RolledBack),
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for ScopeError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeError::Begin(err) => write!(f, "failed to begin transaction: {}", err),
            ScopeError::Provision(err) => write!(f, "failed to provision partition: {}", err),
            ScopeError::Unit(err) => write!(f, "unit of work failed: {}", err),
            ScopeError::Commit(err) => write!(f, "failed to commit transaction: {}", err),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for ScopeError<E> {}

/// One transaction bound to one partition. `commit` and `rollback` consume the
/// scope; dropping an active scope rolls it back.
pub struct TransactionScope {
    tx: Transaction<'static, Postgres>,
    partition: PartitionName,
}

impl TransactionScope {
    pub async fn begin(pool: &PgPool, partition: PartitionName) -> Result<Self, StoreError> {
        let tx = pool.begin().await?;
        Ok(Self { tx, partition })
    }

    pub fn partition(&self) -> &PartitionName {
        &self.partition
    }

    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    pub async fn provision(&mut self) -> Result<(), StoreError> {
        ensure_partition(&mut self.tx, &self.partition).await
    }

    pub async fn commit(self) -> Result<ScopeOutcome, StoreError> {
        self.tx.commit().await?;
        Ok(ScopeOutcome::Committed)
    }

    pub async fn rollback(self) -> Result<ScopeOutcome, StoreError> {
        self.tx.rollback().await?;
        Ok(ScopeOutcome::RolledBack)
    }

    async fn rollback_logged(self) {
        let partition = self.partition().clone();
        if let Err(err) = self.rollback().await {
            // The connection is discarded by the pool, which aborts the transaction server-side.
            tracing::warn!(partition = %partition, error = %err, "transaction rollback failed");
        }
    }
}

/// Runs `work` inside a fresh transaction on `partition`, provisioning the
/// partition first. Commits when `work` succeeds, rolls back otherwise.
pub async fn run_within<W: UnitOfWork>(
    pool: &PgPool,
    partition: PartitionName,
    work: W,
) -> Result<W::Output, ScopeError<W::Error>> {
    let mut scope = TransactionScope::begin(pool, partition)
        .await
        .map_err(ScopeError::Begin)?;

    if let Err(err) = scope.provision().await {
        scope.rollback_logged().await;
        return Err(ScopeError::Provision(err));
    }

    match work.run(scope.connection()).await {
        Ok(output) => {
            scope.commit().await.map_err(ScopeError::Commit)?;
            Ok(output)
        }
        Err(err) => {
            scope.rollback_logged().await;
            Err(ScopeError::Unit(err))
        }
    }
}
