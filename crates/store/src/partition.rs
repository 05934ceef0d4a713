use sqlx::PgConnection;

use crate::StoreError;
use crate::migrations;

/// A tenant identifier that is safe to splice into DDL as a quoted identifier.
///
/// Only `[A-Za-z0-9_]` is accepted, up to PostgreSQL's 63 byte identifier
/// limit, and names that collide with system or shared schemas are refused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionName(String);

impl PartitionName {
    pub const MAX_LEN: usize = 63;

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        if raw.is_empty() {
            return Err(StoreError::InvalidPartitionName(
                "tenant identifier is empty".to_string(),
            ));
        }

        if raw.len() > Self::MAX_LEN {
            return Err(StoreError::InvalidPartitionName(format!(
                "tenant identifier exceeds {} bytes",
                Self::MAX_LEN
            )));
        }

        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            return Err(StoreError::InvalidPartitionName(
                "tenant identifier may only contain ASCII letters, digits and underscores"
                    .to_string(),
            ));
        }

        let lowered = raw.to_ascii_lowercase();
        if lowered.starts_with("pg_") || lowered == "public" || lowered == "information_schema" {
            return Err(StoreError::InvalidPartitionName(format!(
                "tenant identifier `{}` is reserved",
                raw
            )));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl std::fmt::Display for PartitionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates the tenant schema if needed, points the transaction's search path at
/// it and brings its tables up to date.
///
/// `conn` must be inside an open transaction: the lock and the search path are
/// both released when that transaction ends.
pub async fn ensure_partition(
    conn: &mut PgConnection,
    partition: &PartitionName,
) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("tenantry:partition:{}", partition.as_str()))
        .execute(&mut *conn)
        .await?;

    let create_schema = format!("CREATE SCHEMA IF NOT EXISTS {}", partition.quoted());
    sqlx::query(&create_schema).execute(&mut *conn).await?;

    sqlx::query("SELECT set_config('search_path', $1, true)")
        .bind(partition.quoted())
        .execute(&mut *conn)
        .await?;

    let applied = migrations::migrate(conn).await?;
    if applied > 0 {
        tracing::info!(
            partition = %partition,
            applied,
            "partition migrations applied"
        );
    }

    Ok(())
}
