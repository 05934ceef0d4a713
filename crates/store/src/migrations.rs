use sqlx::PgConnection;

use crate::StoreError;

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Ordered by version; each entry runs at most once per partition.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "create people",
    sql: include_str!("../migrations/0001_create_people.sql"),
}];

const CREATE_LEDGER: &str = "CREATE TABLE IF NOT EXISTS tenantry_schema_migrations (\
    version BIGINT PRIMARY KEY, \
    description TEXT NOT NULL, \
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now())";

/// Applies pending migrations to whichever schema heads the connection's
/// search path. Returns how many were applied.
pub async fn migrate(conn: &mut PgConnection) -> Result<usize, StoreError> {
    sqlx::query(CREATE_LEDGER).execute(&mut *conn).await?;

    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM tenantry_schema_migrations")
        .fetch_all(&mut *conn)
        .await?;

    let mut count = 0;
    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(migration.sql)).await?;
        sqlx::query(
            "INSERT INTO tenantry_schema_migrations (version, description) VALUES ($1, $2)",
        )
        .bind(migration.version)
        .bind(migration.description)
        .execute(&mut *conn)
        .await?;
        count += 1;
    }

    Ok(count)
}
