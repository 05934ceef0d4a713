//! Queries against the `people` table of the partition currently on the
//! connection's search path.

use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use crate::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub name: String,
}

impl From<(i32, String)> for Person {
    fn from((id, name): (i32, String)) -> Self {
        Self { id, name }
    }
}

pub async fn list(conn: &mut PgConnection) -> Result<Vec<Person>, StoreError> {
    let rows = sqlx::query_as::<_, (i32, String)>("SELECT id, name FROM people ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(Person::from).collect())
}

pub async fn find(conn: &mut PgConnection, id: i32) -> Result<Option<Person>, StoreError> {
    let row = sqlx::query_as::<_, (i32, String)>("SELECT id, name FROM people WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Person::from))
}

/// Fails with a unique violation when `person.id` already exists.
pub async fn insert(conn: &mut PgConnection, person: &Person) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO people (id, name) VALUES ($1, $2)")
        .bind(person.id)
        .bind(&person.name)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn upsert(conn: &mut PgConnection, person: &Person) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO people (id, name) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
    )
    .bind(person.id)
    .bind(&person.name)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Returns the number of rows removed; deleting a missing id is not an error.
pub async fn delete(conn: &mut PgConnection, id: i32) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM people WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
