//! The per-route business logic. Each unit reads and writes the partition on
//! the connection it is handed and never sees the transaction itself.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Json;
use axum::body::Bytes;
use axum::response::{IntoResponse, Response};
use sqlx::PgConnection;
use tenantry_store::{Person, StoreError, people};

#[derive(Debug, Default)]
pub struct UnitRequest {
    pub id: Option<String>,
    pub body: Bytes,
}

#[derive(Debug)]
pub enum UnitError {
    BadRequest(String),
    Conflict(String),
    Store(StoreError),
}

impl std::fmt::Display for UnitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitError::BadRequest(message) => write!(f, "bad request: {}", message),
            UnitError::Conflict(message) => write!(f, "conflict: {}", message),
            UnitError::Store(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for UnitError {}

impl From<StoreError> for UnitError {
    fn from(value: StoreError) -> Self {
        UnitError::Store(value)
    }
}

/// A business-logic unit: on success it returns the response to send once the
/// transaction has committed; on failure the dispatcher writes the response.
#[async_trait]
pub trait Unit: Send + Sync {
    async fn execute(
        &self,
        req: UnitRequest,
        conn: &mut PgConnection,
    ) -> Result<Response, UnitError>;
}

/// A unit paired with the label it is logged and measured under.
#[derive(Clone)]
pub struct LabelledUnit {
    pub label: &'static str,
    pub unit: Arc<dyn Unit>,
}

impl LabelledUnit {
    pub fn new<U: Unit + 'static>(label: &'static str, unit: U) -> Self {
        Self {
            label,
            unit: Arc::new(unit),
        }
    }
}

pub struct ListPeople;
pub struct GetPerson;
pub struct CreatePerson;
pub struct UpdatePerson;
pub struct DeletePerson;

#[async_trait]
impl Unit for ListPeople {
    async fn execute(
        &self,
        _req: UnitRequest,
        conn: &mut PgConnection,
    ) -> Result<Response, UnitError> {
        let all = people::list(conn).await?;
        Ok(Json(all).into_response())
    }
}

#[async_trait]
impl Unit for GetPerson {
    async fn execute(
        &self,
        req: UnitRequest,
        conn: &mut PgConnection,
    ) -> Result<Response, UnitError> {
        let id = parse_id(&req)?;
        let person = people::find(conn, id).await?.unwrap_or_default();
        Ok(Json(person).into_response())
    }
}

#[async_trait]
impl Unit for CreatePerson {
    async fn execute(
        &self,
        req: UnitRequest,
        conn: &mut PgConnection,
    ) -> Result<Response, UnitError> {
        let mut person = decode_person(&req.body);
        person.id = parse_id(&req)?;

        people::insert(conn, &person).await.map_err(|err| {
            if err.is_unique_violation() {
                UnitError::Conflict(format!("person {} already exists", person.id))
            } else {
                UnitError::Store(err)
            }
        })?;

        let all = people::list(conn).await?;
        Ok(Json(all).into_response())
    }
}

#[async_trait]
impl Unit for UpdatePerson {
    async fn execute(
        &self,
        req: UnitRequest,
        conn: &mut PgConnection,
    ) -> Result<Response, UnitError> {
        let mut person = decode_person(&req.body);
        person.id = parse_id(&req)?;

        people::upsert(conn, &person).await?;

        let all = people::list(conn).await?;
        Ok(Json(all).into_response())
    }
}

#[async_trait]
impl Unit for DeletePerson {
    async fn execute(
        &self,
        req: UnitRequest,
        conn: &mut PgConnection,
    ) -> Result<Response, UnitError> {
        let id = parse_id(&req)?;
        people::delete(conn, id).await?;

        let all = people::list(conn).await?;
        Ok(Json(all).into_response())
    }
}

fn parse_id(req: &UnitRequest) -> Result<i32, UnitError> {
    let raw = req
        .id
        .as_deref()
        .ok_or_else(|| UnitError::BadRequest("missing person id".to_string()))?;

    raw.parse::<i32>()
        .map_err(|_| UnitError::BadRequest(format!("person id `{}` is not an integer", raw)))
}

/// Absent or undecodable bodies yield the zero-value person.
fn decode_person(body: &Bytes) -> Person {
    if body.is_empty() {
        return Person::default();
    }

    match serde_json::from_slice::<Person>(body) {
        Ok(person) => person,
        Err(err) => {
            tracing::debug!(error = %err, "ignoring undecodable person body");
            Person::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: Option<&str>) -> UnitRequest {
        UnitRequest {
            id: id.map(str::to_string),
            body: Bytes::new(),
        }
    }

    #[test]
    fn parse_id_accepts_signed_integers() {
        assert_eq!(parse_id(&request(Some("5"))).unwrap(), 5);
        assert_eq!(parse_id(&request(Some("-7"))).unwrap(), -7);
    }

    #[test]
    fn parse_id_rejects_non_integers() {
        for raw in ["abc", "5.5", "", "99999999999"] {
            assert!(matches!(
                parse_id(&request(Some(raw))),
                Err(UnitError::BadRequest(_))
            ));
        }
        assert!(matches!(parse_id(&request(None)), Err(UnitError::BadRequest(_))));
    }

    #[test]
    fn decode_person_falls_back_to_zero_value() {
        assert_eq!(decode_person(&Bytes::new()), Person::default());
        assert_eq!(decode_person(&Bytes::from_static(b"{not json")), Person::default());
        assert_eq!(
            decode_person(&Bytes::from_static(br#"{"name":"Grace"}"#)),
            Person {
                id: 0,
                name: "Grace".to_string()
            }
        );
    }
}
