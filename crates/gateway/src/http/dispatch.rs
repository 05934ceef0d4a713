use std::time::Instant;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use sqlx::PgConnection;
use tenantry_auth::{AuthError, resolve_tenant};
use tenantry_store::{PartitionName, ScopeError, UnitOfWork, run_within};
use tracing::Instrument;

use super::units::{LabelledUnit, Unit, UnitError, UnitRequest};
use super::{AppState, REQUEST_ID_HEADER, extract_request_id, text_error};

struct BoundUnit<'a> {
    unit: &'a dyn Unit,
    request: UnitRequest,
}

#[async_trait]
impl<'a> UnitOfWork for BoundUnit<'a> {
    type Output = Response;
    type Error = UnitError;

    async fn run(self, conn: &mut PgConnection) -> Result<Response, UnitError> {
        self.unit.execute(self.request, conn).await
    }
}

/// Authenticates the request, resolves its partition and runs `unit` inside a
/// transaction on that partition.
pub async fn dispatch(
    state: &AppState,
    unit: &LabelledUnit,
    headers: &HeaderMap,
    request: UnitRequest,
) -> Response {
    let request_id = extract_request_id(headers);
    let span = tracing::info_span!(
        "unit.dispatch",
        unit = unit.label,
        request_id = %request_id,
        tenant = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );
    let started = Instant::now();

    let mut response = async {
        let partition = match authorize(state, headers) {
            Ok(partition) => partition,
            Err(err) => {
                tracing::Span::current().record("outcome", "unauthorized");
                tracing::info!(code = err.code, "request rejected before scope");
                return text_error(StatusCode::UNAUTHORIZED, err.code, err.message);
            }
        };

        tracing::Span::current().record("tenant", partition.as_str());
        tracing::info!("executing unit for tenant");

        let bound = BoundUnit {
            unit: unit.unit.as_ref(),
            request,
        };
        let result = run_within(&state.pool, partition, bound).await;

        match &result {
            Err(ScopeError::Begin(_)) => {}
            Err(ScopeError::Provision(_)) => crate::metrics::observe_provisioning("error"),
            _ => crate::metrics::observe_provisioning("ok"),
        }
        let outcome = match &result {
            Ok(_) => Some("committed"),
            Err(err) => err.outcome().map(|outcome| outcome.as_str()),
        };
        if let Some(outcome) = outcome {
            crate::metrics::observe_transaction(outcome);
            tracing::Span::current().record("outcome", outcome);
        }

        match result {
            Ok(response) => response,
            Err(err) => {
                if outcome.is_none() {
                    tracing::Span::current().record("outcome", "unavailable");
                }
                scope_error_response(err)
            }
        }
    }
    .instrument(span.clone())
    .await;

    let latency = started.elapsed();
    span.record("latency_ms", latency.as_millis() as u64);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    crate::metrics::observe_http_request(unit.label, response.status().as_u16(), latency);
    response
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<PartitionName, AuthError> {
    let claims = state.verifier.authenticate(headers)?;
    let tenant = resolve_tenant(&claims)?;

    PartitionName::parse(&tenant).map_err(|err| AuthError {
        code: "ERR_TENANT_INVALID",
        message: err.to_string(),
    })
}

fn scope_error_response(err: ScopeError<UnitError>) -> Response {
    match err {
        ScopeError::Begin(err) if err.is_unavailable() => {
            tracing::error!(error = %err, "database unavailable for transaction scope");
            text_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "ERR_DB_UNAVAILABLE",
                "database unavailable",
            )
        }
        ScopeError::Begin(err) => {
            tracing::error!(error = %err, "failed to open transaction scope");
            text_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERR_STORAGE",
                "failed to open transaction",
            )
        }
        ScopeError::Provision(err) => {
            tracing::error!(error = %err, "tenant partition provisioning failed");
            text_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERR_PROVISIONING_FAILED",
                "failed to provision tenant partition",
            )
        }
        ScopeError::Unit(UnitError::BadRequest(message)) => {
            text_error(StatusCode::BAD_REQUEST, "ERR_INVALID_PARAMS", message)
        }
        ScopeError::Unit(UnitError::Conflict(message)) => {
            text_error(StatusCode::CONFLICT, "ERR_CONFLICT", message)
        }
        ScopeError::Unit(UnitError::Store(err)) => {
            tracing::error!(error = %err, "unit storage operation failed");
            text_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERR_STORAGE",
                "storage operation failed",
            )
        }
        ScopeError::Commit(err) => {
            tracing::error!(error = %err, "transaction commit failed");
            text_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERR_COMMIT_FAILED",
                "failed to commit transaction",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use tenantry_store::StoreError;

    use super::*;

    #[test]
    fn begin_failures_split_on_pool_availability() {
        let timed_out = scope_error_response(ScopeError::Begin(StoreError::Timeout));
        assert_eq!(timed_out.status(), StatusCode::SERVICE_UNAVAILABLE);

        let pool_closed =
            scope_error_response(ScopeError::Begin(StoreError::Sqlx(sqlx::Error::PoolClosed)));
        assert_eq!(pool_closed.status(), StatusCode::SERVICE_UNAVAILABLE);

        let protocol = scope_error_response(ScopeError::Begin(StoreError::Sqlx(
            sqlx::Error::Protocol("unexpected message".to_string()),
        )));
        assert_eq!(protocol.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn provisioning_failure_is_internal_error() {
        let response = scope_error_response(ScopeError::Provision(StoreError::Sqlx(
            sqlx::Error::Protocol("ledger mismatch".to_string()),
        )));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
