use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use sqlx::PgPool;
use tenantry_auth::TokenVerifier;
use ulid::Ulid;

use crate::config::{GatewayConfig, StartupError};

mod dispatch;
pub mod units;

pub use self::dispatch::dispatch;
use self::units::{
    CreatePerson, DeletePerson, GetPerson, LabelledUnit, ListPeople, UnitRequest, UpdatePerson,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    verifier: TokenVerifier,
    pool: PgPool,
}

impl AppState {
    pub fn new(config: GatewayConfig, pool: PgPool) -> Result<Self, StartupError> {
        let verifier = TokenVerifier::new(config.jwt.clone()).map_err(|err| StartupError {
            code: err.code,
            message: err.message,
        })?;

        Ok(Self {
            config,
            verifier,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

type UnitFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

pub async fn router(config: GatewayConfig) -> Result<Router, StartupError> {
    let pool = tenantry_store::connect(&config.db_url, config.pool_settings())
        .await
        .map_err(|err| StartupError {
            code: "ERR_DB_UNAVAILABLE",
            message: format!("failed to initialize database pool: {}", err),
        })?;

    Ok(app(AppState::new(config, pool)?))
}

/// Builds the routes over an already constructed state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route(
            "/people",
            get(collection_handler(LabelledUnit::new("list_people", ListPeople))),
        )
        .route(
            "/person/{id}",
            get(item_handler(LabelledUnit::new("get_person", GetPerson)))
                .post(item_handler(LabelledUnit::new("create_person", CreatePerson)))
                .put(item_handler(LabelledUnit::new("update_person", UpdatePerson)))
                .delete(item_handler(LabelledUnit::new("delete_person", DeletePerson))),
        )
        .with_state(state)
}

fn collection_handler(
    unit: LabelledUnit,
) -> impl Fn(State<AppState>, HeaderMap) -> UnitFuture + Clone + Send + Sync + 'static {
    move |State(state): State<AppState>, headers: HeaderMap| {
        let unit = unit.clone();
        Box::pin(async move { dispatch(&state, &unit, &headers, UnitRequest::default()).await })
    }
}

fn item_handler(
    unit: LabelledUnit,
) -> impl Fn(State<AppState>, HeaderMap, Path<String>, Bytes) -> UnitFuture
+ Clone
+ Send
+ Sync
+ 'static {
    move |State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>, body: Bytes| {
        let unit = unit.clone();
        Box::pin(async move {
            let request = UnitRequest {
                id: Some(id),
                body,
            };
            dispatch(&state, &unit, &headers, request).await
        })
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadyzResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, bool>,
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();

    let database_ready = tokio::time::timeout(
        Duration::from_millis(state.config.db_acquire_timeout_ms.max(50)),
        tenantry_store::ping(&state.pool),
    )
    .await
    .is_ok_and(|res| res.is_ok());
    checks.insert("database", database_ready);

    let all_ready = checks.values().all(|ok| *ok);
    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyzResponse {
            status: if all_ready { "ready" } else { "not_ready" },
            checks,
        }),
    )
}

async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.config.metrics_require_auth
        && let Err(err) = state.verifier.authenticate(&headers)
    {
        return text_error(StatusCode::UNAUTHORIZED, err.code, err.message);
    }

    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Plain-text error body of the form `CODE: message`.
fn text_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, format!("{}: {}", code, message.into())).into_response()
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}
