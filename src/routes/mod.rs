//! HTTP adapter over the ledger engine
//!
//! Thin translation layer only: requests carry decimal kilograms, the
//! optional `Idempotency-Key` header (a UUID) supplies the operation id,
//! and `X-User-Id` supplies audit attribution. All accounting decisions
//! happen in the engine.

pub mod low_stock;
pub mod rolls;
pub mod targets;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::health::health;
use crate::services::engine::{LedgerEngine, LedgerError};

/// Error payload returned by every failing endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// HTTP-mapped engine error
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = match &e {
            LedgerError::InvalidAmount(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::AlreadyExists(_)
            | LedgerError::DuplicateOperation(_)
            | LedgerError::Conflict(_) => StatusCode::CONFLICT,
            LedgerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        ApiError {
            status,
            message: e.to_string(),
        }
    }
}

/// Pull the opaque acting-principal id from `X-User-Id`
///
/// The identity provider is external; the id is attribution only and is
/// not authenticated here.
pub(crate) fn extract_user_id(headers: &HeaderMap) -> String {
    headers
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

/// Parse the optional `Idempotency-Key` header into an operation id
pub(crate) fn extract_operation_id(headers: &HeaderMap) -> Result<Option<Uuid>, ApiError> {
    match headers.get("Idempotency-Key") {
        None => Ok(None),
        Some(value) => {
            let raw = value.to_str().map_err(|_| ApiError {
                status: StatusCode::BAD_REQUEST,
                message: "Idempotency-Key must be a UUID".to_string(),
            })?;
            let id = Uuid::parse_str(raw).map_err(|_| ApiError {
                status: StatusCode::BAD_REQUEST,
                message: "Idempotency-Key must be a UUID".to_string(),
            })?;
            Ok(Some(id))
        }
    }
}

/// Build the application router over a ledger engine
pub fn router(engine: LedgerEngine) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/ledger/targets", post(targets::create_target))
        .route("/api/ledger/targets/{target_id}", get(targets::get_view))
        .route(
            "/api/ledger/targets/{target_id}/rolls",
            post(rolls::add_roll),
        )
        .route(
            "/api/ledger/targets/{target_id}/rolls/{roll_id}/consume",
            post(rolls::consume_from_roll),
        )
        .route(
            "/api/ledger/targets/{target_id}/rolls/{roll_id}/correct",
            post(rolls::correct_roll),
        )
        .route("/api/ledger/low-stock", get(low_stock::get_low_stock))
        .with_state(engine)
}
