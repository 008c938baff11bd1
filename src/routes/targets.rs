//! Target registration and aggregate-view endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{grams_to_kg, Aggregate, AggregateView, LogEntry, PaperAction, Roll};
use crate::routes::ApiError;
use crate::services::engine::LedgerEngine;

/// Request body for POST /api/ledger/targets
#[derive(Debug, Deserialize)]
pub struct CreateTargetRequest {
    /// Identity comes from the external client/catalogue registry
    pub target_id: Uuid,
    /// Low-stock threshold in kilograms (defaults to 0)
    #[serde(default)]
    pub notify_when_kg: f64,
}

/// Aggregate summary response
#[derive(Debug, Serialize)]
pub struct AggregateResponse {
    pub target_id: Uuid,
    pub total_kg: f64,
    pub remaining_kg: f64,
    pub notify_when_kg: f64,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<Aggregate> for AggregateResponse {
    fn from(a: Aggregate) -> Self {
        AggregateResponse {
            target_id: a.target_id,
            total_kg: grams_to_kg(a.total_grams),
            remaining_kg: grams_to_kg(a.remaining_grams),
            notify_when_kg: grams_to_kg(a.notify_when_grams),
            version: a.version,
            updated_at: a.updated_at,
        }
    }
}

/// Roll detail response
#[derive(Debug, Serialize)]
pub struct RollResponse {
    pub id: Uuid,
    pub remaining_kg: f64,
    pub created_at: DateTime<Utc>,
}

impl From<Roll> for RollResponse {
    fn from(r: Roll) -> Self {
        RollResponse {
            id: r.id,
            remaining_kg: grams_to_kg(r.remaining_grams),
            created_at: r.created_at,
        }
    }
}

/// Audit log entry response
#[derive(Debug, Serialize)]
pub struct LogEntryResponse {
    pub id: Uuid,
    pub action: PaperAction,
    pub amount_kg: f64,
    pub roll_id: Uuid,
    pub remaining_after_kg: f64,
    pub user_id: String,
    pub details: Option<String>,
    pub logged_at: DateTime<Utc>,
}

impl From<LogEntry> for LogEntryResponse {
    fn from(e: LogEntry) -> Self {
        LogEntryResponse {
            id: e.id,
            action: e.action,
            amount_kg: grams_to_kg(e.amount_grams),
            roll_id: e.roll_id,
            remaining_after_kg: grams_to_kg(e.remaining_after_grams),
            user_id: e.user_id,
            details: e.details,
            logged_at: e.logged_at,
        }
    }
}

/// Full target view response
#[derive(Debug, Serialize)]
pub struct AggregateViewResponse {
    pub aggregate: AggregateResponse,
    pub rolls: Vec<RollResponse>,
    pub logs: Vec<LogEntryResponse>,
}

impl From<AggregateView> for AggregateViewResponse {
    fn from(view: AggregateView) -> Self {
        AggregateViewResponse {
            aggregate: view.aggregate.into(),
            rolls: view.rolls.into_iter().map(Into::into).collect(),
            logs: view.logs.into_iter().map(Into::into).collect(),
        }
    }
}

/// Handler for POST /api/ledger/targets
pub async fn create_target(
    State(engine): State<LedgerEngine>,
    Json(req): Json<CreateTargetRequest>,
) -> Result<(StatusCode, Json<AggregateResponse>), ApiError> {
    let aggregate = engine
        .create_target(req.target_id, req.notify_when_kg)
        .await?;

    Ok((StatusCode::CREATED, Json(aggregate.into())))
}

/// Handler for GET /api/ledger/targets/{target_id}
pub async fn get_view(
    State(engine): State<LedgerEngine>,
    Path(target_id): Path<Uuid>,
) -> Result<Json<AggregateViewResponse>, ApiError> {
    let view = engine.aggregate_view(target_id).await?;
    Ok(Json(view.into()))
}
