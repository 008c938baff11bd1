//! Roll mutation endpoints: add, consume (usage), correct

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::routes::targets::AggregateResponse;
use crate::routes::{extract_operation_id, extract_user_id, ApiError};
use crate::services::engine::LedgerEngine;

/// Request body for POST /api/ledger/targets/{target_id}/rolls
#[derive(Debug, Deserialize)]
pub struct AddRollRequest {
    pub amount_kg: f64,
}

/// Request body for the consume endpoint — the roll's new remainder after
/// real physical usage
#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    pub new_remaining_kg: f64,
}

/// Request body for the correct endpoint — the roll's remainder as it
/// should have been recorded
#[derive(Debug, Deserialize)]
pub struct CorrectRequest {
    pub corrected_kg: f64,
}

/// Handler for POST /api/ledger/targets/{target_id}/rolls
pub async fn add_roll(
    State(engine): State<LedgerEngine>,
    Path(target_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<AddRollRequest>,
) -> Result<(StatusCode, Json<AggregateResponse>), ApiError> {
    let user_id = extract_user_id(&headers);
    let operation_id = extract_operation_id(&headers)?;

    let aggregate = engine
        .add_roll(target_id, &user_id, req.amount_kg, operation_id)
        .await?;

    Ok((StatusCode::CREATED, Json(aggregate.into())))
}

/// Handler for POST /api/ledger/targets/{target_id}/rolls/{roll_id}/consume
pub async fn consume_from_roll(
    State(engine): State<LedgerEngine>,
    Path((target_id, roll_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    Json(req): Json<ConsumeRequest>,
) -> Result<Json<AggregateResponse>, ApiError> {
    let user_id = extract_user_id(&headers);
    let operation_id = extract_operation_id(&headers)?;

    let aggregate = engine
        .consume_from_roll(target_id, roll_id, &user_id, req.new_remaining_kg, operation_id)
        .await?;

    Ok(Json(aggregate.into()))
}

/// Handler for POST /api/ledger/targets/{target_id}/rolls/{roll_id}/correct
pub async fn correct_roll(
    State(engine): State<LedgerEngine>,
    Path((target_id, roll_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    Json(req): Json<CorrectRequest>,
) -> Result<Json<AggregateResponse>, ApiError> {
    let user_id = extract_user_id(&headers);
    let operation_id = extract_operation_id(&headers)?;

    let aggregate = engine
        .correct_roll(target_id, roll_id, &user_id, req.corrected_kg, operation_id)
        .await?;

    Ok(Json(aggregate.into()))
}
