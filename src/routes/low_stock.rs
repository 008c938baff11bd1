//! Low-stock report endpoint

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::models::grams_to_kg;
use crate::routes::ApiError;
use crate::services::engine::LedgerEngine;
use crate::services::low_stock::{report_low_stock, TracingChannel};

/// One low-stock row in kilograms
#[derive(Debug, Serialize)]
pub struct LowStockRow {
    pub target_id: Uuid,
    pub remaining_kg: f64,
    pub notify_when_kg: f64,
}

/// Low-stock report response
#[derive(Debug, Serialize)]
pub struct LowStockResponse {
    pub alerts: Vec<LowStockRow>,
}

/// Handler for GET /api/ledger/low-stock
///
/// On-demand trigger for the reporting adapter: scans every aggregate and
/// hands breached thresholds to the notification channel before returning
/// them to the caller.
pub async fn get_low_stock(
    State(engine): State<LedgerEngine>,
) -> Result<Json<LowStockResponse>, ApiError> {
    let alerts = report_low_stock(engine.store(), &TracingChannel)
        .await
        .map_err(|e| ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: format!("Failed to scan aggregates: {}", e),
        })?;

    Ok(Json(LowStockResponse {
        alerts: alerts
            .into_iter()
            .map(|a| LowStockRow {
                target_id: a.target_id,
                remaining_kg: grams_to_kg(a.remaining_grams),
                notify_when_kg: grams_to_kg(a.notify_when_grams),
            })
            .collect(),
    }))
}
