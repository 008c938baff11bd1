//! Paper ledger data model
//!
//! Amounts are stored in integer grams (minor units) so ledger arithmetic is
//! exact; the HTTP boundary converts to and from decimal kilograms.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Grams per kilogram — the minor-unit scale for all stored amounts.
pub const GRAMS_PER_KG: f64 = 1000.0;

/// Convert a stored gram amount back to kilograms for display.
pub fn grams_to_kg(grams: i64) -> f64 {
    grams as f64 / GRAMS_PER_KG
}

/// Audit action recorded with every committed ledger operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "paper_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaperAction {
    /// A new roll entered stock
    PaperIn,
    /// Physical consumption drawn from a roll
    PaperOut,
    /// Retroactive correction of a roll's recorded stock
    Fixing,
}

/// Per-target summary state
///
/// Core invariant: `0 <= remaining_grams <= total_grams`. The `version`
/// column is the optimistic-concurrency token; every committed write bumps
/// it by one and is conditioned on the value read at operation start.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Aggregate {
    pub target_id: Uuid,
    pub total_grams: i64,
    pub remaining_grams: i64,
    pub notify_when_grams: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Aggregate {
    /// Whether this target has fallen to or below its low-stock threshold
    pub fn is_low_stock(&self) -> bool {
        self.remaining_grams <= self.notify_when_grams
    }
}

/// An individual physical paper roll
///
/// Rolls are never deleted: a drained roll stays behind as a zero-stock
/// record so that its audit history keeps a valid referent.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Roll {
    pub id: Uuid,
    pub target_id: Uuid,
    pub remaining_grams: i64,
    pub created_at: DateTime<Utc>,
}

/// Immutable audit record for one committed ledger operation
///
/// `amount_grams` is always positive; the sign is implied by `action`.
/// `remaining_after_grams` snapshots the aggregate immediately after this
/// entry's commit.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct LogEntry {
    pub id: Uuid,
    pub target_id: Uuid,
    pub action: PaperAction,
    pub amount_grams: i64,
    pub roll_id: Uuid,
    pub remaining_after_grams: i64,
    pub user_id: String,
    pub details: Option<String>,
    pub logged_at: DateTime<Utc>,
}

/// Aggregate plus its full ordered detail for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateView {
    pub aggregate: Aggregate,
    pub rolls: Vec<Roll>,
    pub logs: Vec<LogEntry>,
}
