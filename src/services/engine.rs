//! Ledger engine: the three mutating paper-stock operations and the read view
//!
//! Every mutating operation validates its input, reads fresh state, computes
//! the new aggregate under the core invariant
//! (`0 <= remaining_grams <= total_grams`), and commits exactly one atomic
//! write carrying the roll upsert, the aggregate update, one audit log
//! entry, and the optional idempotency marker. Version conflicts are benign
//! races and are retried with fresh reads up to a small bound; every other
//! failure is surfaced as-is with no partial application.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::models::{grams_to_kg, Aggregate, AggregateView, LogEntry, PaperAction, Roll};
use crate::store::{LedgerStore, Mutation, StoreError};
use crate::validation::{
    validate_addition, validate_correction_remainder, validate_usage_remainder, AmountError,
};

/// Bounded internal retries for optimistic-concurrency conflicts
const MAX_CONFLICT_ATTEMPTS: u32 = 3;

/// Errors that can occur during ledger engine operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("Target already registered: {0}")]
    AlreadyExists(Uuid),

    #[error("Operation already applied (duplicate operation id): {0}")]
    DuplicateOperation(Uuid),

    #[error("Concurrent modification retries exhausted for target: {0}")]
    Conflict(Uuid),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, id } => LedgerError::NotFound { kind, id },
            StoreError::AlreadyExists(id) => LedgerError::AlreadyExists(id),
            StoreError::Conflict(id) => LedgerError::Conflict(id),
            StoreError::Unavailable(detail) => LedgerError::Unavailable(detail),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// The ledger engine, generic over the persistence backend
#[derive(Clone)]
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Register a fresh target with a zero aggregate
    pub async fn create_target(
        &self,
        target_id: Uuid,
        notify_when_kg: f64,
    ) -> LedgerResult<Aggregate> {
        let notify_when_grams = crate::validation::kg_to_grams(notify_when_kg)?;
        if notify_when_grams < 0 {
            return Err(AmountError::NegativeRemainder(notify_when_kg).into());
        }

        let aggregate = self
            .store
            .create_aggregate(target_id, notify_when_grams)
            .await?;

        tracing::info!(
            target_id = %target_id,
            notify_when_grams = notify_when_grams,
            "Target registered"
        );

        Ok(aggregate)
    }

    /// Bail out early when a caller-supplied operation id was already applied
    async fn check_operation_id(&self, operation_id: Option<Uuid>) -> LedgerResult<()> {
        if let Some(operation_id) = operation_id {
            if self.store.operation_seen(operation_id).await? {
                return Err(LedgerError::DuplicateOperation(operation_id));
            }
        }
        Ok(())
    }

    /// Add a new physical roll to a target's stock
    ///
    /// `amount_kg` must be positive. Both `total` and `remaining` grow by
    /// the roll's weight and a `paper_in` entry is appended.
    pub async fn add_roll(
        &self,
        target_id: Uuid,
        user_id: &str,
        amount_kg: f64,
        operation_id: Option<Uuid>,
    ) -> LedgerResult<Aggregate> {
        let amount_grams = validate_addition(amount_kg)?;

        for attempt in 1..=MAX_CONFLICT_ATTEMPTS {
            self.check_operation_id(operation_id).await?;

            let aggregate = self.store.get_aggregate(target_id).await?;
            let now = Utc::now();

            let roll = Roll {
                id: Uuid::new_v4(),
                target_id,
                remaining_grams: amount_grams,
                created_at: now,
            };

            let new_total = aggregate.total_grams + amount_grams;
            let new_remaining = aggregate.remaining_grams + amount_grams;

            let entry = LogEntry {
                id: Uuid::new_v4(),
                target_id,
                action: PaperAction::PaperIn,
                amount_grams,
                roll_id: roll.id,
                remaining_after_grams: new_remaining,
                user_id: user_id.to_string(),
                details: None,
                logged_at: now,
            };

            let mut mutations = vec![
                Mutation::UpsertRoll(roll.clone()),
                Mutation::UpdateAggregate {
                    total_grams: new_total,
                    remaining_grams: new_remaining,
                },
                Mutation::AppendLogEntry(entry),
            ];
            if let Some(operation_id) = operation_id {
                mutations.push(Mutation::MarkOperationProcessed(operation_id));
            }

            match self
                .store
                .atomic_write(target_id, aggregate.version, mutations)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        target_id = %target_id,
                        roll_id = %roll.id,
                        amount_grams = amount_grams,
                        remaining_grams = new_remaining,
                        version = aggregate.version + 1,
                        "Roll added"
                    );
                    return Ok(Aggregate {
                        total_grams: new_total,
                        remaining_grams: new_remaining,
                        version: aggregate.version + 1,
                        updated_at: now,
                        ..aggregate
                    });
                }
                Err(StoreError::Conflict(_)) if attempt < MAX_CONFLICT_ATTEMPTS => {
                    tracing::warn!(
                        target_id = %target_id,
                        attempt = attempt,
                        "Version conflict adding roll, retrying with fresh state"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Conflict(target_id))
    }

    /// Record physical consumption: draw a roll down to `new_remaining_kg`
    ///
    /// Usage moves `remaining` only — consumption never changes how much
    /// paper was ever purchased, so `total` stays put. A `paper_out` entry
    /// records the amount used.
    pub async fn consume_from_roll(
        &self,
        target_id: Uuid,
        roll_id: Uuid,
        user_id: &str,
        new_remaining_kg: f64,
        operation_id: Option<Uuid>,
    ) -> LedgerResult<Aggregate> {
        for attempt in 1..=MAX_CONFLICT_ATTEMPTS {
            self.check_operation_id(operation_id).await?;

            let aggregate = self.store.get_aggregate(target_id).await?;
            let mut roll = self.store.get_roll(target_id, roll_id).await?;

            // Validated against the freshly read roll: usage can only draw
            // stock down
            let new_roll_grams = validate_usage_remainder(new_remaining_kg, roll.remaining_grams)?;
            let used_grams = roll.remaining_grams - new_roll_grams;
            roll.remaining_grams = new_roll_grams;

            let new_remaining = aggregate.remaining_grams - used_grams;
            let now = Utc::now();

            let entry = LogEntry {
                id: Uuid::new_v4(),
                target_id,
                action: PaperAction::PaperOut,
                amount_grams: used_grams,
                roll_id,
                remaining_after_grams: new_remaining,
                user_id: user_id.to_string(),
                details: None,
                logged_at: now,
            };

            let mut mutations = vec![
                Mutation::UpsertRoll(roll),
                Mutation::UpdateAggregate {
                    total_grams: aggregate.total_grams,
                    remaining_grams: new_remaining,
                },
                Mutation::AppendLogEntry(entry),
            ];
            if let Some(operation_id) = operation_id {
                mutations.push(Mutation::MarkOperationProcessed(operation_id));
            }

            match self
                .store
                .atomic_write(target_id, aggregate.version, mutations)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        target_id = %target_id,
                        roll_id = %roll_id,
                        used_grams = used_grams,
                        remaining_grams = new_remaining,
                        version = aggregate.version + 1,
                        "Consumption recorded"
                    );
                    return Ok(Aggregate {
                        remaining_grams: new_remaining,
                        version: aggregate.version + 1,
                        updated_at: now,
                        ..aggregate
                    });
                }
                Err(StoreError::Conflict(_)) if attempt < MAX_CONFLICT_ATTEMPTS => {
                    tracing::warn!(
                        target_id = %target_id,
                        roll_id = %roll_id,
                        attempt = attempt,
                        "Version conflict recording consumption, retrying with fresh state"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Conflict(target_id))
    }

    /// Correct a roll's recorded stock to `corrected_kg`
    ///
    /// A correction fixes a clerical error rather than recording real usage,
    /// so it retroactively changes how much paper was ever on the roll:
    /// `total` and `remaining` move together by the signed difference. The
    /// `fixing` entry carries the before/after values in `details`.
    pub async fn correct_roll(
        &self,
        target_id: Uuid,
        roll_id: Uuid,
        user_id: &str,
        corrected_kg: f64,
        operation_id: Option<Uuid>,
    ) -> LedgerResult<Aggregate> {
        let corrected_grams = validate_correction_remainder(corrected_kg)?;

        for attempt in 1..=MAX_CONFLICT_ATTEMPTS {
            self.check_operation_id(operation_id).await?;

            let aggregate = self.store.get_aggregate(target_id).await?;
            let mut roll = self.store.get_roll(target_id, roll_id).await?;

            let diff_grams = corrected_grams - roll.remaining_grams;
            let details = format!(
                "corrected from {} kg to {} kg",
                grams_to_kg(roll.remaining_grams),
                grams_to_kg(corrected_grams)
            );
            roll.remaining_grams = corrected_grams;

            let new_total = aggregate.total_grams + diff_grams;
            let new_remaining = aggregate.remaining_grams + diff_grams;
            let now = Utc::now();

            let entry = LogEntry {
                id: Uuid::new_v4(),
                target_id,
                action: PaperAction::Fixing,
                amount_grams: diff_grams.abs(),
                roll_id,
                remaining_after_grams: new_remaining,
                user_id: user_id.to_string(),
                details: Some(details),
                logged_at: now,
            };

            let mut mutations = vec![
                Mutation::UpsertRoll(roll),
                Mutation::UpdateAggregate {
                    total_grams: new_total,
                    remaining_grams: new_remaining,
                },
                Mutation::AppendLogEntry(entry),
            ];
            if let Some(operation_id) = operation_id {
                mutations.push(Mutation::MarkOperationProcessed(operation_id));
            }

            match self
                .store
                .atomic_write(target_id, aggregate.version, mutations)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        target_id = %target_id,
                        roll_id = %roll_id,
                        diff_grams = diff_grams,
                        total_grams = new_total,
                        remaining_grams = new_remaining,
                        version = aggregate.version + 1,
                        "Correction recorded"
                    );
                    return Ok(Aggregate {
                        total_grams: new_total,
                        remaining_grams: new_remaining,
                        version: aggregate.version + 1,
                        updated_at: now,
                        ..aggregate
                    });
                }
                Err(StoreError::Conflict(_)) if attempt < MAX_CONFLICT_ATTEMPTS => {
                    tracing::warn!(
                        target_id = %target_id,
                        roll_id = %roll_id,
                        attempt = attempt,
                        "Version conflict recording correction, retrying with fresh state"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Conflict(target_id))
    }

    /// Read-only view: aggregate plus full ordered roll and log lists
    pub async fn aggregate_view(&self, target_id: Uuid) -> LedgerResult<AggregateView> {
        let aggregate = self.store.get_aggregate(target_id).await?;
        let rolls = self.store.list_rolls(target_id).await?;
        let logs = self.store.list_log_entries(target_id).await?;

        Ok(AggregateView {
            aggregate,
            rolls,
            logs,
        })
    }
}
