//! # Ledger Store Abstraction
//!
//! The single persistence seam of the service. Every mutating engine
//! operation reads through this trait and commits exactly one
//! [`LedgerStore::atomic_write`] — the roll upsert, the aggregate update,
//! the audit log append, and the optional idempotency marker either all
//! land or none do.
//!
//! ## Implementations
//!
//! - **PgStore**: production implementation on PostgreSQL; the atomic unit
//!   is a database transaction whose aggregate update is a compare-and-swap
//!   on the version token.
//! - **MemoryStore**: in-process implementation for dev/test, with failure
//!   injection so tests can prove no partial application.

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Aggregate, LogEntry, Roll};

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("Aggregate already exists for target: {0}")]
    AlreadyExists(Uuid),

    #[error("Concurrent modification of aggregate for target: {0}")]
    Conflict(Uuid),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// One record change inside an atomic write
///
/// Mutations are applied in order. `UpdateAggregate` must appear exactly
/// once per write: it is the compare-and-swap point that serializes
/// concurrent operations on the same target.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Replace the aggregate's totals (version check happens in the store)
    UpdateAggregate {
        total_grams: i64,
        remaining_grams: i64,
    },
    /// Insert or update a roll record
    UpsertRoll(Roll),
    /// Append one immutable audit record
    AppendLogEntry(LogEntry),
    /// Record a caller-supplied operation id for idempotent retries
    MarkOperationProcessed(Uuid),
}

/// Durable, queryable persistence for aggregates, rolls, and log entries
///
/// All reads return committed state only. `atomic_write` is the sole
/// mutating entry point besides `create_aggregate`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Register a fresh zero aggregate for a target
    async fn create_aggregate(
        &self,
        target_id: Uuid,
        notify_when_grams: i64,
    ) -> StoreResult<Aggregate>;

    /// Fetch a target's aggregate, including its version token
    async fn get_aggregate(&self, target_id: Uuid) -> StoreResult<Aggregate>;

    /// Fetch every aggregate (bulk read for low-stock scanning)
    async fn list_aggregates(&self) -> StoreResult<Vec<Aggregate>>;

    /// Fetch one roll belonging to a target
    async fn get_roll(&self, target_id: Uuid, roll_id: Uuid) -> StoreResult<Roll>;

    /// Fetch a target's rolls in creation order, ascending
    async fn list_rolls(&self, target_id: Uuid) -> StoreResult<Vec<Roll>>;

    /// Fetch a target's audit log in commit order, ascending
    async fn list_log_entries(&self, target_id: Uuid) -> StoreResult<Vec<LogEntry>>;

    /// Whether an operation id has already been committed
    async fn operation_seen(&self, operation_id: Uuid) -> StoreResult<bool>;

    /// Apply an ordered list of mutations as one all-or-nothing unit
    ///
    /// Fails with [`StoreError::Conflict`] when the aggregate's stored
    /// version differs from `expected_version` (a concurrent operation
    /// committed since the caller's read). A successful write bumps the
    /// aggregate version by one. On any failure nothing is applied.
    async fn atomic_write(
        &self,
        target_id: Uuid,
        expected_version: i64,
        mutations: Vec<Mutation>,
    ) -> StoreResult<()>;
}

impl std::fmt::Debug for dyn LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerStore")
    }
}
