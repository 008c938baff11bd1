//! PostgreSQL implementation of the LedgerStore trait
//!
//! The atomic unit is a database transaction. The aggregate update doubles
//! as the compare-and-swap: it is conditioned on the version token the
//! engine read, so two operations racing on one target can never both
//! commit against the same snapshot — the loser rolls back with `Conflict`.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Aggregate, LogEntry, Roll};
use crate::store::{LedgerStore, Mutation, StoreError, StoreResult};

/// LedgerStore implementation backed by PostgreSQL
///
/// Schema lives under `db/migrations/` and is applied at startup.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Apply the aggregate CAS update inside the transaction
///
/// Zero rows affected means either the aggregate is gone (NotFound) or a
/// concurrent commit moved the version (Conflict); a follow-up existence
/// check tells the two apart.
async fn cas_update_aggregate(
    tx: &mut Transaction<'_, Postgres>,
    target_id: Uuid,
    expected_version: i64,
    total_grams: i64,
    remaining_grams: i64,
) -> StoreResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE paper_aggregates
        SET total_grams = $3,
            remaining_grams = $4,
            version = version + 1,
            updated_at = NOW()
        WHERE target_id = $1
          AND version = $2
        "#,
    )
    .bind(target_id)
    .bind(expected_version)
    .bind(total_grams)
    .bind(remaining_grams)
    .execute(&mut **tx)
    .await
    .map_err(unavailable)?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let exists: Option<(i64,)> =
        sqlx::query_as("SELECT version FROM paper_aggregates WHERE target_id = $1")
            .bind(target_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(unavailable)?;

    match exists {
        Some(_) => Err(StoreError::Conflict(target_id)),
        None => Err(StoreError::NotFound {
            kind: "aggregate",
            id: target_id,
        }),
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn create_aggregate(
        &self,
        target_id: Uuid,
        notify_when_grams: i64,
    ) -> StoreResult<Aggregate> {
        let aggregate = sqlx::query_as::<_, Aggregate>(
            r#"
            INSERT INTO paper_aggregates (target_id, notify_when_grams)
            VALUES ($1, $2)
            RETURNING target_id, total_grams, remaining_grams, notify_when_grams,
                      version, created_at, updated_at
            "#,
        )
        .bind(target_id)
        .bind(notify_when_grams)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::AlreadyExists(target_id)
            } else {
                unavailable(e)
            }
        })?;

        Ok(aggregate)
    }

    async fn get_aggregate(&self, target_id: Uuid) -> StoreResult<Aggregate> {
        let aggregate = sqlx::query_as::<_, Aggregate>(
            r#"
            SELECT target_id, total_grams, remaining_grams, notify_when_grams,
                   version, created_at, updated_at
            FROM paper_aggregates
            WHERE target_id = $1
            "#,
        )
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        aggregate.ok_or(StoreError::NotFound {
            kind: "aggregate",
            id: target_id,
        })
    }

    async fn list_aggregates(&self) -> StoreResult<Vec<Aggregate>> {
        sqlx::query_as::<_, Aggregate>(
            r#"
            SELECT target_id, total_grams, remaining_grams, notify_when_grams,
                   version, created_at, updated_at
            FROM paper_aggregates
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)
    }

    async fn get_roll(&self, target_id: Uuid, roll_id: Uuid) -> StoreResult<Roll> {
        let roll = sqlx::query_as::<_, Roll>(
            r#"
            SELECT id, target_id, remaining_grams, created_at
            FROM paper_rolls
            WHERE target_id = $1 AND id = $2
            "#,
        )
        .bind(target_id)
        .bind(roll_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        roll.ok_or(StoreError::NotFound {
            kind: "roll",
            id: roll_id,
        })
    }

    async fn list_rolls(&self, target_id: Uuid) -> StoreResult<Vec<Roll>> {
        // Existence check so an unknown target reads as NotFound rather
        // than an empty roll list
        self.get_aggregate(target_id).await?;

        sqlx::query_as::<_, Roll>(
            r#"
            SELECT id, target_id, remaining_grams, created_at
            FROM paper_rolls
            WHERE target_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(target_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)
    }

    async fn list_log_entries(&self, target_id: Uuid) -> StoreResult<Vec<LogEntry>> {
        self.get_aggregate(target_id).await?;

        sqlx::query_as::<_, LogEntry>(
            r#"
            SELECT id, target_id, action, amount_grams, roll_id,
                   remaining_after_grams, user_id, details, logged_at
            FROM paper_logs
            WHERE target_id = $1
            ORDER BY logged_at, id
            "#,
        )
        .bind(target_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)
    }

    async fn operation_seen(&self, operation_id: Uuid) -> StoreResult<bool> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT operation_id FROM processed_operations WHERE operation_id = $1")
                .bind(operation_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        Ok(row.is_some())
    }

    async fn atomic_write(
        &self,
        target_id: Uuid,
        expected_version: i64,
        mutations: Vec<Mutation>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        for mutation in mutations {
            match mutation {
                Mutation::UpdateAggregate {
                    total_grams,
                    remaining_grams,
                } => {
                    cas_update_aggregate(
                        &mut tx,
                        target_id,
                        expected_version,
                        total_grams,
                        remaining_grams,
                    )
                    .await?;
                }
                Mutation::UpsertRoll(roll) => {
                    sqlx::query(
                        r#"
                        INSERT INTO paper_rolls (id, target_id, remaining_grams, created_at)
                        VALUES ($1, $2, $3, $4)
                        ON CONFLICT (id)
                        DO UPDATE SET remaining_grams = EXCLUDED.remaining_grams
                        "#,
                    )
                    .bind(roll.id)
                    .bind(roll.target_id)
                    .bind(roll.remaining_grams)
                    .bind(roll.created_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(unavailable)?;
                }
                Mutation::AppendLogEntry(entry) => {
                    sqlx::query(
                        r#"
                        INSERT INTO paper_logs
                            (id, target_id, action, amount_grams, roll_id,
                             remaining_after_grams, user_id, details, logged_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                        "#,
                    )
                    .bind(entry.id)
                    .bind(entry.target_id)
                    .bind(entry.action)
                    .bind(entry.amount_grams)
                    .bind(entry.roll_id)
                    .bind(entry.remaining_after_grams)
                    .bind(entry.user_id)
                    .bind(entry.details)
                    .bind(entry.logged_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(unavailable)?;
                }
                Mutation::MarkOperationProcessed(operation_id) => {
                    sqlx::query(
                        r#"
                        INSERT INTO processed_operations (operation_id, target_id)
                        VALUES ($1, $2)
                        "#,
                    )
                    .bind(operation_id)
                    .bind(target_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        if is_unique_violation(&e) {
                            // Another writer carrying the same idempotency
                            // key committed first
                            StoreError::Conflict(target_id)
                        } else {
                            unavailable(e)
                        }
                    })?;
                }
            }
        }

        tx.commit().await.map_err(unavailable)?;

        Ok(())
    }
}
