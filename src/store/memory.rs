//! In-memory implementation of the LedgerStore trait for testing and development
//!
//! Mutations are staged against copies of the target's records and swapped
//! in only after every mutation has been applied, so a failed write leaves
//! no partial state behind — the same all-or-nothing contract the Postgres
//! implementation gets from a transaction.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{Aggregate, LogEntry, Roll};
use crate::store::{LedgerStore, Mutation, StoreError, StoreResult};

#[derive(Default)]
struct State {
    aggregates: HashMap<Uuid, Aggregate>,
    // Per-target, creation order
    rolls: HashMap<Uuid, Vec<Roll>>,
    // Per-target, commit order
    logs: HashMap<Uuid, Vec<LogEntry>>,
    processed: HashSet<Uuid>,
    fail_next_write: bool,
}

/// LedgerStore implementation backed by in-process maps
///
/// Suitable for unit/integration tests and local development without a
/// database. Selected via `STORE_TYPE=memory`.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `atomic_write` fail with `Unavailable` before applying
    /// anything. Used by tests to prove no partial writes are observable.
    pub fn fail_next_write(&self) {
        self.state.lock().expect("memory store lock").fail_next_write = true;
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_aggregate(
        &self,
        target_id: Uuid,
        notify_when_grams: i64,
    ) -> StoreResult<Aggregate> {
        let mut state = self.state.lock().expect("memory store lock");
        if state.aggregates.contains_key(&target_id) {
            return Err(StoreError::AlreadyExists(target_id));
        }
        let now = Utc::now();
        let aggregate = Aggregate {
            target_id,
            total_grams: 0,
            remaining_grams: 0,
            notify_when_grams,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        state.aggregates.insert(target_id, aggregate.clone());
        state.rolls.insert(target_id, Vec::new());
        state.logs.insert(target_id, Vec::new());
        Ok(aggregate)
    }

    async fn get_aggregate(&self, target_id: Uuid) -> StoreResult<Aggregate> {
        let state = self.state.lock().expect("memory store lock");
        state
            .aggregates
            .get(&target_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "aggregate",
                id: target_id,
            })
    }

    async fn list_aggregates(&self) -> StoreResult<Vec<Aggregate>> {
        let state = self.state.lock().expect("memory store lock");
        let mut aggregates: Vec<Aggregate> = state.aggregates.values().cloned().collect();
        aggregates.sort_by_key(|a| a.created_at);
        Ok(aggregates)
    }

    async fn get_roll(&self, target_id: Uuid, roll_id: Uuid) -> StoreResult<Roll> {
        let state = self.state.lock().expect("memory store lock");
        state
            .rolls
            .get(&target_id)
            .and_then(|rolls| rolls.iter().find(|r| r.id == roll_id))
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "roll",
                id: roll_id,
            })
    }

    async fn list_rolls(&self, target_id: Uuid) -> StoreResult<Vec<Roll>> {
        let state = self.state.lock().expect("memory store lock");
        state
            .rolls
            .get(&target_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "aggregate",
                id: target_id,
            })
    }

    async fn list_log_entries(&self, target_id: Uuid) -> StoreResult<Vec<LogEntry>> {
        let state = self.state.lock().expect("memory store lock");
        state
            .logs
            .get(&target_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "aggregate",
                id: target_id,
            })
    }

    async fn operation_seen(&self, operation_id: Uuid) -> StoreResult<bool> {
        let state = self.state.lock().expect("memory store lock");
        Ok(state.processed.contains(&operation_id))
    }

    async fn atomic_write(
        &self,
        target_id: Uuid,
        expected_version: i64,
        mutations: Vec<Mutation>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().expect("memory store lock");

        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(StoreError::Unavailable(
                "injected write failure".to_string(),
            ));
        }

        let mut aggregate = state
            .aggregates
            .get(&target_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "aggregate",
                id: target_id,
            })?;

        if aggregate.version != expected_version {
            return Err(StoreError::Conflict(target_id));
        }

        // Stage every mutation against copies; nothing is visible until the
        // swap at the end, so failures leave pre-operation state intact.
        let mut rolls = state.rolls.get(&target_id).cloned().unwrap_or_default();
        let mut logs = state.logs.get(&target_id).cloned().unwrap_or_default();
        let mut newly_processed = Vec::new();

        for mutation in mutations {
            match mutation {
                Mutation::UpdateAggregate {
                    total_grams,
                    remaining_grams,
                } => {
                    aggregate.total_grams = total_grams;
                    aggregate.remaining_grams = remaining_grams;
                    aggregate.version += 1;
                    aggregate.updated_at = Utc::now();
                }
                Mutation::UpsertRoll(roll) => {
                    match rolls.iter_mut().find(|r| r.id == roll.id) {
                        Some(existing) => *existing = roll,
                        None => rolls.push(roll),
                    }
                }
                Mutation::AppendLogEntry(entry) => logs.push(entry),
                Mutation::MarkOperationProcessed(operation_id) => {
                    if state.processed.contains(&operation_id) {
                        // Lost a race with another writer carrying the same
                        // idempotency key; surface it like any stale write.
                        return Err(StoreError::Conflict(target_id));
                    }
                    newly_processed.push(operation_id);
                }
            }
        }

        state.aggregates.insert(target_id, aggregate);
        state.rolls.insert(target_id, rolls);
        state.logs.insert(target_id, logs);
        state.processed.extend(newly_processed);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roll(target_id: Uuid, grams: i64) -> Roll {
        Roll {
            id: Uuid::new_v4(),
            target_id,
            remaining_grams: grams,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_aggregate_rejects_duplicate() {
        let store = MemoryStore::new();
        let target_id = Uuid::new_v4();
        store.create_aggregate(target_id, 0).await.unwrap();

        let err = store.create_aggregate(target_id, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == target_id));
    }

    #[tokio::test]
    async fn test_atomic_write_rejects_stale_version() {
        let store = MemoryStore::new();
        let target_id = Uuid::new_v4();
        store.create_aggregate(target_id, 0).await.unwrap();

        // First write at version 0 succeeds and bumps to 1
        store
            .atomic_write(
                target_id,
                0,
                vec![Mutation::UpdateAggregate {
                    total_grams: 1000,
                    remaining_grams: 1000,
                }],
            )
            .await
            .unwrap();

        // Second write against the stale version 0 must conflict
        let err = store
            .atomic_write(
                target_id,
                0,
                vec![Mutation::UpdateAggregate {
                    total_grams: 2000,
                    remaining_grams: 2000,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(id) if id == target_id));

        let aggregate = store.get_aggregate(target_id).await.unwrap();
        assert_eq!(aggregate.version, 1);
        assert_eq!(aggregate.total_grams, 1000);
    }

    #[tokio::test]
    async fn test_injected_failure_applies_nothing() {
        let store = MemoryStore::new();
        let target_id = Uuid::new_v4();
        store.create_aggregate(target_id, 0).await.unwrap();
        let new_roll = roll(target_id, 5000);

        store.fail_next_write();
        let err = store
            .atomic_write(
                target_id,
                0,
                vec![
                    Mutation::UpsertRoll(new_roll),
                    Mutation::UpdateAggregate {
                        total_grams: 5000,
                        remaining_grams: 5000,
                    },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        let aggregate = store.get_aggregate(target_id).await.unwrap();
        assert_eq!(aggregate.version, 0);
        assert_eq!(aggregate.total_grams, 0);
        assert!(store.list_rolls(target_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_roll_replaces_existing() {
        let store = MemoryStore::new();
        let target_id = Uuid::new_v4();
        store.create_aggregate(target_id, 0).await.unwrap();
        let mut r = roll(target_id, 5000);

        store
            .atomic_write(
                target_id,
                0,
                vec![
                    Mutation::UpsertRoll(r.clone()),
                    Mutation::UpdateAggregate {
                        total_grams: 5000,
                        remaining_grams: 5000,
                    },
                ],
            )
            .await
            .unwrap();

        r.remaining_grams = 2000;
        store
            .atomic_write(
                target_id,
                1,
                vec![
                    Mutation::UpsertRoll(r.clone()),
                    Mutation::UpdateAggregate {
                        total_grams: 5000,
                        remaining_grams: 2000,
                    },
                ],
            )
            .await
            .unwrap();

        let rolls = store.list_rolls(target_id).await.unwrap();
        assert_eq!(rolls.len(), 1);
        assert_eq!(rolls[0].remaining_grams, 2000);
    }

    #[tokio::test]
    async fn test_duplicate_operation_marker_conflicts() {
        let store = MemoryStore::new();
        let target_id = Uuid::new_v4();
        store.create_aggregate(target_id, 0).await.unwrap();
        let operation_id = Uuid::new_v4();

        store
            .atomic_write(
                target_id,
                0,
                vec![
                    Mutation::UpdateAggregate {
                        total_grams: 1000,
                        remaining_grams: 1000,
                    },
                    Mutation::MarkOperationProcessed(operation_id),
                ],
            )
            .await
            .unwrap();
        assert!(store.operation_seen(operation_id).await.unwrap());

        let err = store
            .atomic_write(
                target_id,
                1,
                vec![
                    Mutation::UpdateAggregate {
                        total_grams: 2000,
                        remaining_grams: 2000,
                    },
                    Mutation::MarkOperationProcessed(operation_id),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // The conflicting write applied nothing
        let aggregate = store.get_aggregate(target_id).await.unwrap();
        assert_eq!(aggregate.total_grams, 1000);
    }
}
