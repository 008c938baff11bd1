//! Low-stock reporting adapter
//!
//! Scans aggregate state for targets at or below their notification
//! threshold and hands the result to a pluggable delivery channel. The
//! channel is the boundary to the external notification system — message
//! formatting and delivery retries live on the other side of it.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::store::{LedgerStore, StoreResult};

/// One target that has fallen to or below its threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowStockAlert {
    pub target_id: Uuid,
    pub remaining_grams: i64,
    pub notify_when_grams: i64,
}

/// Delivery seam for low-stock reports
///
/// Implementations own formatting and transport. The scanner only reads
/// aggregate state and never mutates anything.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn deliver(&self, alerts: &[LowStockAlert]) -> Result<(), String>;
}

/// Channel that reports through the process log
///
/// The in-process counterpart to an external notifier, used in dev/test
/// the same way the in-memory store stands in for PostgreSQL.
pub struct TracingChannel;

#[async_trait]
impl NotificationChannel for TracingChannel {
    async fn deliver(&self, alerts: &[LowStockAlert]) -> Result<(), String> {
        for alert in alerts {
            tracing::warn!(
                target_id = %alert.target_id,
                remaining_grams = alert.remaining_grams,
                notify_when_grams = alert.notify_when_grams,
                "Low paper stock"
            );
        }
        Ok(())
    }
}

/// Select every aggregate with `remaining <= notify_when`
pub async fn scan_low_stock(store: &Arc<dyn LedgerStore>) -> StoreResult<Vec<LowStockAlert>> {
    let aggregates = store.list_aggregates().await?;

    Ok(aggregates
        .into_iter()
        .filter(|a| a.is_low_stock())
        .map(|a| LowStockAlert {
            target_id: a.target_id,
            remaining_grams: a.remaining_grams,
            notify_when_grams: a.notify_when_grams,
        })
        .collect())
}

/// Scan and deliver in one step (invoked on demand or by an external cron)
pub async fn report_low_stock(
    store: &Arc<dyn LedgerStore>,
    channel: &dyn NotificationChannel,
) -> StoreResult<Vec<LowStockAlert>> {
    let alerts = scan_low_stock(store).await?;
    if !alerts.is_empty() {
        if let Err(e) = channel.deliver(&alerts).await {
            tracing::error!(error = %e, alerts = alerts.len(), "Low-stock delivery failed");
        }
    }
    Ok(alerts)
}
