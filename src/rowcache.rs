// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Scheduled row snapshots.
//!
//! Two sorted sets drive the scheduler:
//!
//! ```text
//!   delay:     row → refresh interval (secs, ≤ 0 means cancelled)
//!   schedule:  row → next due time (unix secs)
//!   inv:{row}  latest snapshot published by the provider
//! ```
//!
//! [`RowCacheSweep`] looks only at the earliest `schedule:` entry. When it is
//! due the row is either republished and pushed one interval forward, or,
//! if its interval was cancelled, removed from both sets along with its
//! snapshot. The republish commits under WATCH on `delay:` so a
//! cancellation made while the provider is fetching is never overwritten.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::clock::unix_now;
use crate::daemon::{Sweep, SweepOutcome};
use crate::keys;
use crate::storage::traits::{KvStore, Op, StorageError, WatchSession};
use crate::transaction::{OptimisticTx, TxOutcome, TxPlan};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("row not found: {0}")]
    NotFound(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("failed to serialize row: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Source of truth for cached rows.
#[async_trait]
pub trait RowProvider: Send + Sync {
    /// Serialized snapshot of the row as it should be published.
    async fn fetch_latest(&self, row_id: &str) -> Result<String, ProviderError>;
}

/// Default snapshot shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub data: String,
    /// Unix seconds at which the snapshot was taken
    pub cached_at: u64,
}

/// Placeholder inventory backend producing a fresh [`Row`] per fetch.
#[derive(Debug, Clone, Default)]
pub struct InventoryProvider;

#[async_trait]
impl RowProvider for InventoryProvider {
    async fn fetch_latest(&self, row_id: &str) -> Result<String, ProviderError> {
        let row = Row {
            id: row_id.to_string(),
            data: "data to cache...".to_string(),
            cached_at: unix_now() as u64,
        };
        Ok(serde_json::to_string(&row)?)
    }
}

/// Start caching `row_id`, refreshing every `interval_secs`.
///
/// The row is due immediately. An interval of 0 cancels caching on the
/// next scheduler pass.
#[instrument(skip(store))]
pub async fn schedule_row_cache(
    store: &dyn KvStore,
    row_id: &str,
    interval_secs: u64,
) -> Result<(), StorageError> {
    store
        .pipeline(vec![
            Op::zadd(keys::ROW_DELAY, row_id, interval_secs as f64),
            Op::zadd(keys::ROW_SCHEDULE, row_id, unix_now()),
        ])
        .await
}

/// Stop caching `row_id`; the scheduler removes it and its snapshot.
pub async fn cancel_row_cache(store: &dyn KvStore, row_id: &str) -> Result<(), StorageError> {
    schedule_row_cache(store, row_id, 0).await
}

/// Latest published snapshot of `row_id`.
pub async fn cached_row(store: &dyn KvStore, row_id: &str) -> Result<Option<String>, StorageError> {
    store.get(&keys::row_snapshot(row_id)).await
}

/// Upper bound on retrying a refresh write against concurrent schedule changes.
const REFRESH_DEADLINE: Duration = Duration::from_secs(1);

pub struct RowCacheSweep {
    store: Arc<dyn KvStore>,
    provider: Arc<dyn RowProvider>,
    tx: OptimisticTx,
    poll: Duration,
}

impl RowCacheSweep {
    pub fn new(store: Arc<dyn KvStore>, provider: Arc<dyn RowProvider>, poll: Duration) -> Self {
        Self {
            tx: OptimisticTx::new(store.clone()),
            store,
            provider,
            poll,
        }
    }

    async fn retire(&self, row_id: &str) -> Result<(), StorageError> {
        self.store
            .exec_atomic(vec![
                Op::zrem(keys::ROW_DELAY, vec![row_id.to_string()]),
                Op::zrem(keys::ROW_SCHEDULE, vec![row_id.to_string()]),
                Op::del(vec![keys::row_snapshot(row_id)]),
            ])
            .await?;
        crate::metrics::record_row_refresh("deleted");
        info!(row_id, "Row caching cancelled");
        Ok(())
    }
}

#[async_trait]
impl Sweep for RowCacheSweep {
    fn name(&self) -> &'static str {
        "row_cache"
    }

    fn idle_delay(&self) -> Duration {
        self.poll
    }

    async fn run_once(&self) -> Result<SweepOutcome, StorageError> {
        let next = self.store.zrange_withscores(keys::ROW_SCHEDULE, 0, 0).await?;
        let Some((row_id, due)) = next.into_iter().next() else {
            return Ok(SweepOutcome::Idle);
        };
        let now = unix_now();
        if due > now {
            return Ok(SweepOutcome::Idle);
        }

        let interval = self.store.zscore(keys::ROW_DELAY, &row_id).await?;
        let Some(interval) = interval.filter(|secs| *secs > 0.0) else {
            self.retire(&row_id).await?;
            return Ok(SweepOutcome::Worked(1));
        };
        let (snapshot, status) = match self.provider.fetch_latest(&row_id).await {
            Ok(snapshot) => (Some(snapshot), "refreshed"),
            Err(e) => {
                // Keep the previous snapshot; try again next interval
                warn!(row_id = %row_id, error = %e, "Row provider failed, snapshot kept");
                (None, "provider_error")
            }
        };

        let mut plan = RefreshPlan { row_id: row_id.clone(), snapshot };
        let watched = vec![keys::ROW_DELAY.to_string()];
        match self.tx.attempt("row_refresh", &watched, REFRESH_DEADLINE, &mut plan).await? {
            TxOutcome::Committed => {
                crate::metrics::record_row_refresh(status);
                debug!(row_id = %row_id, interval, "Row rescheduled");
            }
            // Cancelled while fetching; retired on the next pass
            TxOutcome::Rejected => debug!(row_id = %row_id, "Row cancelled during refresh"),
            // Still due, so the next pass tries again
            TxOutcome::Expired => warn!(row_id = %row_id, "Row refresh lost to contention"),
        }
        Ok(SweepOutcome::Worked(1))
    }
}

/// Publish a fetched snapshot only while the row's interval still stands.
struct RefreshPlan {
    row_id: String,
    snapshot: Option<String>,
}

#[async_trait]
impl TxPlan for RefreshPlan {
    async fn prepare(
        &mut self,
        session: &mut dyn WatchSession,
    ) -> Result<Option<Vec<Op>>, StorageError> {
        let interval = session.zscore(keys::ROW_DELAY, &self.row_id).await?;
        let Some(interval) = interval.filter(|secs| *secs > 0.0) else {
            return Ok(None);
        };
        let mut ops = vec![Op::zadd(keys::ROW_SCHEDULE, self.row_id.clone(), unix_now() + interval)];
        if let Some(snapshot) = &self.snapshot {
            ops.push(Op::set(keys::row_snapshot(&self.row_id), snapshot.clone()));
        }
        Ok(Some(ops))
    }
}
