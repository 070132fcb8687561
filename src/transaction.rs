// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Optimistic transaction engine (WATCH → verify → MULTI/EXEC).
//!
//! ```text
//!         ┌──────────────┐
//!   ┌────▶│ WATCH keys   │
//!   │     └──────┬───────┘
//!   │            ▼
//!   │     ┌──────────────┐  precondition false
//!   │     │ plan.prepare │ ─────────────────────▶ UNWATCH → Rejected
//!   │     └──────┬───────┘
//!   │            ▼ effects
//!   │     ┌──────────────┐  applied
//!   │     │ MULTI / EXEC │ ─────────────────────▶ Committed
//!   │     └──────┬───────┘
//!   │            ▼ conflict
//!   │     deadline passed? ───── yes ───────────▶ Expired
//!   │            │ no
//!   └── backoff ─┘
//! ```
//!
//! A rejection is never retried: the business condition itself is false.
//! Store errors propagate immediately.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::resilience::retry::{Backoff, RetryConfig};
use crate::storage::traits::{ExecOutcome, KvStore, Op, StorageError, WatchSession};

/// Result of an optimistic transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Effects were applied atomically.
    Committed,
    /// The precondition did not hold; nothing was applied.
    Rejected,
    /// Watched keys kept changing until the deadline; nothing was applied.
    Expired,
}

impl TxOutcome {
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    /// Contention is an infrastructure condition worth retrying later;
    /// a rejection is not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Expired)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for TxOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The read-verify half of a transaction.
///
/// `prepare` runs once per attempt with the watch already established.
/// It returns the batch to commit, or `None` when the precondition fails.
#[async_trait]
pub trait TxPlan: Send {
    async fn prepare(
        &mut self,
        session: &mut dyn WatchSession,
    ) -> Result<Option<Vec<Op>>, StorageError>;
}

/// Runs [`TxPlan`]s against a shared store with bounded retry.
#[derive(Clone)]
pub struct OptimisticTx {
    store: Arc<dyn KvStore>,
    backoff: RetryConfig,
}

impl OptimisticTx {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_backoff(store, RetryConfig::contention())
    }

    pub fn with_backoff(store: Arc<dyn KvStore>, backoff: RetryConfig) -> Self {
        Self { store, backoff }
    }

    /// Attempt `plan` until it commits, is rejected, or `deadline` elapses.
    ///
    /// At least one attempt is always made.
    pub async fn attempt<P: TxPlan>(
        &self,
        name: &str,
        watched: &[String],
        deadline: Duration,
        plan: &mut P,
    ) -> Result<TxOutcome, StorageError> {
        let started = Instant::now();
        let end = started + deadline;
        let mut backoff = Backoff::new(&self.backoff);
        let mut attempts: u32 = 0;

        let outcome = loop {
            attempts += 1;
            let mut session = self.store.watch(watched).await?;

            let prepared = plan.prepare(session.as_mut()).await;
            let effects = match prepared {
                Ok(effects) => effects,
                Err(e) => {
                    if let Err(unwatch_err) = session.unwatch().await {
                        warn!(tx = name, error = %unwatch_err, "UNWATCH failed after prepare error");
                    }
                    return Err(e);
                }
            };

            let Some(ops) = effects else {
                session.unwatch().await?;
                break TxOutcome::Rejected;
            };

            match session.exec(ops).await? {
                ExecOutcome::Applied => break TxOutcome::Committed,
                ExecOutcome::Conflict => {
                    let now = Instant::now();
                    if now >= end {
                        break TxOutcome::Expired;
                    }
                    let delay = backoff.next_delay().min(end - now);
                    debug!(tx = name, attempt = attempts, ?delay, "Watched key changed, retrying");
                    sleep(delay).await;
                    if Instant::now() >= end {
                        break TxOutcome::Expired;
                    }
                }
            }
        };

        let elapsed = started.elapsed();
        match outcome {
            TxOutcome::Expired => warn!(
                tx = name,
                attempts,
                ?elapsed,
                "Gave up under contention"
            ),
            _ => info!(tx = name, outcome = %outcome, attempts, "Transaction finished"),
        }
        crate::metrics::record_transaction(name, outcome.as_str(), attempts, elapsed);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;

    /// Applies a marker when `inventory:s` holds `item`; writes to the
    /// watched key during the first `interfere` attempts.
    struct Marker {
        store: InMemoryStore,
        interfere: u32,
        attempts: u32,
    }

    impl Marker {
        fn new(store: &InMemoryStore, interfere: u32) -> Self {
            Self { store: store.clone(), interfere, attempts: 0 }
        }
    }

    #[async_trait]
    impl TxPlan for Marker {
        async fn prepare(
            &mut self,
            session: &mut dyn WatchSession,
        ) -> Result<Option<Vec<Op>>, StorageError> {
            self.attempts += 1;
            let present = session.sismember("inventory:s", "item").await?;
            if self.attempts <= self.interfere {
                self.store
                    .exec_atomic(vec![Op::sadd("inventory:s", format!("noise-{}", self.attempts))])
                    .await?;
            }
            Ok(present.then(|| vec![Op::set("applied", self.attempts.to_string())]))
        }
    }

    struct Failing;

    #[async_trait]
    impl TxPlan for Failing {
        async fn prepare(
            &mut self,
            _session: &mut dyn WatchSession,
        ) -> Result<Option<Vec<Op>>, StorageError> {
            Err(StorageError::Backend("connection reset".into()))
        }
    }

    fn watched() -> Vec<String> {
        vec!["inventory:s".to_string()]
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.exec_atomic(vec![Op::sadd("inventory:s", "item")]).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_commits_on_first_attempt() {
        let store = seeded().await;
        let tx = OptimisticTx::new(Arc::new(store.clone()));
        let mut plan = Marker::new(&store, 0);

        let outcome = tx.attempt("test", &watched(), Duration::from_secs(1), &mut plan).await.unwrap();

        assert_eq!(outcome, TxOutcome::Committed);
        assert_eq!(plan.attempts, 1);
        assert_eq!(store.get("applied").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let store = InMemoryStore::new();
        let tx = OptimisticTx::new(Arc::new(store.clone()));
        let mut plan = Marker::new(&store, 0);

        let outcome = tx.attempt("test", &watched(), Duration::from_secs(1), &mut plan).await.unwrap();

        assert_eq!(outcome, TxOutcome::Rejected);
        assert!(!outcome.is_retryable());
        assert_eq!(plan.attempts, 1);
        assert_eq!(store.get("applied").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_retries_through_conflicts() {
        let store = seeded().await;
        let tx = OptimisticTx::new(Arc::new(store.clone()));
        let mut plan = Marker::new(&store, 3);

        let outcome = tx.attempt("test", &watched(), Duration::from_secs(5), &mut plan).await.unwrap();

        assert_eq!(outcome, TxOutcome::Committed);
        assert_eq!(plan.attempts, 4);
        // Only the final attempt's effects are visible
        assert_eq!(store.get("applied").await.unwrap().as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_expires_under_sustained_contention() {
        let store = seeded().await;
        let tx = OptimisticTx::new(Arc::new(store.clone()));
        let mut plan = Marker::new(&store, u32::MAX);

        let started = Instant::now();
        let outcome = tx
            .attempt("test", &watched(), Duration::from_millis(100), &mut plan)
            .await
            .unwrap();

        assert_eq!(outcome, TxOutcome::Expired);
        assert!(outcome.is_retryable());
        assert!(plan.attempts > 1);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(store.get("applied").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_deadline_still_attempts_once() {
        let store = seeded().await;
        let tx = OptimisticTx::new(Arc::new(store.clone()));
        let mut plan = Marker::new(&store, 0);

        let outcome = tx.attempt("test", &watched(), Duration::ZERO, &mut plan).await.unwrap();
        assert_eq!(outcome, TxOutcome::Committed);
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let store = seeded().await;
        let tx = OptimisticTx::new(Arc::new(store));

        let result = tx.attempt("test", &watched(), Duration::from_secs(1), &mut Failing).await;
        assert!(matches!(result, Err(StorageError::Backend(_))));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(TxOutcome::Committed.to_string(), "committed");
        assert_eq!(TxOutcome::Rejected.to_string(), "rejected");
        assert_eq!(TxOutcome::Expired.to_string(), "expired");
        assert!(TxOutcome::Committed.is_committed());
    }
}
