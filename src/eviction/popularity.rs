// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Popularity rescaling.
//!
//! Views decrement scores in `viewed:`, so rank 0 is the most viewed item.
//! Each pass keeps the first `cap` ranks and multiplies every remaining
//! score by `weight` via a self-intersection. Scaling by a positive weight
//! keeps relative order intact while bounding score magnitude.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::EngineConfig;
use crate::daemon::{Sweep, SweepOutcome};
use crate::keys;
use crate::storage::traits::{KvStore, Op, StorageError};

pub struct PopularityRescaler {
    store: Arc<dyn KvStore>,
    cap: usize,
    weight: f64,
    interval: Duration,
}

impl PopularityRescaler {
    pub fn new(store: Arc<dyn KvStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            cap: config.popularity_cap,
            weight: config.popularity_weight,
            interval: Duration::from_millis(config.popularity_rescale_ms),
        }
    }

    fn rescale_ops(&self) -> Vec<Op> {
        let keep = isize::try_from(self.cap).unwrap_or(isize::MAX);
        vec![
            Op::zrem_range_by_rank(keys::POPULARITY, keep, -1),
            Op::zinter_store(keys::POPULARITY, vec![(keys::POPULARITY.to_string(), self.weight)]),
        ]
    }
}

#[async_trait]
impl Sweep for PopularityRescaler {
    fn name(&self) -> &'static str {
        "popularity_rescaler"
    }

    fn idle_delay(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self) -> Result<SweepOutcome, StorageError> {
        self.store.exec_atomic(self.rescale_ops()).await?;
        debug!(cap = self.cap, weight = self.weight, "Popularity rescaled");
        Ok(SweepOutcome::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;

    fn rescaler(store: &InMemoryStore, cap: usize) -> PopularityRescaler {
        let config = EngineConfig { popularity_cap: cap, ..Default::default() };
        PopularityRescaler::new(Arc::new(store.clone()), &config)
    }

    #[tokio::test]
    async fn test_truncates_and_halves() {
        let store = InMemoryStore::new();
        store
            .exec_atomic(vec![
                Op::zadd(keys::POPULARITY, "hot", -8.0),
                Op::zadd(keys::POPULARITY, "warm", -4.0),
                Op::zadd(keys::POPULARITY, "cold", -2.0),
            ])
            .await
            .unwrap();

        let outcome = rescaler(&store, 2).run_once().await.unwrap();

        assert_eq!(outcome, SweepOutcome::Idle);
        let ranked = store.zrange_withscores(keys::POPULARITY, 0, -1).await.unwrap();
        assert_eq!(
            ranked,
            vec![("hot".to_string(), -4.0), ("warm".to_string(), -2.0)]
        );
    }

    #[tokio::test]
    async fn test_empty_ranking_is_noop() {
        let store = InMemoryStore::new();
        rescaler(&store, 10).run_once().await.unwrap();
        assert_eq!(store.zcard(keys::POPULARITY).await.unwrap(), 0);
    }
}
