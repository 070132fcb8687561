// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Session trimming.
//!
//! Keeps `recent:` at or below the configured limit by evicting the least
//! recently seen tokens, oldest first, in batches. Each batch removes the
//! token's login entry, its `recent:` member and its `viewed:{token}` list
//! (and optionally its cart) in one atomic write, so no token is ever left
//! half-evicted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::daemon::{Sweep, SweepOutcome};
use crate::keys;
use crate::storage::traits::{KvStore, Op, StorageError};

pub struct SessionTrimmer {
    store: Arc<dyn KvStore>,
    limit: u64,
    batch: u64,
    idle: Duration,
    with_carts: bool,
}

impl SessionTrimmer {
    pub fn new(store: Arc<dyn KvStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            limit: config.session_limit,
            batch: config.session_trim_batch.max(1),
            idle: Duration::from_millis(config.session_idle_ms),
            with_carts: config.trim_carts,
        }
    }

    /// Also delete `cart:{token}` of evicted sessions.
    #[must_use]
    pub fn with_carts(mut self, with_carts: bool) -> Self {
        self.with_carts = with_carts;
        self
    }

    fn eviction_ops(&self, tokens: Vec<String>) -> Vec<Op> {
        let mut doomed: Vec<String> = tokens.iter().map(|t| keys::recent_views(t)).collect();
        if self.with_carts {
            doomed.extend(tokens.iter().map(|t| keys::cart(t)));
        }
        vec![
            Op::del(doomed),
            Op::hdel(keys::LOGIN, tokens.clone()),
            Op::zrem(keys::RECENT, tokens),
        ]
    }
}

#[async_trait]
impl Sweep for SessionTrimmer {
    fn name(&self) -> &'static str {
        "session_trimmer"
    }

    fn idle_delay(&self) -> Duration {
        self.idle
    }

    async fn run_once(&self) -> Result<SweepOutcome, StorageError> {
        let size = self.store.zcard(keys::RECENT).await?;
        if size <= self.limit {
            return Ok(SweepOutcome::Idle);
        }

        let take = (size - self.limit).min(self.batch);
        let stop = isize::try_from(take).unwrap_or(isize::MAX) - 1;
        let tokens = self.store.zrange(keys::RECENT, 0, stop).await?;
        if tokens.is_empty() {
            // Shrunk concurrently
            return Ok(SweepOutcome::Idle);
        }

        let evicted = tokens.len();
        debug!(size, evicted, "Evicting oldest sessions");
        self.store.exec_atomic(self.eviction_ops(tokens)).await?;

        crate::metrics::record_eviction(self.name(), evicted);
        info!(evicted, with_carts = self.with_carts, "Sessions trimmed");
        Ok(SweepOutcome::Worked(evicted))
    }
}
