// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine lifecycle management: start and shutdown of the daemon family.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::daemon::{Daemon, Sweep};
use crate::eviction::{PopularityRescaler, SessionTrimmer};
use crate::rowcache::{RowCacheSweep, RowProvider};

use super::{EngineState, Storefront};

impl Storefront {
    /// Spawn the session trimmer, popularity rescaler and row scheduler.
    ///
    /// Snapshots are fetched from `provider`. Calling this while already
    /// running is a no-op.
    #[tracing::instrument(skip(self, provider))]
    pub async fn start(&self, provider: Arc<dyn RowProvider>) {
        let mut daemons = self.daemons.lock().await;
        if self.state() == EngineState::Running {
            warn!("Storefront already running");
            return;
        }

        let sweeps: Vec<Arc<dyn Sweep>> = vec![
            Arc::new(SessionTrimmer::new(self.store.clone(), &self.config)),
            Arc::new(PopularityRescaler::new(self.store.clone(), &self.config)),
            Arc::new(RowCacheSweep::new(
                self.store.clone(),
                provider,
                Duration::from_millis(self.config.row_poll_ms),
            )),
        ];
        daemons.extend(sweeps.into_iter().map(Daemon::spawn));

        let _ = self.state.send(EngineState::Running);
        info!(daemons = daemons.len(), "Storefront running");
    }

    /// Initiate graceful shutdown
    ///
    /// Each daemon finishes its current iteration before exiting, so no
    /// eviction or refresh batch is left half-applied.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let mut daemons = self.daemons.lock().await;
        if daemons.is_empty() {
            let _ = self.state.send(EngineState::Stopped);
            return;
        }

        let shutdown_start = std::time::Instant::now();
        info!("Initiating storefront shutdown...");
        let _ = self.state.send(EngineState::ShuttingDown);

        for handle in daemons.iter() {
            handle.stop();
        }
        for handle in daemons.drain(..) {
            handle.shutdown().await;
        }

        let _ = self.state.send(EngineState::Stopped);
        info!(elapsed = ?shutdown_start.elapsed(), "Storefront shutdown complete");
    }
}
