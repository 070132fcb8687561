// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cancellable background loops.
//!
//! Every maintenance task in the engine is a [`Sweep`]: one bounded unit of
//! work per call. [`Daemon::spawn`] drives a sweep until stopped:
//!
//! ```text
//!   run_once ──▶ Worked(n) ──▶ run again immediately
//!      │
//!      ├──────▶ Idle ───────▶ sleep idle_delay (interruptible by stop)
//!      │
//!      └──────▶ Err ────────▶ log, count, sleep backoff (interruptible)
//! ```
//!
//! A stop request never interrupts `run_once`; the loop exits at the next
//! iteration boundary, so every batch the sweep issues is applied whole.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::resilience::retry::{Backoff, RetryConfig};
use crate::storage::traits::StorageError;

/// Result of one sweep iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// `n` units of work were done; more may be pending.
    Worked(usize),
    /// Nothing to do right now.
    Idle,
}

/// One unit of periodic maintenance.
#[async_trait]
pub trait Sweep: Send + Sync {
    /// Stable name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Pause after an [`SweepOutcome::Idle`] iteration.
    fn idle_delay(&self) -> Duration;

    async fn run_once(&self) -> Result<SweepOutcome, StorageError>;
}

/// Lifecycle of a spawned daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Running,
    /// Stop requested; the current iteration is finishing.
    Stopping,
    Stopped,
}

impl std::fmt::Display for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

pub struct Daemon;

impl Daemon {
    /// Spawn `sweep` on the current runtime with the default error backoff.
    pub fn spawn(sweep: Arc<dyn Sweep>) -> DaemonHandle {
        Self::spawn_with_backoff(sweep, RetryConfig::daemon())
    }

    pub fn spawn_with_backoff(sweep: Arc<dyn Sweep>, error_backoff: RetryConfig) -> DaemonHandle {
        let name = sweep.name();
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = Arc::new(watch::channel(DaemonState::Running).0);
        let task = tokio::spawn(run(sweep, stop_rx, state.clone(), error_backoff));
        DaemonHandle {
            name,
            stop: stop_tx,
            state,
            task: Some(task),
        }
    }
}

/// Owner of a running daemon.
///
/// Dropping the handle requests a stop without waiting for it.
pub struct DaemonHandle {
    name: &'static str,
    stop: watch::Sender<bool>,
    state: Arc<watch::Sender<DaemonState>>,
    task: Option<JoinHandle<()>>,
}

impl DaemonHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn state(&self) -> DaemonState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<DaemonState> {
        self.state.subscribe()
    }

    /// Ask the loop to exit after its current iteration.
    pub fn stop(&self) {
        self.state.send_if_modified(|state| {
            if *state == DaemonState::Running {
                *state = DaemonState::Stopping;
                true
            } else {
                false
            }
        });
        let _ = self.stop.send(true);
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(daemon = self.name, error = %e, "Daemon task panicked");
            }
        }
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.stop.send(true);
        }
    }
}

fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

async fn run(
    sweep: Arc<dyn Sweep>,
    mut stop: watch::Receiver<bool>,
    state: Arc<watch::Sender<DaemonState>>,
    error_backoff: RetryConfig,
) {
    let name = sweep.name();
    let mut backoff = Backoff::new(&error_backoff);
    crate::metrics::set_daemon_running(name, true);
    info!(daemon = name, "Daemon started");

    while !stop_requested(&stop) {
        let pause = match sweep.run_once().await {
            Ok(SweepOutcome::Worked(n)) => {
                backoff.reset();
                debug!(daemon = name, n, "Sweep did work");
                None
            }
            Ok(SweepOutcome::Idle) => {
                backoff.reset();
                Some(sweep.idle_delay())
            }
            Err(e) => {
                crate::metrics::record_daemon_error(name);
                let delay = backoff.next_delay();
                warn!(daemon = name, error = %e, ?delay, "Sweep failed, backing off");
                Some(delay)
            }
        };

        match pause {
            None => tokio::task::yield_now().await,
            Some(delay) => {
                tokio::select! {
                    _ = sleep(delay) => {}
                    changed = stop.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    state.send_replace(DaemonState::Stopped);
    crate::metrics::set_daemon_running(name, false);
    info!(daemon = name, "Daemon stopped");
}
