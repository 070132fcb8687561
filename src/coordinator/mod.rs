// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storefront coordinator.
//!
//! The [`Storefront`] ties together all components over one shared store:
//! - Marketplace transactions (list / purchase)
//! - Session tokens, recent views and carts
//! - Request response cache
//! - Row snapshot scheduling
//! - Background daemons (session trimmer, popularity rescaler, row cache)
//!
//! # Lifecycle
//!
//! ```text
//! Created → Running → ShuttingDown → Stopped
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storefront_engine::{EngineConfig, EngineState, InventoryProvider, Storefront};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = Storefront::connect(EngineConfig::default()).await.expect("connect failed");
//! assert_eq!(engine.state(), EngineState::Created);
//!
//! engine.start(Arc::new(InventoryProvider)).await;
//! engine.schedule_row_cache("row1", 5).await.expect("schedule failed");
//! engine.shutdown().await;
//! # }
//! ```

mod api;
mod lifecycle;
mod types;

pub use types::EngineState;

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::config::EngineConfig;
use crate::daemon::DaemonHandle;
use crate::market::Market;
use crate::request_cache::RequestCache;
use crate::session::Sessions;
use crate::storage::memory::InMemoryStore;
use crate::storage::redis::RedisStore;
use crate::storage::traits::{KvStore, StorageError};

/// Main storefront coordinator.
///
/// # Thread Safety
///
/// `Send + Sync`; every operation takes `&self`. The store is the only
/// shared mutable state.
pub struct Storefront {
    pub(super) config: EngineConfig,

    pub(super) store: Arc<dyn KvStore>,

    pub(super) market: Market,

    pub(super) sessions: Sessions,

    pub(super) request_cache: RequestCache,

    /// Engine state (broadcast to watchers)
    pub(super) state: watch::Sender<EngineState>,

    pub(super) state_rx: watch::Receiver<EngineState>,

    /// Handles of running daemons, empty unless `Running`
    pub(super) daemons: Mutex<Vec<DaemonHandle>>,
}

impl Storefront {
    /// Create an engine over an existing store.
    pub fn new(store: Arc<dyn KvStore>, config: EngineConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(EngineState::Created);
        Self {
            market: Market::new(store.clone(), &config),
            sessions: Sessions::new(store.clone(), &config),
            request_cache: RequestCache::new(store.clone(), &config),
            config,
            store,
            state: state_tx,
            state_rx,
            daemons: Mutex::new(Vec::new()),
        }
    }

    /// Connect to Redis when `redis_url` is set, otherwise use an
    /// in-process store.
    pub async fn connect(config: EngineConfig) -> Result<Self, StorageError> {
        let store: Arc<dyn KvStore> = match config.redis_url.as_deref() {
            Some(url) => {
                let store = RedisStore::with_prefix(url, config.redis_prefix.as_deref()).await?;
                info!(prefix = store.prefix(), "Using Redis store");
                Arc::new(store)
            }
            None => {
                info!("No Redis URL configured, using in-memory store");
                Arc::new(InMemoryStore::new())
            }
        };
        Ok(Self::new(store, config))
    }

    /// Get current engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared store handle.
    #[must_use]
    pub fn store(&self) -> Arc<dyn KvStore> {
        self.store.clone()
    }

    #[must_use]
    pub fn market(&self) -> &Market {
        &self.market
    }

    #[must_use]
    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }
}
