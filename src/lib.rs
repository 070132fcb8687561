// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Storefront Engine
//!
//! Redis-backed storefront state: a marketplace with optimistic
//! transactions, bounded session and popularity structures, and scheduled
//! row snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Request Path                          │
//! │  • list_item / purchase_item (WATCH → verify → MULTI/EXEC) │
//! │  • update_token / add_to_cart (pipelined)                  │
//! │  • resolve_cached_request (popularity-gated response cache)│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  KvStore (Redis or in-memory)               │
//! │  • login:  recent:  viewed:  cart:  market:  inventory:    │
//! │  • users:  delay:  schedule:  inv:  cache:                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Daemon Family                         │
//! │  • SessionTrimmer: recent: above limit → evict oldest      │
//! │  • PopularityRescaler: truncate + halve viewed:            │
//! │  • RowCacheSweep: republish inv:{row} when due             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storefront_engine::{EngineConfig, InventoryProvider, Storefront, TxOutcome};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = EngineConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         ..Default::default()
//!     };
//!
//!     let engine = Storefront::connect(config).await.expect("Failed to connect");
//!     engine.start(Arc::new(InventoryProvider)).await;
//!
//!     engine.market().grant_item("17", "ItemL").await.expect("grant failed");
//!     let outcome = engine.list_item("ItemL", "17", 97).await.expect("list failed");
//!     assert_eq!(outcome, TxOutcome::Committed);
//!
//!     engine.shutdown().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`Storefront`] facade and daemon lifecycle
//! - [`transaction`]: Optimistic transaction engine
//! - [`market`]: Listing and purchasing
//! - [`session`]: Login tokens, recent views, carts
//! - [`eviction`]: Session trimming and popularity rescaling
//! - [`rowcache`]: Row snapshot scheduler
//! - [`request_cache`]: Response cache gate
//! - [`daemon`]: Cancellable background loops
//! - [`storage`]: Store backends (Redis, memory)
//! - [`resilience`]: Retry and backoff

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod eviction;
pub mod keys;
pub mod market;
pub mod metrics;
pub mod request_cache;
pub mod resilience;
pub mod rowcache;
pub mod session;
pub mod storage;
pub mod transaction;

pub use config::EngineConfig;
pub use coordinator::{EngineState, Storefront};
pub use daemon::{Daemon, DaemonHandle, DaemonState, Sweep, SweepOutcome};
pub use eviction::{PopularityRescaler, SessionTrimmer};
pub use market::Market;
pub use request_cache::{CacheError, RequestCache};
pub use resilience::retry::RetryConfig;
pub use rowcache::{InventoryProvider, ProviderError, Row, RowCacheSweep, RowProvider};
pub use session::Sessions;
pub use storage::memory::InMemoryStore;
pub use storage::redis::RedisStore;
pub use storage::traits::{ExecOutcome, KvStore, Op, StorageError, WatchSession};
pub use transaction::{OptimisticTx, TxOutcome, TxPlan};
