// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the storefront engine.
//!
//! # Example
//!
//! ```
//! use storefront_engine::EngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = EngineConfig::default();
//! assert_eq!(config.popularity_cap, 20_000);
//!
//! // Full config
//! let config = EngineConfig {
//!     redis_url: Some("redis://localhost:6379".into()),
//!     session_limit: 1_000,
//!     trim_carts: false,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the storefront engine.
///
/// All fields have defaults matching the reference workload. With no
/// `redis_url` the engine runs against an in-process store.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Redis connection string (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix prepended to every key (e.g., "shop:")
    #[serde(default)]
    pub redis_prefix: Option<String>,

    /// Max active session tokens before the trimmer starts evicting
    #[serde(default = "default_session_limit")]
    pub session_limit: u64,

    /// Max tokens evicted per trimmer iteration
    #[serde(default = "default_session_trim_batch")]
    pub session_trim_batch: u64,

    /// Trimmer pause when under the limit
    #[serde(default = "default_session_idle_ms")]
    pub session_idle_ms: u64,

    /// Also delete carts of evicted sessions
    #[serde(default = "default_trim_carts")]
    pub trim_carts: bool,

    /// Items kept in each token's recent-view list
    #[serde(default = "default_recent_view_limit")]
    pub recent_view_limit: usize,

    /// Items kept in the popularity ranking after each rescale
    #[serde(default = "default_popularity_cap")]
    pub popularity_cap: usize,

    /// Pause between popularity rescales
    #[serde(default = "default_popularity_rescale_ms")]
    pub popularity_rescale_ms: u64,

    /// Weight applied to every popularity score per rescale
    #[serde(default = "default_popularity_weight")]
    pub popularity_weight: f64,

    /// Only items ranked inside this window get cached responses
    #[serde(default = "default_cache_rank_window")]
    pub cache_rank_window: u64,

    /// Expiry of cached responses
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Row scheduler pause when nothing is due
    #[serde(default = "default_row_poll_ms")]
    pub row_poll_ms: u64,

    /// Deadline for listing an item
    #[serde(default = "default_list_deadline_ms")]
    pub list_deadline_ms: u64,

    /// Deadline for purchasing an item
    #[serde(default = "default_purchase_deadline_ms")]
    pub purchase_deadline_ms: u64,
}

fn default_session_limit() -> u64 { 10_000_000 }
fn default_session_trim_batch() -> u64 { 100 }
fn default_session_idle_ms() -> u64 { 1000 }
fn default_trim_carts() -> bool { true }
fn default_recent_view_limit() -> usize { 25 }
fn default_popularity_cap() -> usize { 20_000 }
fn default_popularity_rescale_ms() -> u64 { 500 }
fn default_popularity_weight() -> f64 { 0.5 }
fn default_cache_rank_window() -> u64 { 10_000 }
fn default_cache_ttl_secs() -> u64 { 300 }
fn default_row_poll_ms() -> u64 { 50 }
fn default_list_deadline_ms() -> u64 { 5_000 }
fn default_purchase_deadline_ms() -> u64 { 10_000 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            redis_prefix: None,
            session_limit: default_session_limit(),
            session_trim_batch: default_session_trim_batch(),
            session_idle_ms: default_session_idle_ms(),
            trim_carts: default_trim_carts(),
            recent_view_limit: default_recent_view_limit(),
            popularity_cap: default_popularity_cap(),
            popularity_rescale_ms: default_popularity_rescale_ms(),
            popularity_weight: default_popularity_weight(),
            cache_rank_window: default_cache_rank_window(),
            cache_ttl_secs: default_cache_ttl_secs(),
            row_poll_ms: default_row_poll_ms(),
            list_deadline_ms: default_list_deadline_ms(),
            purchase_deadline_ms: default_purchase_deadline_ms(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn list_deadline(&self) -> Duration {
        Duration::from_millis(self.list_deadline_ms)
    }

    #[must_use]
    pub fn purchase_deadline(&self) -> Duration {
        Duration::from_millis(self.purchase_deadline_ms)
    }
}
