// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the storefront engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding process is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `storefront_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the outcome of an optimistic transaction
pub fn record_transaction(kind: &str, outcome: &str, attempts: u32, elapsed: Duration) {
    counter!(
        "storefront_transactions_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!(
        "storefront_transaction_attempts",
        "kind" => kind.to_string()
    )
    .record(attempts as f64);
    histogram!(
        "storefront_transaction_seconds",
        "kind" => kind.to_string()
    )
    .record(elapsed.as_secs_f64());
}

/// Record entries purged by an eviction daemon
pub fn record_eviction(daemon: &str, count: usize) {
    counter!(
        "storefront_evictions_total",
        "daemon" => daemon.to_string()
    )
    .increment(count as u64);
}

/// Record a failed daemon iteration
pub fn record_daemon_error(daemon: &str) {
    counter!(
        "storefront_daemon_errors_total",
        "daemon" => daemon.to_string()
    )
    .increment(1);
}

/// Set whether a daemon loop is alive (1) or stopped (0)
pub fn set_daemon_running(daemon: &str, running: bool) {
    gauge!(
        "storefront_daemon_running",
        "daemon" => daemon.to_string()
    )
    .set(if running { 1.0 } else { 0.0 });
}

/// Record a row scheduler pass (refreshed, deleted, provider_error)
pub fn record_row_refresh(status: &str) {
    counter!(
        "storefront_row_refresh_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a request cache decision (hit, miss, bypass)
pub fn record_request_cache(result: &str) {
    counter!(
        "storefront_request_cache_total",
        "result" => result.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these are no-ops; they must not panic.
    #[test]
    fn test_recording_without_recorder() {
        record_transaction("purchase", "committed", 2, Duration::from_millis(3));
        record_eviction("session_trimmer", 50);
        record_daemon_error("row_cache");
        set_daemon_running("popularity_rescaler", true);
        record_row_refresh("refreshed");
        record_request_cache("hit");
    }
}
