// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Wall-clock time as stored in sorted-set scores.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in fractional seconds.
///
/// A clock set before the epoch reads as 0.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
