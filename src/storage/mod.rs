// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store backends.
//!
//! [`traits::KvStore`] is the seam: Redis in production, [`memory::InMemoryStore`]
//! for tests and single-process use.

pub mod memory;
pub mod redis;
pub mod traits;
pub mod zset;
