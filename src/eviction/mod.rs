// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Capacity-bounding sweeps for unbounded store structures.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Eviction Module                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  sessions.rs    - SessionTrimmer                             │
//! │  └─ recent: above limit → evict oldest tokens in batches     │
//! │  └─ login: / viewed:{t} / cart:{t} removed atomically        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  popularity.rs  - PopularityRescaler                         │
//! │  └─ viewed: truncated to the top `cap` ranks                 │
//! │  └─ remaining scores scaled by `weight`                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both implement [`crate::daemon::Sweep`] and run under
//! [`crate::daemon::Daemon`].

pub mod popularity;
pub mod sessions;

pub use popularity::PopularityRescaler;
pub use sessions::SessionTrimmer;
