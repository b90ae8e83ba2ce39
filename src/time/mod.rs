// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Timestamp allocation.
//!
//! Every transaction start, commit and checkpoint marker is a [`Timestamp`]
//! drawn from a single [`TimeService`]. The service hands out strictly
//! increasing ticks, which gives the engine its total commit order.
//!
//! # Example
//!
//! ```
//! use burrowdb::time::{HlcTimeService, TimeService};
//!
//! let clock = HlcTimeService::logical();
//! let start = clock.now();
//! let commit = clock.now();
//! assert!(commit > start);
//! ```

mod hlc;
mod timestamp;
mod traits;

pub use hlc::HlcTimeService;
pub use timestamp::Timestamp;
pub use traits::TimeService;
