// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! TimeService trait definition.

use super::Timestamp;

/// Source of transaction timestamps.
///
/// All start timestamps, commit timestamps and checkpoint markers are drawn
/// from one service so they are totally ordered.
pub trait TimeService: Send + Sync {
    /// Allocates a fresh tick, strictly greater than every tick issued before.
    ///
    /// This is the hot path of `begin` and `commit`; implementations must not
    /// allocate or block.
    fn now(&self) -> Timestamp;

    /// Returns the most recently issued tick without advancing the clock.
    fn current(&self) -> Timestamp;

    /// Ensures later ticks are strictly greater than `ts`.
    ///
    /// Called after recovery so new commits order after everything replayed.
    fn observe(&self, ts: Timestamp);
}
