// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction types and state management.

use std::fmt;

use crate::time::Timestamp;

use super::WriteSet;

/// Unique transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Transaction state.
///
/// `NotStarted -> Active -> {Committed, Aborted} -> Ended`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    NotStarted,
    Active,
    Committed,
    Aborted,
    Ended,
}

impl TxnState {
    /// True once the transaction can no longer read or write.
    #[inline]
    pub fn is_finished(self) -> bool {
        !matches!(self, TxnState::NotStarted | TxnState::Active)
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxnState::NotStarted => "not started",
            TxnState::Active => "active",
            TxnState::Committed => "committed",
            TxnState::Aborted => "aborted",
            TxnState::Ended => "ended",
        })
    }
}

/// A transaction handle.
///
/// Transactions read at their start timestamp and buffer writes locally
/// until commit.
#[derive(Debug)]
pub struct Transaction {
    /// Unique identifier for this transaction.
    pub(crate) id: TxnId,
    /// Snapshot timestamp for reads.
    pub(crate) start_ts: Timestamp,
    /// Timestamp when transaction committed (set after commit).
    pub(crate) commit_ts: Option<Timestamp>,
    pub(crate) state: TxnState,
    /// Buffered writes (applied atomically on commit).
    pub(crate) write_set: WriteSet,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, start_ts: Timestamp) -> Self {
        Self {
            id,
            start_ts,
            commit_ts: None,
            state: TxnState::Active,
            write_set: WriteSet::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> TxnId {
        self.id
    }

    #[inline]
    pub fn start_ts(&self) -> Timestamp {
        self.start_ts
    }

    /// Returns the commit timestamp (if committed).
    #[inline]
    pub fn commit_ts(&self) -> Option<Timestamp> {
        self.commit_ts
    }

    #[inline]
    pub fn state(&self) -> TxnState {
        self.state
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        self.state == TxnState::Committed
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.state == TxnState::Aborted
    }

    #[inline]
    pub fn write_set(&self) -> &WriteSet {
        &self.write_set
    }

    /// Returns the number of writes buffered.
    #[inline]
    pub fn write_count(&self) -> usize {
        self.write_set.len()
    }
}
