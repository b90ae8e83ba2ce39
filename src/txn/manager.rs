// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Optimistic transaction manager.
//!
//! Transactions read at their start timestamp and never lock. At commit
//! the write-set is validated against versions committed since the start;
//! any overlap aborts the transaction with [`TxnError::Conflict`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::checkpoint::CheckpointCoordinator;
#[cfg(any(test, feature = "interleave"))]
use crate::checkpoint::Interleave;
use crate::key::{validate_key, Key};
use crate::storage::Journal;
use crate::time::{TimeService, Timestamp};
use crate::tree::{Direction, Tree};
use crate::value::{validate_value, Value};

use super::error::TxnError;
use super::status::CommitState;
use super::transaction::{Transaction, TxnId, TxnState};

/// Point-in-time transaction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxnStats {
    pub started: u64,
    pub commits: u64,
    pub conflicts: u64,
    pub rollbacks: u64,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
    rollbacks: AtomicU64,
}

/// Begins, validates and commits transactions against shared trees.
pub struct TransactionManager {
    clock: Arc<dyn TimeService>,
    journal: Arc<dyn Journal>,
    coordinator: Arc<CheckpointCoordinator>,
    /// Start timestamps are allocated under the read side and commits are
    /// validated and installed under the write side, so every commit below
    /// a start timestamp is installed before that timestamp is handed out.
    commit_lock: RwLock<()>,
    /// Start timestamps of active transactions, with multiplicity.
    active: Mutex<BTreeMap<Timestamp, usize>>,
    /// Timestamps held by [`SnapshotPin`]s, with multiplicity. Locked before
    /// `active`.
    pins: Mutex<BTreeMap<Timestamp, usize>>,
    next_txn_id: AtomicU64,
    counters: Counters,
    #[cfg(any(test, feature = "interleave"))]
    hooks: Option<Arc<Interleave>>,
}

impl TransactionManager {
    pub fn new(
        clock: Arc<dyn TimeService>,
        journal: Arc<dyn Journal>,
        coordinator: Arc<CheckpointCoordinator>,
    ) -> Self {
        Self {
            clock,
            journal,
            coordinator,
            commit_lock: RwLock::new(()),
            active: Mutex::new(BTreeMap::new()),
            pins: Mutex::new(BTreeMap::new()),
            next_txn_id: AtomicU64::new(1),
            counters: Counters::default(),
            #[cfg(any(test, feature = "interleave"))]
            hooks: None,
        }
    }

    #[cfg(any(test, feature = "interleave"))]
    pub fn with_hooks(mut self, hooks: Option<Arc<Interleave>>) -> Self {
        self.hooks = hooks;
        self
    }

    #[inline]
    pub fn clock(&self) -> &Arc<dyn TimeService> {
        &self.clock
    }

    #[inline]
    pub fn coordinator(&self) -> &Arc<CheckpointCoordinator> {
        &self.coordinator
    }

    /// Starts a transaction reading at a fresh timestamp.
    pub fn begin(&self) -> Transaction {
        let id = TxnId(self.next_txn_id.fetch_add(1, Ordering::Relaxed));
        let start_ts = {
            let _guard = self.commit_lock.read();
            let start_ts = self.clock.now();
            *self.active.lock().entry(start_ts).or_insert(0) += 1;
            start_ts
        };
        self.counters.started.fetch_add(1, Ordering::Relaxed);
        Transaction::new(id, start_ts)
    }

    /// Oldest start timestamp or pinned timestamp, or the current clock
    /// reading when there is neither. No reader can see a version older
    /// than the newest one at or below this horizon.
    pub fn oldest_active(&self) -> Timestamp {
        let pins = self.pins.lock();
        let oldest_txn = self.active.lock().keys().next().copied();
        match (oldest_txn, pins.keys().next().copied()) {
            (Some(txn), Some(pin)) => txn.min(pin),
            (txn, pin) => txn.or(pin).unwrap_or_else(|| self.clock.current()),
        }
    }

    /// Allocates a timestamp with `allocate` and keeps the prune horizon at
    /// or below it until the returned pin is dropped.
    ///
    /// The timestamp is allocated under the pin lock, so a concurrent
    /// [`oldest_active`](Self::oldest_active) either sees the pin or reads
    /// the clock before the timestamp exists.
    pub fn pin(&self, allocate: impl FnOnce() -> Timestamp) -> SnapshotPin<'_> {
        let mut pins = self.pins.lock();
        let ts = allocate();
        *pins.entry(ts).or_insert(0) += 1;
        SnapshotPin { manager: self, ts }
    }

    fn unpin(&self, ts: Timestamp) {
        let mut pins = self.pins.lock();
        if let Some(count) = pins.get_mut(&ts) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&ts);
            }
        }
    }

    /// Number of active transactions.
    pub fn active_count(&self) -> usize {
        self.active.lock().values().sum()
    }

    /// Reads `key` as `txn` sees it: its own buffered write if any,
    /// otherwise the version visible at its start timestamp.
    pub fn read(&self, txn: &Transaction, tree: &Tree, key: &[u8]) -> Result<Value, TxnError> {
        ensure_active(txn)?;
        if let Some(value) = txn.write_set.get(tree.id(), key) {
            return Ok(value.clone());
        }
        Ok(tree.fetch(key, txn.start_ts))
    }

    /// Buffers a write. `Value::Undefined` removes the key at commit.
    pub fn write(
        &self,
        txn: &mut Transaction,
        tree: &Arc<Tree>,
        key: &[u8],
        value: Value,
    ) -> Result<(), TxnError> {
        ensure_active(txn)?;
        validate_key(key)?;
        validate_value(&value)?;
        txn.write_set.put(tree, key, value);
        Ok(())
    }

    /// Nearest key in `direction` from `from`, among keys strictly below
    /// `within`, whose value as seen by `txn` is defined.
    pub fn seek(
        &self,
        txn: &Transaction,
        tree: &Tree,
        from: &[u8],
        inclusive: bool,
        direction: Direction,
        within: &[u8],
    ) -> Result<Option<(Vec<u8>, Value)>, TxnError> {
        ensure_active(txn)?;
        let mut from = from.to_vec();
        let mut inclusive = inclusive;
        loop {
            let stored = tree.seek(&from, inclusive, direction, txn.start_ts, within);
            let buffered = txn
                .write_set
                .seek(tree.id(), &from, inclusive, direction, within);
            match (stored, buffered) {
                (stored, None) => return Ok(stored),
                (Some((key, value)), Some((buffered_key, _)))
                    if nearer(direction, &key, buffered_key) =>
                {
                    return Ok(Some((key, value)));
                }
                (_, Some((key, value))) => {
                    if value.is_defined() {
                        return Ok(Some((key.to_vec(), value.clone())));
                    }
                    // Removed by this transaction; keep looking past it.
                    from = key.to_vec();
                    inclusive = false;
                }
            }
        }
    }

    /// Validates and commits `txn`, returning its commit timestamp.
    ///
    /// A transaction without writes commits at its start timestamp and
    /// never conflicts.
    pub fn commit(&self, txn: &mut Transaction) -> Result<Timestamp, TxnError> {
        ensure_active(txn)?;

        if txn.write_set.is_empty() {
            txn.commit_ts = Some(txn.start_ts);
            self.finish(txn, TxnState::Committed);
            self.counters.commits.fetch_add(1, Ordering::Relaxed);
            return Ok(txn.start_ts);
        }

        let status = {
            let _guard = self.commit_lock.write();
            if let Err(err) = self.validate(txn) {
                self.finish(txn, TxnState::Aborted);
                self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                debug!(txn = %txn.id, error = %err, "commit conflict");
                return Err(err);
            }

            let status = self.coordinator.enter_commit(|| self.clock.now());
            let horizon = self.oldest_active();
            for (tree, writes) in txn.write_set.trees() {
                tree.install_pending(
                    writes.iter().map(|(key, value)| (key.as_slice(), value)),
                    &status,
                    horizon,
                );
            }
            status
        };

        let commit_ts = status.commit_ts();
        interleave!(self.hooks, |h| h.pause_point(crate::checkpoint::BEFORE_JOURNAL));

        let appended = self.journal.append_commit(&txn.write_set.to_record(commit_ts));
        status.resolve(match appended {
            Ok(()) => CommitState::Committed,
            Err(_) => CommitState::Aborted,
        });
        self.coordinator.leave_commit(commit_ts);

        match appended {
            Ok(()) => {
                txn.commit_ts = Some(commit_ts);
                self.finish(txn, TxnState::Committed);
                self.counters.commits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    txn = %txn.id,
                    start = %txn.start_ts,
                    commit = %commit_ts,
                    writes = txn.write_set.len(),
                    "committed"
                );
                Ok(commit_ts)
            }
            Err(err) => {
                self.finish(txn, TxnState::Aborted);
                self.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
                warn!(txn = %txn.id, commit = %commit_ts, error = %err, "journal append failed");
                Err(err.into())
            }
        }
    }

    /// Discards `txn` and its buffered writes.
    pub fn abort(&self, txn: &mut Transaction) -> Result<(), TxnError> {
        ensure_active(txn)?;
        self.finish(txn, TxnState::Aborted);
        self.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> TxnStats {
        TxnStats {
            started: self.counters.started.load(Ordering::Relaxed),
            commits: self.counters.commits.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
            rollbacks: self.counters.rollbacks.load(Ordering::Relaxed),
        }
    }

    /// Fails on the first written key with a live version newer than the
    /// start timestamp. Caller holds the commit lock.
    fn validate(&self, txn: &Transaction) -> Result<(), TxnError> {
        for (tree, writes) in txn.write_set.trees() {
            for key in writes.keys() {
                if let Some(ts) = tree.latest_conflict(key, txn.start_ts) {
                    return Err(TxnError::Conflict {
                        tree: tree.name().to_string(),
                        key: describe_key(key),
                        ts,
                    });
                }
            }
        }
        Ok(())
    }

    fn finish(&self, txn: &mut Transaction, state: TxnState) {
        txn.state = state;
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&txn.start_ts) {
            *count -= 1;
            if *count == 0 {
                active.remove(&txn.start_ts);
            }
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active", &self.active_count())
            .field("stats", &self.stats())
            .finish()
    }
}

/// A timestamp that pruning must keep readable. See
/// [`TransactionManager::pin`].
#[must_use = "the timestamp is unpinned when the pin is dropped"]
pub struct SnapshotPin<'a> {
    manager: &'a TransactionManager,
    ts: Timestamp,
}

impl SnapshotPin<'_> {
    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.ts
    }
}

impl Drop for SnapshotPin<'_> {
    fn drop(&mut self) {
        self.manager.unpin(self.ts);
    }
}

impl std::fmt::Debug for SnapshotPin<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SnapshotPin").field(&self.ts).finish()
    }
}

fn ensure_active(txn: &Transaction) -> Result<(), TxnError> {
    if txn.state == TxnState::Active {
        Ok(())
    } else {
        Err(TxnError::NotActive { state: txn.state })
    }
}

/// True if `stored` comes strictly before `buffered` in `direction`.
fn nearer(direction: Direction, stored: &[u8], buffered: &[u8]) -> bool {
    match direction {
        Direction::Forward => stored < buffered,
        Direction::Backward => stored > buffered,
    }
}

fn describe_key(key: &[u8]) -> String {
    match Key::from_encoded(key) {
        Ok(key) => key.to_string(),
        Err(_) => format!("{key:02x?}"),
    }
}
