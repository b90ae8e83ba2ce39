// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Commit/checkpoint handshake.
//!
//! Two critical sections order commits against checkpoints:
//!
//! - `flushOnCheckpoint_a`: a commit allocates its timestamp and registers
//!   itself as in flight; a checkpoint allocates its marker and captures the
//!   in-flight commits below it. Whichever enters first is ordered first.
//! - `flushOnCheckpoint_b`: a commit whose journal record is durable leaves
//!   the in-flight set; a checkpoint publishes its marker.
//!
//! Between its two sections a checkpoint waits until every captured commit
//! is resolved, so the marker never covers a commit that is still writing
//! its journal record.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use crate::time::Timestamp;
use crate::txn::{CommitState, CommitStatus};

#[cfg(any(test, feature = "interleave"))]
use super::Interleave;

pub const SECTION_A: &str = "flushOnCheckpoint_a";
pub const SECTION_B: &str = "flushOnCheckpoint_b";

/// Who is entering a section. Appears in the interleave log.
pub const COMMIT_ACTOR: &str = "commit";
pub const CHECKPOINT_ACTOR: &str = "checkpoint";

/// In-flight commits captured by a checkpoint.
#[derive(Debug)]
pub struct Capture {
    marker: Timestamp,
    in_flight: Vec<Arc<CommitStatus>>,
}

impl Capture {
    #[inline]
    pub fn marker(&self) -> Timestamp {
        self.marker
    }

    /// Number of commits that were in flight below the marker.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Blocks until every captured commit is resolved. Returns how many of
    /// them aborted.
    pub fn wait(&self) -> usize {
        self.in_flight
            .iter()
            .filter(|status| status.wait() == CommitState::Aborted)
            .count()
    }
}

struct SectionGuard<'a> {
    #[cfg_attr(not(any(test, feature = "interleave")), allow(dead_code))]
    coordinator: &'a CheckpointCoordinator,
    section: &'static str,
    actor: &'static str,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for SectionGuard<'_> {
    fn drop(&mut self) {
        trace!(actor = self.actor, section = self.section, "release");
        interleave!(self.coordinator.hooks, |h| h
            .record(self.actor, format!("release:{}", self.section)));
    }
}

/// Shared by the transaction manager and the checkpoint procedure.
pub struct CheckpointCoordinator {
    section_a: Mutex<()>,
    section_b: Mutex<()>,
    in_flight: Mutex<BTreeMap<Timestamp, Arc<CommitStatus>>>,
    marker: AtomicU64,
    #[cfg(any(test, feature = "interleave"))]
    hooks: Option<Arc<Interleave>>,
}

impl Default for CheckpointCoordinator {
    fn default() -> Self {
        Self::new(Timestamp::ZERO)
    }
}

impl CheckpointCoordinator {
    /// Creates a coordinator whose last published marker is `marker`.
    pub fn new(marker: Timestamp) -> Self {
        Self {
            section_a: Mutex::new(()),
            section_b: Mutex::new(()),
            in_flight: Mutex::new(BTreeMap::new()),
            marker: AtomicU64::new(marker.get()),
            #[cfg(any(test, feature = "interleave"))]
            hooks: None,
        }
    }

    /// Records section entry and exit in `hooks`.
    #[cfg(any(test, feature = "interleave"))]
    pub fn with_hooks(mut self, hooks: Option<Arc<Interleave>>) -> Self {
        self.hooks = hooks;
        self
    }

    /// The last published marker.
    #[inline]
    pub fn marker(&self) -> Timestamp {
        Timestamp::new(self.marker.load(Ordering::Acquire))
    }

    /// Number of commits between their two sections.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn enter(&self, section: &'static str, actor: &'static str) -> SectionGuard<'_> {
        let lock = match section {
            SECTION_A => self.section_a.lock(),
            _ => self.section_b.lock(),
        };
        trace!(actor, section, "acquire");
        interleave!(self.hooks, |h| h.record(actor, format!("acquire:{section}")));
        SectionGuard {
            coordinator: self,
            section,
            actor,
            _lock: lock,
        }
    }

    /// Commit side of section a: allocates the commit timestamp and marks
    /// the commit in flight.
    pub fn enter_commit(&self, allocate: impl FnOnce() -> Timestamp) -> Arc<CommitStatus> {
        let _section = self.enter(SECTION_A, COMMIT_ACTOR);
        let status = Arc::new(CommitStatus::new(allocate()));
        self.in_flight
            .lock()
            .insert(status.commit_ts(), Arc::clone(&status));
        status
    }

    /// Commit side of section b: the commit is resolved and leaves the
    /// in-flight set.
    pub fn leave_commit(&self, commit_ts: Timestamp) {
        let _section = self.enter(SECTION_B, COMMIT_ACTOR);
        self.in_flight.lock().remove(&commit_ts);
    }

    /// Checkpoint side of section a: allocates the marker and captures every
    /// commit in flight below it.
    pub fn capture(&self, allocate: impl FnOnce() -> Timestamp) -> Capture {
        let _section = self.enter(SECTION_A, CHECKPOINT_ACTOR);
        let marker = allocate();
        let in_flight = self
            .in_flight
            .lock()
            .range(..=marker)
            .map(|(_, status)| Arc::clone(status))
            .collect();
        Capture { marker, in_flight }
    }

    /// Checkpoint side of section b: publishes `marker`. Returns false if a
    /// later marker was already published.
    pub fn advance(&self, marker: Timestamp) -> bool {
        let _section = self.enter(SECTION_B, CHECKPOINT_ACTOR);
        let previous = self.marker.fetch_max(marker.get(), Ordering::AcqRel);
        previous < marker.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    use crate::time::{HlcTimeService, TimeService};

    fn coordinator() -> (CheckpointCoordinator, Arc<Interleave>) {
        let hooks = Arc::new(Interleave::new());
        let coordinator = CheckpointCoordinator::default().with_hooks(Some(Arc::clone(&hooks)));
        (coordinator, hooks)
    }

    #[test]
    fn test_section_events() {
        let (coordinator, hooks) = coordinator();
        let clock = HlcTimeService::logical();

        let status = coordinator.enter_commit(|| clock.now());
        let capture = coordinator.capture(|| clock.now());
        assert_eq!(capture.in_flight(), 1);
        assert!(capture.marker() > status.commit_ts());

        status.resolve(CommitState::Committed);
        coordinator.leave_commit(status.commit_ts());
        assert_eq!(capture.wait(), 0);
        assert!(coordinator.advance(capture.marker()));

        assert_eq!(
            hooks.sequence(CHECKPOINT_ACTOR),
            "acquire:flushOnCheckpoint_a,release:flushOnCheckpoint_a,\
             acquire:flushOnCheckpoint_b,release:flushOnCheckpoint_b,"
        );
        assert_eq!(
            hooks.sequence(COMMIT_ACTOR),
            "acquire:flushOnCheckpoint_a,release:flushOnCheckpoint_a,\
             acquire:flushOnCheckpoint_b,release:flushOnCheckpoint_b,"
        );
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[test]
    fn test_later_commits_not_captured() {
        let (coordinator, _) = coordinator();
        let clock = HlcTimeService::logical();

        let capture = coordinator.capture(|| clock.now());
        let status = coordinator.enter_commit(|| clock.now());
        assert!(status.commit_ts() > capture.marker());
        assert_eq!(capture.in_flight(), 0);
        assert_eq!(capture.wait(), 0);
    }

    #[test]
    fn test_marker_is_monotonic() {
        let coordinator = CheckpointCoordinator::default();
        assert!(coordinator.advance(Timestamp::new(10)));
        assert!(!coordinator.advance(Timestamp::new(5)));
        assert_eq!(coordinator.marker(), Timestamp::new(10));
    }

    #[test]
    fn test_wait_blocks_until_resolved() {
        let coordinator = Arc::new(CheckpointCoordinator::default());
        let clock = HlcTimeService::logical();
        let status = coordinator.enter_commit(|| clock.now());
        let capture = coordinator.capture(|| clock.now());

        let waiter = thread::spawn(move || capture.wait());
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        status.resolve(CommitState::Aborted);
        assert_eq!(waiter.join().unwrap(), 1);
    }
}
