// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Shared commit status.
//!
//! A committing transaction installs its versions before its journal record
//! is durable. Each such version points at one [`CommitStatus`], so readers
//! and the checkpoint can wait for the outcome without touching the
//! transaction itself.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::time::Timestamp;

/// Outcome of a commit as seen by other threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Pending,
    Committed,
    Aborted,
}

/// Resolution handle shared between a commit and the versions it installed.
#[derive(Debug)]
pub struct CommitStatus {
    commit_ts: Timestamp,
    state: Mutex<CommitState>,
    resolved: Condvar,
}

impl CommitStatus {
    pub fn new(commit_ts: Timestamp) -> Self {
        Self {
            commit_ts,
            state: Mutex::new(CommitState::Pending),
            resolved: Condvar::new(),
        }
    }

    #[inline]
    pub fn commit_ts(&self) -> Timestamp {
        self.commit_ts
    }

    pub fn state(&self) -> CommitState {
        *self.state.lock()
    }

    /// Publishes the outcome and wakes every waiter. Only the first call has
    /// an effect.
    pub fn resolve(&self, outcome: CommitState) {
        let mut state = self.state.lock();
        if *state == CommitState::Pending {
            *state = outcome;
            self.resolved.notify_all();
        }
    }

    /// Blocks until the commit is resolved.
    pub fn wait(&self) -> CommitState {
        let mut state = self.state.lock();
        while *state == CommitState::Pending {
            self.resolved.wait(&mut state);
        }
        *state
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning
    /// `Pending` if still unresolved.
    pub fn wait_timeout(&self, timeout: Duration) -> CommitState {
        let mut state = self.state.lock();
        if *state == CommitState::Pending {
            let _ = self
                .resolved
                .wait_while_for(&mut state, |s| *s == CommitState::Pending, timeout);
        }
        *state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_resolve_once() {
        let status = CommitStatus::new(Timestamp::new(7));
        assert_eq!(status.state(), CommitState::Pending);
        status.resolve(CommitState::Committed);
        status.resolve(CommitState::Aborted);
        assert_eq!(status.state(), CommitState::Committed);
        assert_eq!(status.wait(), CommitState::Committed);
    }

    #[test]
    fn test_waiter_wakes() {
        let status = Arc::new(CommitStatus::new(Timestamp::new(1)));
        let waiter = {
            let status = Arc::clone(&status);
            thread::spawn(move || status.wait())
        };
        thread::sleep(Duration::from_millis(20));
        status.resolve(CommitState::Aborted);
        assert_eq!(waiter.join().unwrap(), CommitState::Aborted);
    }

    #[test]
    fn test_wait_timeout() {
        let status = CommitStatus::new(Timestamp::new(1));
        assert_eq!(
            status.wait_timeout(Duration::from_millis(5)),
            CommitState::Pending
        );
    }
}
