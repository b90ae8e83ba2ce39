// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Multi-version values.
//!
//! Every key in a tree maps to an [`Mvv`]: the versions written to it,
//! ordered by commit timestamp ascending. A version is either committed or
//! pending, in which case it carries the [`CommitStatus`] of the commit that
//! installed it.
//!
//! Packed layout, used for diagnostics and checkpoint images:
//!
//! ```text
//! varint(count) { commit_ts: u64 BE, varint(payload_len), payload }*
//! ```

use std::fmt;
use std::sync::Arc;

use crate::time::Timestamp;
use crate::txn::{CommitState, CommitStatus};

use super::varint::{put_chunk, put_varint, Reader};
use super::{Value, ValueError};

/// One committed version, as exposed by [`Value::unpack_versions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub commit_ts: Timestamp,
    pub value: Value,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.commit_ts, self.value)
    }
}

#[derive(Debug, Clone)]
enum VersionState {
    Committed,
    Pending(Arc<CommitStatus>),
}

#[derive(Debug, Clone)]
struct StoredVersion {
    ts: Timestamp,
    state: VersionState,
    value: Value,
}

impl StoredVersion {
    fn commit_state(&self) -> CommitState {
        match &self.state {
            VersionState::Committed => CommitState::Committed,
            VersionState::Pending(status) => status.state(),
        }
    }
}

/// Result of resolving an MVV at a snapshot.
#[derive(Debug)]
pub enum Visibility<'a> {
    /// The newest committed version at or below the snapshot.
    Visible {
        commit_ts: Timestamp,
        value: &'a Value,
    },
    /// No version is visible.
    Absent,
    /// A version at or below the snapshot is still committing. The caller
    /// must wait on the status and resolve again.
    Wait(Arc<CommitStatus>),
}

/// The version list of a single key.
#[derive(Debug, Clone, Default)]
pub struct Mvv {
    versions: Vec<StoredVersion>,
}

impl Mvv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored versions, including pending and aborted ones.
    #[inline]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Resolves the version visible to a reader whose snapshot is `snapshot`.
    pub fn resolve(&self, snapshot: Timestamp) -> Visibility<'_> {
        for version in self.versions.iter().rev() {
            if version.ts > snapshot {
                continue;
            }
            match version.commit_state() {
                CommitState::Committed => {
                    return Visibility::Visible {
                        commit_ts: version.ts,
                        value: &version.value,
                    }
                }
                CommitState::Aborted => continue,
                CommitState::Pending => {
                    if let VersionState::Pending(status) = &version.state {
                        return Visibility::Wait(Arc::clone(status));
                    }
                }
            }
        }
        Visibility::Absent
    }

    /// Newest committed or pending version timestamp above `start`, if any.
    ///
    /// A transaction that started at `start` and wants to write this key
    /// conflicts when this returns `Some`.
    pub fn conflict_after(&self, start: Timestamp) -> Option<Timestamp> {
        self.versions
            .iter()
            .rev()
            .take_while(|v| v.ts > start)
            .find(|v| v.commit_state() != CommitState::Aborted)
            .map(|v| v.ts)
    }

    /// Adds a version whose outcome is decided by `status`.
    pub fn install_pending(&mut self, status: Arc<CommitStatus>, value: Value) {
        let ts = status.commit_ts();
        self.insert(StoredVersion {
            ts,
            state: VersionState::Pending(status),
            value,
        });
    }

    /// Adds an already committed version.
    pub fn install_committed(&mut self, ts: Timestamp, value: Value) {
        self.insert(StoredVersion {
            ts,
            state: VersionState::Committed,
            value,
        });
    }

    fn insert(&mut self, version: StoredVersion) {
        let at = self.versions.partition_point(|v| v.ts <= version.ts);
        self.versions.insert(at, version);
    }

    /// Drops versions no reader at or after `horizon` can see.
    ///
    /// Resolved pending versions become committed, aborted ones are removed,
    /// and every committed version older than the newest one at or below
    /// `horizon` is discarded. If what remains is a single undefined version
    /// at or below the horizon, the list is emptied. Returns the number of
    /// versions removed.
    pub fn prune(&mut self, horizon: Timestamp) -> usize {
        let before = self.versions.len();

        self.versions.retain_mut(|v| match v.commit_state() {
            CommitState::Committed => {
                v.state = VersionState::Committed;
                true
            }
            CommitState::Aborted => false,
            CommitState::Pending => true,
        });

        let floor = self
            .versions
            .iter()
            .rposition(|v| v.ts <= horizon && matches!(v.state, VersionState::Committed));
        if let Some(floor) = floor {
            self.versions.drain(..floor);
        }

        if let [only] = self.versions.as_slice() {
            if only.ts <= horizon
                && !only.value.is_defined()
                && matches!(only.state, VersionState::Committed)
            {
                self.versions.clear();
            }
        }

        before - self.versions.len()
    }

    /// Committed versions, oldest first.
    pub fn committed(&self) -> impl Iterator<Item = Version> + '_ {
        self.versions
            .iter()
            .filter(|v| v.commit_state() == CommitState::Committed)
            .map(|v| Version {
                commit_ts: v.ts,
                value: v.value.clone(),
            })
    }

    /// Packs the committed versions into a blob.
    pub fn pack(&self) -> Vec<u8> {
        pack(self.committed())
    }

    /// Rebuilds an MVV from a packed blob. All versions are committed.
    pub fn from_packed(blob: &[u8]) -> Result<Self, ValueError> {
        let mut mvv = Mvv::new();
        for version in unpack(blob)? {
            mvv.install_committed(version.commit_ts, version.value);
        }
        Ok(mvv)
    }
}

/// Packs versions, which must be in ascending timestamp order.
pub fn pack(versions: impl IntoIterator<Item = Version>) -> Vec<u8> {
    let versions: Vec<Version> = versions.into_iter().collect();
    let mut buf = Vec::new();
    put_varint(&mut buf, versions.len() as u64);
    for version in &versions {
        buf.extend_from_slice(&version.commit_ts.to_be_bytes());
        put_chunk(&mut buf, &version.value.encode());
    }
    buf
}

/// Decodes a packed blob.
pub fn unpack(blob: &[u8]) -> Result<Vec<Version>, ValueError> {
    let mut reader = Reader::new(blob);
    let count = reader.varint()?;
    let mut versions = Vec::new();
    let mut last: Option<Timestamp> = None;
    for _ in 0..count {
        let commit_ts = Timestamp::new(reader.u64()?);
        if last.is_some_and(|prev| prev >= commit_ts) {
            return Err(ValueError::MalformedMvv(format!(
                "timestamp {commit_ts} out of order"
            )));
        }
        let value = Value::decode(reader.chunk()?)?;
        versions.push(Version { commit_ts, value });
        last = Some(commit_ts);
    }
    if !reader.is_empty() {
        return Err(ValueError::MalformedMvv("trailing bytes".to_string()));
    }
    Ok(versions)
}
