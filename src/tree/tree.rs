// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Shared, versioned tree handle.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::time::Timestamp;
use crate::txn::CommitStatus;
use crate::value::{Mvv, Value, Version, Visibility};

use super::BPlusTree;

/// Identifies a tree within an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreeId(pub u32);

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tree#{}", self.0)
    }
}

/// Scan direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// One key of a checkpoint image: the version visible at the marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub key: Vec<u8>,
    pub commit_ts: Timestamp,
    pub value: Value,
}

/// A named, ordered map from encoded keys to multi-version values.
///
/// Every operation takes the tree latch only for its own duration. Readers
/// that meet an in-flight version drop the latch before waiting on it.
pub struct Tree {
    id: TreeId,
    name: String,
    prune_threshold: usize,
    inner: RwLock<BPlusTree<Mvv>>,
}

impl Tree {
    pub fn new(id: TreeId, name: impl Into<String>, fanout: usize, prune_threshold: usize) -> Self {
        Self {
            id,
            name: name.into(),
            prune_threshold,
            inner: RwLock::new(BPlusTree::with_fanout(fanout)),
        }
    }

    #[inline]
    pub fn id(&self) -> TreeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of keys holding at least one version.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Reads the value visible at `snapshot`. Absent keys read as
    /// `Value::Undefined`.
    pub fn fetch(&self, key: &[u8], snapshot: Timestamp) -> Value {
        loop {
            let status = {
                let inner = self.inner.read();
                match inner.get(key).map(|mvv| mvv.resolve(snapshot)) {
                    None | Some(Visibility::Absent) => return Value::Undefined,
                    Some(Visibility::Visible { value, .. }) => return value.clone(),
                    Some(Visibility::Wait(status)) => status,
                }
            };
            status.wait();
        }
    }

    /// Finds the nearest key in `direction` from `from` whose visible value
    /// is defined, staying among keys strictly below `within`: keys that
    /// start with it and are longer. `within` itself is never returned.
    pub fn seek(
        &self,
        from: &[u8],
        inclusive: bool,
        direction: Direction,
        snapshot: Timestamp,
        within: &[u8],
    ) -> Option<(Vec<u8>, Value)> {
        let mut from = from.to_vec();
        let mut inclusive = inclusive;
        loop {
            let (blocked_at, status) = {
                let inner = self.inner.read();
                let iter = match direction {
                    Direction::Forward => inner.range_from(&from, inclusive),
                    Direction::Backward => inner.range_back_from(&from, inclusive),
                };
                let mut blocked = None;
                for (key, mvv) in iter {
                    if key.len() <= within.len() || !key.starts_with(within) {
                        return None;
                    }
                    match mvv.resolve(snapshot) {
                        Visibility::Visible { value, .. } if value.is_defined() => {
                            return Some((key.to_vec(), value.clone()));
                        }
                        Visibility::Visible { .. } | Visibility::Absent => continue,
                        Visibility::Wait(status) => {
                            blocked = Some((key.to_vec(), status));
                            break;
                        }
                    }
                }
                blocked?
            };
            status.wait();
            from = blocked_at;
            inclusive = true;
        }
    }

    /// Newest live version timestamp above `start` at `key`.
    pub fn latest_conflict(&self, key: &[u8], start: Timestamp) -> Option<Timestamp> {
        self.inner
            .read()
            .get(key)
            .and_then(|mvv| mvv.conflict_after(start))
    }

    /// Installs one pending version per write, all resolved by `status`.
    ///
    /// Keys whose version list grows past the prune threshold are pruned
    /// against `horizon` on the way.
    pub fn install_pending<'a>(
        &self,
        writes: impl IntoIterator<Item = (&'a [u8], &'a Value)>,
        status: &Arc<CommitStatus>,
        horizon: Timestamp,
    ) {
        let mut inner = self.inner.write();
        for (key, value) in writes {
            let mvv = inner.get_or_insert_with(key, Mvv::new);
            mvv.install_pending(Arc::clone(status), value.clone());
            if mvv.len() > self.prune_threshold {
                mvv.prune(horizon);
            }
        }
    }

    /// Installs a committed version directly. Used by recovery.
    pub fn install_committed(&self, key: &[u8], ts: Timestamp, value: Value) {
        self.inner
            .write()
            .get_or_insert_with(key, Mvv::new)
            .install_committed(ts, value);
    }

    /// Packed committed version history of `key`, if it has any versions.
    pub fn packed_versions(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.read().get(key).map(Mvv::pack)
    }

    /// Committed version histories of every key starting with `prefix`.
    pub fn versions_under(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<Version>)> {
        let inner = self.inner.read();
        inner
            .range_from(prefix, true)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, mvv)| (key.to_vec(), mvv.committed().collect()))
            .collect()
    }

    /// Prunes every version list against `horizon` and drops keys left with
    /// nothing. Returns the number of keys removed.
    pub fn compact(&self, horizon: Timestamp) -> usize {
        let mut versions = 0;
        let removed = self.inner.write().retain(|_, mvv| {
            versions += mvv.prune(horizon);
            !mvv.is_empty()
        });
        debug!(tree = %self.name, %horizon, versions, keys = removed, "compacted tree");
        removed
    }

    /// The defined value visible at `marker` for every key.
    pub fn image_at(&self, marker: Timestamp) -> Vec<ImageEntry> {
        loop {
            let status = {
                let inner = self.inner.read();
                let mut entries = Vec::new();
                let mut blocked = None;
                for (key, mvv) in inner.iter() {
                    match mvv.resolve(marker) {
                        Visibility::Visible { commit_ts, value } if value.is_defined() => {
                            entries.push(ImageEntry {
                                key: key.to_vec(),
                                commit_ts,
                                value: value.clone(),
                            });
                        }
                        Visibility::Visible { .. } | Visibility::Absent => {}
                        Visibility::Wait(status) => {
                            blocked = Some(status);
                            break;
                        }
                    }
                }
                match blocked {
                    None => return entries,
                    Some(status) => status,
                }
            };
            status.wait();
        }
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}
