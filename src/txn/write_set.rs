// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Buffered writes of one transaction.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use crate::storage::{CommitRecord, CommitWrite};
use crate::time::Timestamp;
use crate::tree::{Direction, Tree, TreeId};
use crate::value::Value;

struct TreeWrites {
    tree: Arc<Tree>,
    writes: BTreeMap<Vec<u8>, Value>,
}

/// Writes made by a transaction, grouped by tree and ordered by key.
///
/// A removal is buffered as `Value::Undefined` so it shadows the committed
/// value for the transaction's own reads.
#[derive(Default)]
pub struct WriteSet {
    trees: BTreeMap<TreeId, TreeWrites>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of buffered writes.
    pub fn len(&self) -> usize {
        self.trees.values().map(|t| t.writes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.values().all(|t| t.writes.is_empty())
    }

    pub fn clear(&mut self) {
        self.trees.clear();
    }

    /// Buffers `value` at `key`, replacing an earlier write of the same key.
    pub fn put(&mut self, tree: &Arc<Tree>, key: &[u8], value: Value) {
        self.trees
            .entry(tree.id())
            .or_insert_with(|| TreeWrites {
                tree: Arc::clone(tree),
                writes: BTreeMap::new(),
            })
            .writes
            .insert(key.to_vec(), value);
    }

    /// The buffered write at `key`, if any.
    pub fn get(&self, tree: TreeId, key: &[u8]) -> Option<&Value> {
        self.trees.get(&tree)?.writes.get(key)
    }

    /// Nearest buffered write in `direction` from `from` among keys
    /// strictly below `within`. Removals are included.
    pub fn seek(
        &self,
        tree: TreeId,
        from: &[u8],
        inclusive: bool,
        direction: Direction,
        within: &[u8],
    ) -> Option<(&[u8], &Value)> {
        let writes = &self.trees.get(&tree)?.writes;
        let edge = if inclusive {
            Bound::Included(from)
        } else {
            Bound::Excluded(from)
        };
        let found = match direction {
            Direction::Forward => writes.range::<[u8], _>((edge, Bound::Unbounded)).next(),
            Direction::Backward => writes
                .range::<[u8], _>((Bound::Unbounded, edge))
                .next_back(),
        };
        found
            .filter(|(key, _)| key.len() > within.len() && key.starts_with(within))
            .map(|(key, value)| (key.as_slice(), value))
    }

    /// Trees with buffered writes and their writes in key order.
    pub(crate) fn trees(&self) -> impl Iterator<Item = (&Arc<Tree>, &BTreeMap<Vec<u8>, Value>)> {
        self.trees.values().map(|t| (&t.tree, &t.writes))
    }

    /// The journal record for committing these writes at `commit_ts`.
    pub fn to_record(&self, commit_ts: Timestamp) -> CommitRecord {
        let writes = self
            .trees()
            .flat_map(|(tree, writes)| {
                writes.iter().map(move |(key, value)| CommitWrite {
                    tree: tree.name().to_string(),
                    key: key.clone(),
                    value: value.clone(),
                })
            })
            .collect();
        CommitRecord { commit_ts, writes }
    }
}

impl std::fmt::Debug for WriteSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.trees.values().map(|t| (t.tree.name(), t.writes.len())))
            .finish()
    }
}
