// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! In-memory B+tree over encoded keys.
//!
//! All entries live in leaves; interior nodes hold separator keys and child
//! references. Leaves are doubly linked so ordered scans in either direction
//! never go back through the interior levels.
//!
//! ```text
//!                [Interior 0]
//!               /     |      \
//!        [Leaf 0] [Leaf 1] [Leaf 2]
//!           <------>  <------>        (prev/next links)
//! ```
//!
//! Nodes are stored in two arenas and addressed by index. Removal does not
//! merge siblings: a leaf may become empty and scans skip it. Routing stays
//! correct because separators only ever partition the key space. Once at
//! least half the leaves are empty, the arenas are rebuilt from the live
//! entries, so delete-heavy workloads do not grow them without bound.

/// Default maximum number of entries per leaf (and children per interior).
pub const DEFAULT_FANOUT: usize = 64;

const MIN_FANOUT: usize = 4;

type LeafId = usize;
type InteriorId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeRef {
    Leaf(LeafId),
    Interior(InteriorId),
}

#[derive(Debug)]
struct LeafNode<V> {
    keys: Vec<Vec<u8>>,
    values: Vec<V>,
    prev: Option<LeafId>,
    next: Option<LeafId>,
}

impl<V> LeafNode<V> {
    fn empty() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            prev: None,
            next: None,
        }
    }

    fn search(&self, key: &[u8]) -> Result<usize, usize> {
        self.keys.binary_search_by(|k| k.as_slice().cmp(key))
    }
}

/// `children[i]` holds keys in `[separators[i-1], separators[i])`.
#[derive(Debug)]
struct InteriorNode {
    separators: Vec<Vec<u8>>,
    children: Vec<NodeRef>,
}

impl InteriorNode {
    fn child_slot(&self, key: &[u8]) -> usize {
        self.separators.partition_point(|s| s.as_slice() <= key)
    }
}

/// An ordered map from byte keys to `V`.
#[derive(Debug)]
pub struct BPlusTree<V> {
    leaves: Vec<LeafNode<V>>,
    interiors: Vec<InteriorNode>,
    root: NodeRef,
    fanout: usize,
    len: usize,
}

impl<V> Default for BPlusTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> BPlusTree<V> {
    pub fn new() -> Self {
        Self::with_fanout(DEFAULT_FANOUT)
    }

    /// Creates a tree whose nodes split above `fanout` entries.
    pub fn with_fanout(fanout: usize) -> Self {
        Self {
            leaves: vec![LeafNode::empty()],
            interiors: Vec::new(),
            root: NodeRef::Leaf(0),
            fanout: fanout.max(MIN_FANOUT),
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Number of levels from root to leaf.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut node = self.root;
        while let NodeRef::Interior(id) = node {
            height += 1;
            node = self.interiors[id].children[0];
        }
        height
    }

    fn find_leaf(&self, key: &[u8]) -> LeafId {
        let mut node = self.root;
        loop {
            match node {
                NodeRef::Leaf(id) => return id,
                NodeRef::Interior(id) => {
                    let interior = &self.interiors[id];
                    node = interior.children[interior.child_slot(key)];
                }
            }
        }
    }

    fn find_leaf_with_path(&self, key: &[u8]) -> (LeafId, Vec<(InteriorId, usize)>) {
        let mut path = Vec::new();
        let mut node = self.root;
        loop {
            match node {
                NodeRef::Leaf(id) => return (id, path),
                NodeRef::Interior(id) => {
                    let interior = &self.interiors[id];
                    let slot = interior.child_slot(key);
                    path.push((id, slot));
                    node = interior.children[slot];
                }
            }
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let leaf = &self.leaves[self.find_leaf(key)];
        leaf.search(key).ok().map(|i| &leaf.values[i])
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let id = self.find_leaf(key);
        let leaf = &mut self.leaves[id];
        match leaf.search(key) {
            Ok(i) => Some(&mut leaf.values[i]),
            Err(_) => None,
        }
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or replaces, returning the previous value.
    pub fn insert(&mut self, key: &[u8], value: V) -> Option<V> {
        let (leaf_id, path) = self.find_leaf_with_path(key);
        let leaf = &mut self.leaves[leaf_id];
        match leaf.search(key) {
            Ok(i) => Some(std::mem::replace(&mut leaf.values[i], value)),
            Err(i) => {
                leaf.keys.insert(i, key.to_vec());
                leaf.values.insert(i, value);
                self.len += 1;
                if self.leaves[leaf_id].keys.len() > self.fanout {
                    self.split_leaf(leaf_id, path);
                }
                None
            }
        }
    }

    /// Returns the value at `key`, inserting `make()` first if absent.
    pub fn get_or_insert_with(&mut self, key: &[u8], make: impl FnOnce() -> V) -> &mut V {
        if !self.contains_key(key) {
            self.insert(key, make());
        }
        let id = self.find_leaf(key);
        let leaf = &mut self.leaves[id];
        let i = match leaf.search(key) {
            Ok(i) | Err(i) => i,
        };
        &mut leaf.values[i]
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        let id = self.find_leaf(key);
        let leaf = &mut self.leaves[id];
        let i = leaf.search(key).ok()?;
        leaf.keys.remove(i);
        let value = leaf.values.remove(i);
        let emptied = leaf.keys.is_empty();
        self.len -= 1;
        if emptied {
            self.reclaim();
        }
        Some(value)
    }

    /// Keeps only the entries for which `keep` returns true. Returns the
    /// number removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&[u8], &mut V) -> bool) -> usize {
        let mut removed = 0;
        let mut cursor = Some(self.leftmost_leaf());
        while let Some(id) = cursor {
            let leaf = &mut self.leaves[id];
            let keys = std::mem::take(&mut leaf.keys);
            let values = std::mem::take(&mut leaf.values);
            for (k, mut v) in keys.into_iter().zip(values) {
                if keep(&k, &mut v) {
                    leaf.keys.push(k);
                    leaf.values.push(v);
                } else {
                    removed += 1;
                }
            }
            cursor = leaf.next;
        }
        self.len -= removed;
        if removed > 0 {
            self.reclaim();
        }
        removed
    }

    /// Rebuilds the arenas from the live entries when at least half the
    /// leaves are empty.
    fn reclaim(&mut self) {
        let empty = self.leaves.iter().filter(|l| l.keys.is_empty()).count();
        if self.leaves.len() < 2 || empty * 2 < self.leaves.len() {
            return;
        }
        let mut entries = Vec::with_capacity(self.len);
        let mut cursor = Some(self.leftmost_leaf());
        while let Some(id) = cursor {
            let leaf = &mut self.leaves[id];
            let keys = std::mem::take(&mut leaf.keys);
            let values = std::mem::take(&mut leaf.values);
            entries.extend(keys.into_iter().zip(values));
            cursor = leaf.next;
        }
        *self = Self::with_fanout(self.fanout);
        for (key, value) in entries {
            self.insert(&key, value);
        }
    }

    /// Number of leaves in the arena, empty ones included.
    #[cfg(test)]
    fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    fn split_leaf(&mut self, leaf_id: LeafId, path: Vec<(InteriorId, usize)>) {
        let new_id = self.leaves.len();
        let left = &mut self.leaves[leaf_id];
        let mid = left.keys.len() / 2;
        let right = LeafNode {
            keys: left.keys.split_off(mid),
            values: left.values.split_off(mid),
            prev: Some(leaf_id),
            next: left.next,
        };
        left.next = Some(new_id);
        let separator = right.keys[0].clone();
        if let Some(next) = right.next {
            self.leaves[next].prev = Some(new_id);
        }
        self.leaves.push(right);
        self.propagate_split(path, separator, NodeRef::Leaf(leaf_id), NodeRef::Leaf(new_id));
    }

    fn propagate_split(
        &mut self,
        mut path: Vec<(InteriorId, usize)>,
        separator: Vec<u8>,
        left: NodeRef,
        right: NodeRef,
    ) {
        let Some((parent_id, slot)) = path.pop() else {
            let root = self.interiors.len();
            self.interiors.push(InteriorNode {
                separators: vec![separator],
                children: vec![left, right],
            });
            self.root = NodeRef::Interior(root);
            return;
        };

        let parent = &mut self.interiors[parent_id];
        parent.separators.insert(slot, separator);
        parent.children.insert(slot + 1, right);
        if parent.children.len() <= self.fanout {
            return;
        }

        let mid = parent.separators.len() / 2;
        let right_separators = parent.separators.split_off(mid + 1);
        let promoted = parent.separators.pop().unwrap_or_default();
        let right_children = parent.children.split_off(mid + 1);
        let new_id = self.interiors.len();
        self.interiors.push(InteriorNode {
            separators: right_separators,
            children: right_children,
        });
        self.propagate_split(
            path,
            promoted,
            NodeRef::Interior(parent_id),
            NodeRef::Interior(new_id),
        );
    }

    fn leftmost_leaf(&self) -> LeafId {
        let mut node = self.root;
        loop {
            match node {
                NodeRef::Leaf(id) => return id,
                NodeRef::Interior(id) => node = self.interiors[id].children[0],
            }
        }
    }

    fn rightmost_leaf(&self) -> LeafId {
        let mut node = self.root;
        loop {
            match node {
                NodeRef::Leaf(id) => return id,
                NodeRef::Interior(id) => {
                    let children = &self.interiors[id].children;
                    node = children[children.len() - 1];
                }
            }
        }
    }

    /// Ascending iterator over every entry.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            tree: self,
            leaf: Some(self.leftmost_leaf()),
            idx: 0,
            forward: true,
        }
    }

    /// Descending iterator over every entry.
    pub fn iter_rev(&self) -> Iter<'_, V> {
        let leaf = self.rightmost_leaf();
        Iter {
            tree: self,
            leaf: Some(leaf),
            idx: self.leaves[leaf].keys.len(),
            forward: false,
        }
    }

    /// Ascending iterator starting at the first key `>= from` (or `> from`
    /// when `inclusive` is false).
    pub fn range_from(&self, from: &[u8], inclusive: bool) -> Iter<'_, V> {
        let id = self.find_leaf(from);
        let keys = &self.leaves[id].keys;
        let idx = if inclusive {
            keys.partition_point(|k| k.as_slice() < from)
        } else {
            keys.partition_point(|k| k.as_slice() <= from)
        };
        Iter {
            tree: self,
            leaf: Some(id),
            idx,
            forward: true,
        }
    }

    /// Descending iterator starting at the last key `<= from` (or `< from`
    /// when `inclusive` is false).
    pub fn range_back_from(&self, from: &[u8], inclusive: bool) -> Iter<'_, V> {
        let id = self.find_leaf(from);
        let keys = &self.leaves[id].keys;
        let idx = if inclusive {
            keys.partition_point(|k| k.as_slice() <= from)
        } else {
            keys.partition_point(|k| k.as_slice() < from)
        };
        Iter {
            tree: self,
            leaf: Some(id),
            idx,
            forward: false,
        }
    }

    pub fn first(&self) -> Option<(&[u8], &V)> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<(&[u8], &V)> {
        self.iter_rev().next()
    }
}

/// Leaf-chain iterator in either direction.
///
/// Forward: `idx` is the next entry to yield in `leaf`. Backward: `idx` is
/// one past the next entry to yield.
pub struct Iter<'a, V> {
    tree: &'a BPlusTree<V>,
    leaf: Option<LeafId>,
    idx: usize,
    forward: bool,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        loop {
            let leaf = &tree.leaves[self.leaf?];
            if self.forward {
                if self.idx < leaf.keys.len() {
                    let i = self.idx;
                    self.idx += 1;
                    return Some((leaf.keys[i].as_slice(), &leaf.values[i]));
                }
                self.leaf = leaf.next;
                self.idx = 0;
            } else {
                if self.idx > 0 {
                    self.idx -= 1;
                    let i = self.idx;
                    return Some((leaf.keys[i].as_slice(), &leaf.values[i]));
                }
                self.leaf = leaf.prev;
                self.idx = self.leaf.map_or(0, |id| tree.leaves[id].keys.len());
            }
        }
    }
}
