// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Cursor over one tree.
//!
//! An [`Exchange`] owns a key buffer and a value buffer. Callers build a key
//! with `clear`/`append`/`cut`, then `fetch`, `store`, `remove` or traverse
//! from it. Every operation goes through the context's transaction, so
//! several exchanges in one context share a snapshot and a write-set.
//!
//! Traversal works level by level. With `deep == false`, `next` moves to
//! the next sibling of the current key, skipping its descendants, and
//! `previous` to the preceding sibling. With `deep == true` both visit every
//! stored key in key order, descending into children. Appending
//! [`Segment::Before`] or [`Segment::After`] positions the cursor ahead of
//! the first or past the last child of a key.

use std::fmt;
use std::sync::Arc;

use crate::key::{Key, Segment};
use crate::tree::{Direction, Tree};
use crate::value::Value;

use super::context::TransactionContext;
use super::error::TxnError;

/// Sorts above the first byte of every stored key suffix.
const PAST_DESCENDANTS: u8 = 0xFF;

#[derive(Clone)]
pub struct Exchange<'c> {
    ctx: &'c TransactionContext,
    tree: Arc<Tree>,
    key: Key,
    value: Value,
    ignore_mvcc: bool,
}

impl<'c> Exchange<'c> {
    pub fn new(ctx: &'c TransactionContext, tree: Arc<Tree>) -> Self {
        Self {
            ctx,
            tree,
            key: Key::new(),
            value: Value::Undefined,
            ignore_mvcc: false,
        }
    }

    #[inline]
    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    #[inline]
    pub fn context(&self) -> &'c TransactionContext {
        self.ctx
    }

    #[inline]
    pub fn key(&self) -> &Key {
        &self.key
    }

    #[inline]
    pub fn key_mut(&mut self) -> &mut Key {
        &mut self.key
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[inline]
    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    /// Makes `fetch` and traversal load the packed version history of each
    /// key into the value buffer as `Value::Bytes`.
    pub fn set_ignore_mvcc(&mut self, ignore: bool) -> &mut Self {
        self.ignore_mvcc = ignore;
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.key.clear();
        self
    }

    pub fn append(&mut self, segment: impl Into<Segment>) -> &mut Self {
        self.key.append(segment);
        self
    }

    /// Drops the last key segment.
    pub fn cut(&mut self) -> &mut Self {
        self.key.cut();
        self
    }

    pub fn cut_to(&mut self, depth: usize) -> &mut Self {
        self.key.cut_to(depth);
        self
    }

    /// Replaces this cursor's key with a copy of `other`'s.
    pub fn copy_key_from(&mut self, other: &Exchange<'_>) -> &mut Self {
        other.key.copy_to(&mut self.key);
        self
    }

    /// Loads the value at the current key. A missing key loads
    /// `Value::Undefined`.
    pub fn fetch(&mut self) -> Result<&mut Self, TxnError> {
        self.value = self.load(self.key.encoded())?;
        Ok(self)
    }

    /// Writes the value buffer at the current key.
    pub fn store(&mut self) -> Result<&mut Self, TxnError> {
        self.key.validate_for_store()?;
        let key = self.key.encoded();
        let value = &self.value;
        let tree = &self.tree;
        self.ctx
            .with_txn(|mgr, txn| mgr.write(txn, tree, key, value.clone()))?;
        Ok(self)
    }

    /// Removes the current key. Returns true if it held a defined value.
    pub fn remove(&mut self) -> Result<bool, TxnError> {
        self.key.validate_for_store()?;
        let key = self.key.encoded();
        let tree = &self.tree;
        self.ctx.with_txn(|mgr, txn| {
            let existed = mgr.read(txn, tree, key)?.is_defined();
            mgr.write(txn, tree, key, Value::Undefined)?;
            Ok(existed)
        })
    }

    /// Moves to the next key. Returns false, leaving the key unchanged, when
    /// there is none.
    pub fn next(&mut self, deep: bool) -> Result<bool, TxnError> {
        self.traverse(Direction::Forward, deep)
    }

    /// Moves to the previous key. Returns false, leaving the key unchanged,
    /// when there is none.
    pub fn previous(&mut self, deep: bool) -> Result<bool, TxnError> {
        self.traverse(Direction::Backward, deep)
    }

    fn traverse(&mut self, direction: Direction, deep: bool) -> Result<bool, TxnError> {
        let depth = self.key.depth().max(1);
        // Shallow steps stay among siblings; deep steps cover the whole tree.
        let within = if deep {
            Vec::new()
        } else {
            self.key.prefix(depth - 1).to_vec()
        };
        let mut from = self.key.encoded().to_vec();
        match direction {
            Direction::Forward if !deep && !self.key.is_empty() => from.push(PAST_DESCENDANTS),
            Direction::Backward if self.key.is_empty() => from.push(PAST_DESCENDANTS),
            _ => {}
        }

        let tree = &self.tree;
        let found = self
            .ctx
            .with_txn(|mgr, txn| mgr.seek(txn, tree, &from, false, direction, &within))?;
        let Some((found_key, found_value)) = found else {
            return Ok(false);
        };

        let mut key = Key::from_encoded(&found_key)?;
        if deep {
            self.key = key;
            self.value = if self.ignore_mvcc {
                self.load(&found_key)?
            } else {
                found_value
            };
        } else {
            key.cut_to(depth);
            self.value = if key.encoded() == found_key.as_slice() && !self.ignore_mvcc {
                found_value
            } else {
                self.load(key.encoded())?
            };
            self.key = key;
        }
        Ok(true)
    }

    fn load(&self, key: &[u8]) -> Result<Value, TxnError> {
        if self.ignore_mvcc {
            return Ok(self
                .tree
                .packed_versions(key)
                .map_or(Value::Undefined, Value::Bytes));
        }
        let tree = &self.tree;
        self.ctx.with_txn(|mgr, txn| mgr.read(txn, tree, key))
    }
}

impl fmt::Display for Exchange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tree.name(), self.key)
    }
}

impl fmt::Debug for Exchange<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("tree", &self.tree.name())
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}
