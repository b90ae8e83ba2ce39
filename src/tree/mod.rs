// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Ordered trees.
//!
//! [`BPlusTree`] is the plain ordered structure. [`Tree`] wraps one holding
//! an [`Mvv`](crate::value::Mvv) per key behind a latch and answers
//! snapshot reads, ordered seeks, conflict probes and checkpoint images.

mod btree;
#[allow(clippy::module_inception)]
mod tree;

pub use btree::{BPlusTree, Iter, DEFAULT_FANOUT};
pub use tree::{Direction, ImageEntry, Tree, TreeId};
