// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! BurrowDB: the transactional core of an embedded key-value engine
//!
//! This crate provides ordered multi-segment keys, multi-version values
//! stored in named B+trees, optimistic snapshot transactions with a
//! retrying `run` combinator, and checkpoints that never cover a commit
//! still writing its journal record.

#[macro_use]
mod macros;

pub mod checkpoint;
pub mod engine;
pub mod key;
pub mod storage;
pub mod time;
pub mod tree;
pub mod txn;
pub mod value;

pub use engine::{ClockKind, Engine, EngineConfig, EngineError, EngineStats, MvvReport};
pub use key::{Key, KeyError, Segment};
pub use storage::{DurabilityMode, Journal, MemoryJournal, RocksJournal, StorageError};
pub use time::{HlcTimeService, TimeService, Timestamp};
pub use tree::{Direction, Tree, TreeId};
pub use txn::{Exchange, RetryPolicy, TransactionContext, TransactionManager, TxnError, TxnState};
pub use value::{Value, ValueError, ValueType};
