// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Optimistic transactions.
//!
//! This module provides snapshot transactions with:
//! - Reads at the start timestamp, never blocked by writers except while a
//!   commit below the snapshot is writing its journal record
//! - Write-sets buffered per transaction and validated at commit
//! - A retrying `run` combinator for units of work
//!
//! # Key Concepts
//!
//! ## Validation
//!
//! A transaction conflicts when any key it wrote has a version committed by
//! another transaction after its start timestamp. The conflicting
//! transaction is aborted and [`TransactionContext::run`] reruns the unit
//! of work against a fresh snapshot.
//!
//! ## Commit order
//!
//! Commit timestamps come from the engine clock inside the checkpoint
//! handshake, so they are totally ordered and every checkpoint marker
//! falls cleanly between two commits.
//!
//! # Example
//!
//! ```
//! use burrowdb::engine::{Engine, EngineConfig};
//!
//! let engine = Engine::open(EngineConfig::default()).unwrap();
//! let tree = engine.tree("counters").unwrap();
//! let ctx = engine.context();
//!
//! let attempts = ctx.run(10, 1, false, |ctx| {
//!     let mut ex = ctx.exchange(&tree);
//!     ex.append("hits").fetch()?;
//!     let hits = if ex.value().is_defined() { ex.value().get_int()? } else { 0 };
//!     ex.value_mut().put(hits + 1);
//!     ex.store()?;
//!     Ok(())
//! }).unwrap();
//! assert_eq!(attempts, 1);
//! ```

mod context;
mod error;
mod exchange;
mod manager;
mod retry;
mod status;
mod transaction;
mod write_set;

pub use context::TransactionContext;
pub use error::{ConsistencyViolation, TxnError};
pub use exchange::Exchange;
pub use manager::{SnapshotPin, TransactionManager, TxnStats};
pub use retry::RetryPolicy;
pub use status::{CommitState, CommitStatus};
pub use transaction::{Transaction, TxnId, TxnState};
pub use write_set::WriteSet;
