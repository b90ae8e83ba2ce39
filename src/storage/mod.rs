// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Durability layer.
//!
//! Trees live in memory; a [`Journal`] makes them recoverable. Every commit
//! appends its write-set as a [`CommitRecord`] before it becomes visible,
//! and every checkpoint stores a [`CheckpointImage`] of all trees at its
//! marker and discards the records the image covers. Recovery loads the
//! newest image and replays the records above its marker.
//!
//! # Example
//!
//! ```no_run
//! use burrowdb::storage::{Journal, RocksJournal, DurabilityMode};
//! use std::path::Path;
//!
//! let journal = RocksJournal::open_with_durability(
//!     Path::new("/tmp/burrow"),
//!     DurabilityMode::FsyncEveryWrite,
//! ).unwrap();
//! let recovered = journal.load().unwrap();
//! println!("{} commits to replay", recovered.commits.len());
//! ```

mod error;
mod journal;
mod memory;
mod rocks;

pub use error::StorageError;
pub use journal::{CheckpointImage, CommitRecord, CommitWrite, Journal, Recovered, TreeImage};
pub use memory::MemoryJournal;
pub use rocks::{DurabilityMode, RocksJournal};
