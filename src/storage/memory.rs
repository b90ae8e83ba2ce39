// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! In-process journal.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::time::Timestamp;

use super::{CheckpointImage, CommitRecord, Journal, Recovered, StorageError};

#[derive(Default)]
struct MemoryState {
    commits: BTreeMap<Timestamp, Vec<u8>>,
    image: Option<Vec<u8>>,
    marker: Timestamp,
    #[cfg(test)]
    fail_appends: usize,
}

/// A journal held in memory, for engines opened without a data directory.
///
/// Records are kept in their encoded form so the codec is exercised the same
/// way as with the RocksDB journal.
#[derive(Default)]
pub struct MemoryJournal {
    state: Mutex<MemoryState>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commit records not yet covered by a checkpoint.
    pub fn pending_records(&self) -> usize {
        self.state.lock().commits.len()
    }

    /// Makes the next `count` appends fail with an I/O error.
    #[cfg(test)]
    pub(crate) fn fail_next_appends(&self, count: usize) {
        self.state.lock().fail_appends = count;
    }
}

impl Journal for MemoryJournal {
    fn append_commit(&self, record: &CommitRecord) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        #[cfg(test)]
        if state.fail_appends > 0 {
            state.fail_appends -= 1;
            return Err(StorageError::Io(std::io::Error::other("injected append failure")));
        }
        state.commits.insert(record.commit_ts, record.encode());
        Ok(())
    }

    fn write_checkpoint(&self, image: &CheckpointImage) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if image.marker < state.marker {
            return Err(StorageError::StaleCheckpoint {
                marker: image.marker.get(),
                current: state.marker.get(),
            });
        }
        state.image = Some(image.encode());
        state.marker = image.marker;
        state.commits = state.commits.split_off(&image.marker.next());
        Ok(())
    }

    fn load(&self) -> Result<Recovered, StorageError> {
        let state = self.state.lock();
        let image = state
            .image
            .as_deref()
            .map(CheckpointImage::decode)
            .transpose()?;
        let commits = state
            .commits
            .values()
            .map(|bytes| CommitRecord::decode(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Recovered { image, commits })
    }
}
