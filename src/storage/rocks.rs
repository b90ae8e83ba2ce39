// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! RocksDB-backed journal.
//!
//! Key layout:
//!
//! ```text
//! [0x01][commit_ts: u64 BE]                 -> encoded CommitRecord
//! [0x02]                                    -> checkpoint marker (u64 BE)
//! [0x03][chunk(tree name)][encoded key]     -> one-version MVV blob
//! ```

use std::path::Path;

use rocksdb::{
    DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options, WriteBatch, WriteOptions,
};
use tracing::{debug, info};

use crate::time::Timestamp;
use crate::value::varint::{put_chunk, Reader};

use super::journal::{entry_blob, entry_from_blob, tree_name};
use super::{CheckpointImage, CommitRecord, Journal, Recovered, StorageError, TreeImage};

const COMMIT_PREFIX: u8 = 0x01;
const MARKER_KEY: [u8; 1] = [0x02];
const IMAGE_PREFIX: u8 = 0x03;
const IMAGE_END: u8 = 0x04;

/// Durability mode for commit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// Writes are synced to WAL but not fsynced to disk.
    /// Durable against process crashes but not power failures.
    #[default]
    WalOnly,
    /// Writes are fsynced to disk on every commit.
    /// Durable against power failures but slower.
    FsyncEveryWrite,
}

/// Journal stored in a RocksDB database.
///
/// Checkpoints are always written with fsync, regardless of the durability
/// mode used for commit records.
pub struct RocksJournal {
    db: DBWithThreadMode<MultiThreaded>,
    write_opts: WriteOptions,
    sync_write_opts: WriteOptions,
}

impl RocksJournal {
    /// Opens or creates a journal at the given path with `WalOnly` durability.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Self::open_with_durability(path, DurabilityMode::default())
    }

    /// Opens or creates a journal with the specified durability mode.
    pub fn open_with_durability(
        path: &Path,
        durability: DurabilityMode,
    ) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Append-mostly log with periodic range deletes.
        opts.set_write_buffer_size(64 * 1024 * 1024); // 64MB
        opts.set_max_write_buffer_number(4);
        opts.set_target_file_size_base(64 * 1024 * 1024);
        opts.set_level_compaction_dynamic_level_bytes(true);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);

        let db = DBWithThreadMode::open(&opts, path)?;

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(durability == DurabilityMode::FsyncEveryWrite);

        let mut sync_write_opts = WriteOptions::default();
        sync_write_opts.set_sync(true);

        info!(path = %path.display(), ?durability, "opened journal");
        Ok(Self {
            db,
            write_opts,
            sync_write_opts,
        })
    }

    /// Flushes memtables to disk.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn commit_key(ts: Timestamp) -> [u8; 9] {
        let mut key = [0u8; 9];
        key[0] = COMMIT_PREFIX;
        key[1..].copy_from_slice(&ts.to_be_bytes());
        key
    }

    fn image_key(tree: &str, key: &[u8]) -> Vec<u8> {
        let mut out = vec![IMAGE_PREFIX];
        put_chunk(&mut out, tree.as_bytes());
        out.extend_from_slice(key);
        out
    }

    fn marker(&self) -> Result<Timestamp, StorageError> {
        match self.db.get(MARKER_KEY)? {
            None => Ok(Timestamp::ZERO),
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StorageError::Corruption(format!("marker has {} bytes", bytes.len()))
                })?;
                Ok(Timestamp::from_be_bytes(raw))
            }
        }
    }

    fn load_image(&self, marker: Timestamp) -> Result<CheckpointImage, StorageError> {
        let mut trees: Vec<TreeImage> = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(&[IMAGE_PREFIX], Direction::Forward));
        for item in iter {
            let (key, blob) = item?;
            if key.first() != Some(&IMAGE_PREFIX) {
                break;
            }
            let mut r = Reader::new(&key[1..]);
            let name = tree_name(r.chunk()?)?;
            let entry = entry_from_blob(r.rest().to_vec(), &blob)?;
            match trees.last_mut() {
                Some(tree) if tree.name == name => tree.entries.push(entry),
                _ => trees.push(TreeImage {
                    name,
                    entries: vec![entry],
                }),
            }
        }
        // Image keys order trees by encoded name length first.
        trees.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(CheckpointImage { marker, trees })
    }
}

impl Journal for RocksJournal {
    fn append_commit(&self, record: &CommitRecord) -> Result<(), StorageError> {
        self.db.put_opt(
            Self::commit_key(record.commit_ts),
            record.encode(),
            &self.write_opts,
        )?;
        Ok(())
    }

    fn write_checkpoint(&self, image: &CheckpointImage) -> Result<(), StorageError> {
        let current = self.marker()?;
        if image.marker < current {
            return Err(StorageError::StaleCheckpoint {
                marker: image.marker.get(),
                current: current.get(),
            });
        }

        let mut batch = WriteBatch::default();
        batch.delete_range([IMAGE_PREFIX], [IMAGE_END]);
        for tree in &image.trees {
            for entry in &tree.entries {
                batch.put(Self::image_key(&tree.name, &entry.key), entry_blob(entry));
            }
        }
        batch.put(MARKER_KEY, image.marker.to_be_bytes());
        batch.delete_range(
            Self::commit_key(Timestamp::ZERO),
            Self::commit_key(image.marker.next()),
        );
        self.db.write_opt(batch, &self.sync_write_opts)?;

        debug!(marker = %image.marker, entries = image.entry_count(), "wrote checkpoint image");
        Ok(())
    }

    fn load(&self) -> Result<Recovered, StorageError> {
        let marker = self.marker()?;
        let image = if self.db.get(MARKER_KEY)?.is_some() {
            Some(self.load_image(marker)?)
        } else {
            None
        };

        let start = Self::commit_key(marker.next());
        let mut commits = Vec::new();
        for item in self.db.iterator(IteratorMode::From(&start, Direction::Forward)) {
            let (key, bytes) = item?;
            if key.first() != Some(&COMMIT_PREFIX) {
                break;
            }
            commits.push(CommitRecord::decode(&bytes)?);
        }

        info!(
            %marker,
            image_entries = image.as_ref().map_or(0, CheckpointImage::entry_count),
            commits = commits.len(),
            "loaded journal"
        );
        Ok(Recovered { image, commits })
    }
}
