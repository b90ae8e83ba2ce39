// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Durable record of commits and checkpoints.

use crate::time::Timestamp;
use crate::tree::ImageEntry;
use crate::value::mvv::{self, Version};
use crate::value::varint::{put_chunk, put_varint, Reader};
use crate::value::Value;

use super::StorageError;

/// One write of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitWrite {
    pub tree: String,
    pub key: Vec<u8>,
    pub value: Value,
}

/// The write-set of one committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub commit_ts: Timestamp,
    pub writes: Vec<CommitWrite>,
}

impl CommitRecord {
    /// `commit_ts: u64 BE, varint(count), { chunk(tree), chunk(key), chunk(value) }*`
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.commit_ts.to_be_bytes());
        put_varint(&mut buf, self.writes.len() as u64);
        for write in &self.writes {
            put_chunk(&mut buf, write.tree.as_bytes());
            put_chunk(&mut buf, &write.key);
            put_chunk(&mut buf, &write.value.encode());
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, StorageError> {
        let mut r = Reader::new(buf);
        let commit_ts = Timestamp::new(r.u64()?);
        let count = r.varint()?;
        let mut writes = Vec::new();
        for _ in 0..count {
            let tree = tree_name(r.chunk()?)?;
            let key = r.chunk()?.to_vec();
            let value = Value::decode(r.chunk()?)?;
            writes.push(CommitWrite { tree, key, value });
        }
        if !r.is_empty() {
            return Err(StorageError::Corruption(format!(
                "trailing bytes in commit record {commit_ts}"
            )));
        }
        Ok(Self { commit_ts, writes })
    }
}

/// Every defined value of one tree as of a checkpoint marker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeImage {
    pub name: String,
    pub entries: Vec<ImageEntry>,
}

/// A transactionally consistent snapshot of every tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckpointImage {
    pub marker: Timestamp,
    pub trees: Vec<TreeImage>,
}

impl CheckpointImage {
    /// `marker: u64 BE, varint(trees), { chunk(name), varint(n), { chunk(key), chunk(mvv) }* }*`
    ///
    /// Each entry's value is stored as a one-version MVV blob.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.marker.to_be_bytes());
        put_varint(&mut buf, self.trees.len() as u64);
        for tree in &self.trees {
            put_chunk(&mut buf, tree.name.as_bytes());
            put_varint(&mut buf, tree.entries.len() as u64);
            for entry in &tree.entries {
                put_chunk(&mut buf, &entry.key);
                put_chunk(&mut buf, &entry_blob(entry));
            }
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, StorageError> {
        let mut r = Reader::new(buf);
        let marker = Timestamp::new(r.u64()?);
        let tree_count = r.varint()?;
        let mut trees = Vec::new();
        for _ in 0..tree_count {
            let name = tree_name(r.chunk()?)?;
            let count = r.varint()?;
            let mut entries = Vec::new();
            for _ in 0..count {
                let key = r.chunk()?.to_vec();
                entries.push(entry_from_blob(key, r.chunk()?)?);
            }
            trees.push(TreeImage { name, entries });
        }
        if !r.is_empty() {
            return Err(StorageError::Corruption(format!(
                "trailing bytes in checkpoint image {marker}"
            )));
        }
        Ok(Self { marker, trees })
    }

    /// Total number of entries across all trees.
    pub fn entry_count(&self) -> usize {
        self.trees.iter().map(|t| t.entries.len()).sum()
    }
}

pub(crate) fn entry_blob(entry: &ImageEntry) -> Vec<u8> {
    mvv::pack([Version {
        commit_ts: entry.commit_ts,
        value: entry.value.clone(),
    }])
}

pub(crate) fn entry_from_blob(key: Vec<u8>, blob: &[u8]) -> Result<ImageEntry, StorageError> {
    let mut versions = mvv::unpack(blob)?;
    match (versions.pop(), versions.is_empty()) {
        (Some(Version { commit_ts, value }), true) => Ok(ImageEntry {
            key,
            commit_ts,
            value,
        }),
        _ => Err(StorageError::Corruption(
            "checkpoint entry must hold exactly one version".to_string(),
        )),
    }
}

pub(crate) fn tree_name(bytes: &[u8]) -> Result<String, StorageError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| StorageError::Corruption("tree name is not valid UTF-8".to_string()))
}

/// What a journal holds after a restart.
#[derive(Debug, Clone, Default)]
pub struct Recovered {
    /// The newest checkpoint, if one was ever written.
    pub image: Option<CheckpointImage>,
    /// Commits above the checkpoint marker, ascending by commit timestamp.
    pub commits: Vec<CommitRecord>,
}

impl Recovered {
    /// Highest timestamp present in the recovered state.
    pub fn max_timestamp(&self) -> Timestamp {
        let marker = self.image.as_ref().map_or(Timestamp::ZERO, |i| i.marker);
        self.commits
            .iter()
            .map(|c| c.commit_ts)
            .fold(marker, Timestamp::max)
    }
}

/// Durable log beneath the transactional layer.
pub trait Journal: Send + Sync {
    /// Durably records a commit. Must complete before the commit is
    /// published to readers.
    fn append_commit(&self, record: &CommitRecord) -> Result<(), StorageError>;

    /// Atomically replaces the stored checkpoint with `image` and discards
    /// commit records at or below its marker.
    fn write_checkpoint(&self, image: &CheckpointImage) -> Result<(), StorageError>;

    /// Loads the newest checkpoint and every later commit.
    fn load(&self) -> Result<Recovered, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CommitRecord {
        CommitRecord {
            commit_ts: Timestamp::new(42),
            writes: vec![
                CommitWrite {
                    tree: "accounts".into(),
                    key: vec![0x30, b'a', 0, 0],
                    value: Value::Int(-5),
                },
                CommitWrite {
                    tree: "accounts".into(),
                    key: vec![0x30, b'b', 0, 0],
                    value: Value::Undefined,
                },
            ],
        }
    }

    #[test]
    fn test_commit_record_round_trip() {
        let record = record();
        assert_eq!(CommitRecord::decode(&record.encode()).unwrap(), record);
    }

    #[test]
    fn test_commit_record_corruption() {
        let mut bytes = record().encode();
        bytes.push(7);
        assert!(matches!(
            CommitRecord::decode(&bytes),
            Err(StorageError::Corruption(_))
        ));
        assert!(matches!(
            CommitRecord::decode(&bytes[..5]),
            Err(StorageError::Encoding(_))
        ));
    }

    #[test]
    fn test_image_round_trip() {
        let image = CheckpointImage {
            marker: Timestamp::new(100),
            trees: vec![
                TreeImage {
                    name: "a".into(),
                    entries: vec![ImageEntry {
                        key: b"k1".to_vec(),
                        commit_ts: Timestamp::new(99),
                        value: Value::from("RED FOX"),
                    }],
                },
                TreeImage::default(),
            ],
        };
        let decoded = CheckpointImage::decode(&image.encode()).unwrap();
        assert_eq!(decoded, image);
        assert_eq!(decoded.entry_count(), 1);
    }

    #[test]
    fn test_entry_blob_requires_one_version() {
        let blob = mvv::pack([]);
        assert!(entry_from_blob(b"k".to_vec(), &blob).is_err());
    }

    #[test]
    fn test_max_timestamp() {
        let mut recovered = Recovered::default();
        assert_eq!(recovered.max_timestamp(), Timestamp::ZERO);
        recovered.image = Some(CheckpointImage {
            marker: Timestamp::new(10),
            trees: vec![],
        });
        recovered.commits.push(record());
        assert_eq!(recovered.max_timestamp(), Timestamp::new(42));
    }
}
