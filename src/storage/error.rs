// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Storage error types.

use crate::key::KeyError;
use crate::value::ValueError;

/// Errors that can occur in journal and recovery operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage corruption: {0}")]
    Corruption(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("invalid record encoding: {0}")]
    Encoding(#[from] ValueError),

    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(#[from] KeyError),

    #[error("checkpoint marker {marker} is behind the current marker {current}")]
    StaleCheckpoint { marker: u64, current: u64 },
}
