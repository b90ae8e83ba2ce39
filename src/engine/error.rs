// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Engine error types.

use crate::storage::StorageError;
use crate::txn::TxnError;

/// Errors that can occur while opening, recovering or checkpointing an
/// engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transaction error: {0}")]
    Txn(#[from] TxnError),

    #[error("invalid tree name {name:?}: {reason}")]
    InvalidTreeName { name: String, reason: &'static str },

    #[error("failed to start checkpoint thread: {0}")]
    Thread(#[source] std::io::Error),
}
