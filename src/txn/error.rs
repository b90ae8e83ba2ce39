// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Transaction error types.

use std::fmt;

use crate::key::KeyError;
use crate::storage::StorageError;
use crate::time::Timestamp;
use crate::value::ValueError;

use super::TxnState;

/// A stored total that disagrees with the sum of its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyViolation {
    /// Display form of the key holding the total.
    pub key: String,
    pub expected: i64,
    pub actual: i64,
    /// Version history of the affected keys, if one was collected.
    pub report: Option<String>,
}

impl fmt::Display for ConsistencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total at {} is {} but its parts sum to {}",
            self.key, self.expected, self.actual
        )?;
        if let Some(report) = &self.report {
            write!(f, "\n{report}")?;
        }
        Ok(())
    }
}

/// Errors that can occur in transaction operations.
#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    #[error("write conflict on {key} in {tree}: committed at {ts} after this transaction started")]
    Conflict {
        tree: String,
        key: String,
        ts: Timestamp,
    },

    #[error("gave up after {attempts} attempts")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<TxnError>,
    },

    #[error("consistency violation: {0}")]
    Consistency(Box<ConsistencyViolation>),

    #[error("value is undefined")]
    UndefinedValue,

    #[error("transaction is {state}, expected active")]
    NotActive { state: TxnState },

    #[error("transaction was rolled back by a nested scope")]
    RollbackPending,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid key: {0}")]
    Key(#[from] KeyError),

    #[error("invalid value: {0}")]
    Value(#[from] ValueError),
}

impl TxnError {
    /// True when rerunning the unit of work with a fresh snapshot may
    /// succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TxnError::Conflict { .. })
    }

    /// Builds a consistency violation error.
    pub fn consistency(key: impl fmt::Display, expected: i64, actual: i64) -> Self {
        TxnError::Consistency(Box::new(ConsistencyViolation {
            key: key.to_string(),
            expected,
            actual,
            report: None,
        }))
    }

    /// Attaches a diagnostic report to a consistency violation. Other errors
    /// are returned unchanged.
    pub fn with_report(self, report: impl Into<String>) -> Self {
        match self {
            TxnError::Consistency(mut violation) => {
                violation.report = Some(report.into());
                TxnError::Consistency(violation)
            }
            other => other,
        }
    }
}
