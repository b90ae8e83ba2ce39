// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Value codec error types.

use super::ValueType;

/// Errors that can occur while reading or decoding values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// The value buffer holds no value. Not a storage error.
    #[error("value is undefined")]
    Undefined,

    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },

    #[error("encoded value truncated: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("unknown value type tag {tag:#04x}")]
    UnknownType { tag: u8 },

    #[error("invalid varint marker {marker}")]
    BadVarint { marker: u8 },

    #[error("string value is not valid UTF-8")]
    InvalidUtf8,

    #[error("value too large: {size} > {max}")]
    ValueTooLarge { size: usize, max: usize },

    #[error("malformed multi-version blob: {0}")]
    MalformedMvv(String),
}
