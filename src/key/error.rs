// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Key codec error types.

/// Errors that can occur while encoding, decoding or validating keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("encoded key truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("unknown segment tag {tag:#04x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("invalid escape sequence at offset {offset}")]
    BadEscape { offset: usize },

    #[error("string segment at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    #[error("key too large: {size} > {max}")]
    KeyTooLarge { size: usize, max: usize },

    #[error("cannot store a value at the empty key")]
    EmptyKey,

    #[error("key {key} contains a BEFORE/AFTER sentinel and cannot hold a value")]
    SentinelInKey { key: String },
}
