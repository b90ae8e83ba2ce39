// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Typed key segments.

use std::fmt;

/// One component of a composite key.
///
/// The derived ordering is the logical key order: `Before` sorts below every
/// real segment, then integers, strings and byte strings, and `After` sorts
/// above everything. The byte encoding in [`super::codec`] preserves it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// Synthetic lower bound for range scans. Never stored.
    Before,
    /// Signed integer.
    Int(i64),
    /// UTF-8 string.
    Str(String),
    /// Raw byte string.
    Bytes(Vec<u8>),
    /// Synthetic upper bound for range scans. Never stored.
    After,
}

impl Segment {
    /// Returns true for the `Before`/`After` range sentinels.
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Segment::Before | Segment::After)
    }
}

impl From<i64> for Segment {
    fn from(v: i64) -> Self {
        Segment::Int(v)
    }
}

impl From<i32> for Segment {
    fn from(v: i32) -> Self {
        Segment::Int(i64::from(v))
    }
}

impl From<u32> for Segment {
    fn from(v: u32) -> Self {
        Segment::Int(i64::from(v))
    }
}

impl From<&str> for Segment {
    fn from(v: &str) -> Self {
        Segment::Str(v.to_string())
    }
}

impl From<String> for Segment {
    fn from(v: String) -> Self {
        Segment::Str(v)
    }
}

impl From<&[u8]> for Segment {
    fn from(v: &[u8]) -> Self {
        Segment::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Segment {
    fn from(v: Vec<u8>) -> Self {
        Segment::Bytes(v)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Before => write!(f, "{{before}}"),
            Segment::Int(v) => write!(f, "{v}"),
            Segment::Str(s) => write!(f, "{s:?}"),
            Segment::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Segment::After => write!(f, "{{after}}"),
        }
    }
}
