// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Composite key buffer.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::codec;
use super::{KeyError, Segment};

/// Maximum encoded key size in bytes (8KB).
pub const MAX_KEY_SIZE: usize = 8 * 1024;

/// A mutable, hierarchical key.
///
/// The encoded form is maintained incrementally as segments are appended or
/// cut, so handing the key to the tree never re-encodes it.
#[derive(Clone, Default)]
pub struct Key {
    segments: Vec<Segment>,
    bytes: Vec<u8>,
    ends: Vec<usize>,
}

impl Key {
    /// Creates an empty key (zero segments).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a key from its segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        let mut key = Self::new();
        for segment in segments {
            key.append(segment);
        }
        key
    }

    /// Rebuilds a key from its encoded form.
    pub fn from_encoded(bytes: &[u8]) -> Result<Self, KeyError> {
        let segments = codec::decode(bytes)?;
        let ends = codec::segment_ends(bytes)?;
        Ok(Self {
            segments,
            bytes: bytes.to_vec(),
            ends,
        })
    }

    /// Removes every segment.
    pub fn clear(&mut self) -> &mut Self {
        self.segments.clear();
        self.bytes.clear();
        self.ends.clear();
        self
    }

    /// Appends one segment.
    pub fn append(&mut self, segment: impl Into<Segment>) -> &mut Self {
        let segment = segment.into();
        codec::encode_segment(&segment, &mut self.bytes);
        self.ends.push(self.bytes.len());
        self.segments.push(segment);
        self
    }

    /// Drops the last segment. No-op on an empty key.
    pub fn cut(&mut self) -> &mut Self {
        let depth = self.depth().saturating_sub(1);
        self.cut_to(depth)
    }

    /// Truncates the key to its first `depth` segments.
    pub fn cut_to(&mut self, depth: usize) -> &mut Self {
        if depth < self.depth() {
            let len = self.prefix_len(depth);
            self.segments.truncate(depth);
            self.ends.truncate(depth);
            self.bytes.truncate(len);
        }
        self
    }

    /// Number of segments.
    #[inline]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Length in bytes of the encoding of the first `depth` segments.
    pub fn prefix_len(&self, depth: usize) -> usize {
        match depth {
            0 => 0,
            d if d >= self.ends.len() => self.bytes.len(),
            d => self.ends[d - 1],
        }
    }

    /// Encoded form of the first `depth` segments.
    #[inline]
    pub fn prefix(&self, depth: usize) -> &[u8] {
        &self.bytes[..self.prefix_len(depth)]
    }

    /// Encoded form of the whole key.
    #[inline]
    pub fn encoded(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[inline]
    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    #[inline]
    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Returns true if any segment is a BEFORE/AFTER sentinel.
    pub fn has_sentinel(&self) -> bool {
        self.segments.iter().any(Segment::is_sentinel)
    }

    /// Overwrites `other` with a copy of this key.
    pub fn copy_to(&self, other: &mut Key) {
        other.segments.clone_from(&self.segments);
        other.bytes.clone_from(&self.bytes);
        other.ends.clone_from(&self.ends);
    }

    /// Checks that the key may hold a value.
    pub fn validate_for_store(&self) -> Result<(), KeyError> {
        if self.is_empty() {
            return Err(KeyError::EmptyKey);
        }
        if self.has_sentinel() {
            return Err(KeyError::SentinelInKey {
                key: self.to_string(),
            });
        }
        validate_key(&self.bytes)
    }
}

/// Validates an encoded key's size.
pub fn validate_key(key: &[u8]) -> Result<(), KeyError> {
    if key.len() > MAX_KEY_SIZE {
        return Err(KeyError::KeyTooLarge {
            size: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    Ok(())
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        codec::compare(&self.bytes, &other.bytes)
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{segment}")?;
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(a: i64, b: i64, c: i64) -> Key {
        let mut key = Key::new();
        key.append("stress8txn").append(a).append(b).append(c);
        key
    }

    #[test]
    fn test_append_and_cut() {
        let mut key = account(1, 2, 3);
        assert_eq!(key.depth(), 4);
        assert_eq!(key.to_string(), "{\"stress8txn\",1,2,3}");

        key.cut();
        assert_eq!(key.depth(), 3);
        assert_eq!(
            key,
            Key::from_segments::<_, Segment>(["stress8txn".into(), 1i64.into(), 2i64.into()])
        );

        key.cut_to(1);
        assert_eq!(key.to_string(), "{\"stress8txn\"}");

        key.clear().cut();
        assert!(key.is_empty());
        assert!(key.encoded().is_empty());
    }

    #[test]
    fn test_incremental_encoding_matches_codec() {
        let key = account(-4, 0, 17);
        assert_eq!(key.encoded(), codec::encode(key.segments()).as_slice());
        assert_eq!(Key::from_encoded(key.encoded()).unwrap(), key);
    }

    #[test]
    fn test_prefix() {
        let key = account(1, 2, 3);
        let parent = account(1, 2, 3).cut().clone();
        assert_eq!(key.prefix(3), parent.encoded());
        assert_eq!(key.prefix(0), &[] as &[u8]);
        assert_eq!(key.prefix(10), key.encoded());
        assert!(key.encoded().starts_with(key.prefix(2)));
    }

    #[test]
    fn test_ordering() {
        assert!(account(1, 2, 3) < account(1, 2, 4));
        assert!(account(1, 2, 3) < account(1, 3, 0));
        assert!(account(-1, 9, 9) < account(0, 0, 0));

        let mut parent = account(1, 2, 3);
        parent.cut();
        assert!(parent < account(1, 2, 0));
    }

    #[test]
    fn test_copy_to() {
        let src = account(4, 1, 2);
        let mut dst = Key::new();
        dst.append("junk");
        src.copy_to(&mut dst);
        assert_eq!(dst, src);
        dst.append(Segment::Before);
        assert_eq!(dst.depth(), 5);
        assert_eq!(src.depth(), 4);
    }

    #[test]
    fn test_validate_for_store() {
        assert_eq!(Key::new().validate_for_store(), Err(KeyError::EmptyKey));

        let mut key = account(1, 2, 3);
        assert!(key.validate_for_store().is_ok());
        key.append(Segment::After);
        assert!(matches!(
            key.validate_for_store(),
            Err(KeyError::SentinelInKey { .. })
        ));

        let mut big = Key::new();
        big.append(vec![1u8; MAX_KEY_SIZE]);
        assert!(matches!(
            big.validate_for_store(),
            Err(KeyError::KeyTooLarge { .. })
        ));
    }
}
