// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Point timestamps used for start, commit and checkpoint ordering.

/// A totally ordered logical timestamp.
///
/// Start timestamps, commit timestamps and checkpoint markers all live on the
/// same axis, so "committed at or before the snapshot" is a plain `<=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The smallest timestamp. No transaction commits at zero.
    pub const ZERO: Timestamp = Timestamp(0);

    /// The largest representable timestamp.
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Creates a timestamp from a raw tick value.
    #[inline]
    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Returns the raw tick value.
    #[inline]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the next tick, saturating at `MAX`.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Big-endian bytes; byte order matches numeric order.
    #[inline]
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Inverse of [`Timestamp::to_be_bytes`].
    #[inline]
    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl From<u64> for Timestamp {
    fn from(ticks: u64) -> Self {
        Self(ticks)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Timestamp::new(5) < Timestamp::new(9));
        assert!(Timestamp::ZERO < Timestamp::new(1));
        assert_eq!(Timestamp::new(7).max(Timestamp::new(3)), Timestamp::new(7));
    }

    #[test]
    fn test_next_saturates() {
        assert_eq!(Timestamp::new(1).next(), Timestamp::new(2));
        assert_eq!(Timestamp::MAX.next(), Timestamp::MAX);
    }

    #[test]
    fn test_display() {
        assert_eq!(Timestamp::new(1234).to_string(), "1234");
    }
}
