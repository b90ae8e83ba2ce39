// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Leading-byte variable-length integers.
//!
//! ```text
//! 0 ..= 240            1 byte   [v]
//! 241 ..= 2287         2 bytes  [241 + (v-240)>>8, (v-240)&FF]
//! 2288 ..= 67823       3 bytes  [249, (v-2288)>>8, (v-2288)&FF]
//! ..= 0xFF_FFFF        4 bytes  [250, 3-byte BE]
//! ..= 0xFFFF_FFFF      5 bytes  [251, 4-byte BE]
//! everything else      9 bytes  [255, 8-byte BE]
//! ```
//!
//! Used for every length and count field in MVV blobs and journal records.

use super::ValueError;

/// Encoded length of `value` in bytes.
pub fn varint_len(value: u64) -> usize {
    if value <= 240 {
        1
    } else if value <= 2287 {
        2
    } else if value <= 67823 {
        3
    } else if value <= 0xFF_FFFF {
        4
    } else if value <= 0xFFFF_FFFF {
        5
    } else {
        9
    }
}

/// Appends the encoding of `value` to `buf`.
pub fn put_varint(buf: &mut Vec<u8>, value: u64) {
    if value <= 240 {
        buf.push(value as u8);
    } else if value <= 2287 {
        let v = value - 240;
        buf.push(((v >> 8) + 241) as u8);
        buf.push((v & 0xFF) as u8);
    } else if value <= 67823 {
        let v = value - 2288;
        buf.push(249);
        buf.push((v >> 8) as u8);
        buf.push((v & 0xFF) as u8);
    } else if value <= 0xFF_FFFF {
        buf.push(250);
        buf.extend_from_slice(&value.to_be_bytes()[5..]);
    } else if value <= 0xFFFF_FFFF {
        buf.push(251);
        buf.extend_from_slice(&value.to_be_bytes()[4..]);
    } else {
        buf.push(255);
        buf.extend_from_slice(&value.to_be_bytes());
    }
}

/// Decodes a varint from the front of `buf`, returning `(value, bytes_read)`.
pub fn get_varint(buf: &[u8]) -> Result<(u64, usize), ValueError> {
    let marker = *buf.first().ok_or(ValueError::Truncated { needed: 1 })?;
    match marker {
        0..=240 => Ok((u64::from(marker), 1)),
        241..=248 => {
            let rest = need(buf, 2)?;
            let v = 240 + (u64::from(marker - 241) << 8) + u64::from(rest[0]);
            Ok((v, 2))
        }
        249 => {
            let rest = need(buf, 3)?;
            let v = 2288 + (u64::from(rest[0]) << 8) + u64::from(rest[1]);
            Ok((v, 3))
        }
        250 => Ok((be_tail(need(buf, 4)?), 4)),
        251 => Ok((be_tail(need(buf, 5)?), 5)),
        255 => Ok((be_tail(need(buf, 9)?), 9)),
        marker => Err(ValueError::BadVarint { marker }),
    }
}

fn need(buf: &[u8], n: usize) -> Result<&[u8], ValueError> {
    buf.get(1..n).ok_or(ValueError::Truncated { needed: n })
}

fn be_tail(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Sequential reader over a byte slice, used by the blob and record decoders.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Everything not yet consumed.
    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }

    pub(crate) fn varint(&mut self) -> Result<u64, ValueError> {
        let (v, n) = get_varint(&self.buf[self.pos..])?;
        self.pos += n;
        Ok(v)
    }

    pub(crate) fn u64(&mut self) -> Result<u64, ValueError> {
        let raw: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| ValueError::Truncated { needed: 8 })?;
        Ok(u64::from_be_bytes(raw))
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], ValueError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ValueError::Truncated { needed: n })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    /// Reads a varint length followed by that many bytes.
    pub(crate) fn chunk(&mut self) -> Result<&'a [u8], ValueError> {
        let len = self.varint()?;
        let len = usize::try_from(len).map_err(|_| ValueError::Truncated { needed: usize::MAX })?;
        self.take(len)
    }
}

/// Appends a varint length followed by `data`.
pub(crate) fn put_chunk(buf: &mut Vec<u8>, data: &[u8]) {
    put_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_round_trip(value in any::<u64>()) {
            let mut buf = Vec::new();
            put_varint(&mut buf, value);
            prop_assert_eq!(buf.len(), varint_len(value));
            prop_assert_eq!(get_varint(&buf).unwrap(), (value, buf.len()));
        }
    }
}
