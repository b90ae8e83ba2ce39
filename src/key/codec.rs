// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Memory-comparable key encoding.
//!
//! Every segment starts with a tag byte that fixes the order between types:
//!
//! ```text
//! 0x00  BEFORE   (sentinel, no payload)
//! 0x20  INT      8 bytes, big-endian, sign bit flipped
//! 0x30  STR      escaped UTF-8, terminated by 0x00 0x00
//! 0x40  BYTES    escaped bytes, terminated by 0x00 0x00
//! 0xFF  AFTER    (sentinel, no payload)
//! ```
//!
//! Inside STR/BYTES a literal `0x00` is written as `0x00 0xFF`, so the
//! terminator always sorts below any continuation. Segments are
//! self-delimiting: the encoding of a key is the concatenation of its
//! segment encodings and a parent key is always a byte prefix of its
//! children.

use std::cmp::Ordering;

use super::{KeyError, Segment};

pub const TAG_BEFORE: u8 = 0x00;
pub const TAG_INT: u8 = 0x20;
pub const TAG_STR: u8 = 0x30;
pub const TAG_BYTES: u8 = 0x40;
pub const TAG_AFTER: u8 = 0xFF;

const ESCAPE: u8 = 0xFF;
const TERMINATOR: u8 = 0x00;

/// Appends the encoding of one segment to `buf`.
pub fn encode_segment(segment: &Segment, buf: &mut Vec<u8>) {
    match segment {
        Segment::Before => buf.push(TAG_BEFORE),
        Segment::Int(v) => {
            buf.push(TAG_INT);
            buf.extend_from_slice(&((*v as u64) ^ (1 << 63)).to_be_bytes());
        }
        Segment::Str(s) => {
            buf.push(TAG_STR);
            encode_escaped(s.as_bytes(), buf);
        }
        Segment::Bytes(b) => {
            buf.push(TAG_BYTES);
            encode_escaped(b, buf);
        }
        Segment::After => buf.push(TAG_AFTER),
    }
}

fn encode_escaped(data: &[u8], buf: &mut Vec<u8>) {
    for &byte in data {
        buf.push(byte);
        if byte == 0x00 {
            buf.push(ESCAPE);
        }
    }
    buf.push(TERMINATOR);
    buf.push(TERMINATOR);
}

fn decode_escaped(buf: &[u8], start: usize) -> Result<(Vec<u8>, usize), KeyError> {
    let mut out = Vec::new();
    let mut pos = start;
    loop {
        let byte = *buf.get(pos).ok_or(KeyError::Truncated { offset: pos })?;
        if byte != 0x00 {
            out.push(byte);
            pos += 1;
            continue;
        }
        match buf.get(pos + 1) {
            Some(&TERMINATOR) => return Ok((out, pos + 2)),
            Some(&ESCAPE) => {
                out.push(0x00);
                pos += 2;
            }
            Some(_) => return Err(KeyError::BadEscape { offset: pos }),
            None => return Err(KeyError::Truncated { offset: pos + 1 }),
        }
    }
}

/// Decodes the segment starting at `offset`, returning it and the offset
/// just past it.
pub fn decode_segment(buf: &[u8], offset: usize) -> Result<(Segment, usize), KeyError> {
    let tag = *buf.get(offset).ok_or(KeyError::Truncated { offset })?;
    let body = offset + 1;
    match tag {
        TAG_BEFORE => Ok((Segment::Before, body)),
        TAG_AFTER => Ok((Segment::After, body)),
        TAG_INT => {
            let raw: [u8; 8] = buf
                .get(body..body + 8)
                .and_then(|s| s.try_into().ok())
                .ok_or(KeyError::Truncated { offset: body })?;
            let v = (u64::from_be_bytes(raw) ^ (1 << 63)) as i64;
            Ok((Segment::Int(v), body + 8))
        }
        TAG_STR => {
            let (bytes, end) = decode_escaped(buf, body)?;
            let s = String::from_utf8(bytes).map_err(|_| KeyError::InvalidUtf8 { offset })?;
            Ok((Segment::Str(s), end))
        }
        TAG_BYTES => {
            let (bytes, end) = decode_escaped(buf, body)?;
            Ok((Segment::Bytes(bytes), end))
        }
        tag => Err(KeyError::UnknownTag { tag, offset }),
    }
}

/// Encodes a full segment sequence.
pub fn encode(segments: &[Segment]) -> Vec<u8> {
    let mut buf = Vec::new();
    for segment in segments {
        encode_segment(segment, &mut buf);
    }
    buf
}

/// Decodes an encoded key back into its segments.
pub fn decode(buf: &[u8]) -> Result<Vec<Segment>, KeyError> {
    let mut segments = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let (segment, next) = decode_segment(buf, pos)?;
        segments.push(segment);
        pos = next;
    }
    Ok(segments)
}

/// Returns the byte offset at which each segment of `buf` ends.
pub fn segment_ends(buf: &[u8]) -> Result<Vec<usize>, KeyError> {
    let mut ends = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let (_, next) = decode_segment(buf, pos)?;
        ends.push(next);
        pos = next;
    }
    Ok(ends)
}

/// Compares two encoded keys. Byte order is key order.
#[inline]
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(segments: &[Segment]) -> Vec<u8> {
        encode(segments)
    }

    #[test]
    fn test_empty_key() {
        assert!(enc(&[]).is_empty());
        assert_eq!(decode(&[]).unwrap(), vec![]);
        assert!(compare(&enc(&[]), &enc(&[Segment::Int(i64::MIN)])).is_lt());
    }

    #[test]
    fn test_int_order() {
        let values = [i64::MIN, -1_000_000, -1, 0, 1, 255, 256, i64::MAX];
        for pair in values.windows(2) {
            let a = enc(&[Segment::Int(pair[0])]);
            let b = enc(&[Segment::Int(pair[1])]);
            assert!(a < b, "{} should sort below {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_string_prefix_order() {
        let a = enc(&["a".into()]);
        let a_nul = enc(&[Segment::Str("a\0".into())]);
        let ab = enc(&["ab".into()]);
        assert!(a < a_nul);
        assert!(a_nul < ab);
    }

    #[test]
    fn test_embedded_nul_round_trip() {
        let segments = vec![
            Segment::Bytes(vec![0, 0, 1, 0xff, 0]),
            Segment::Str("x\0y".into()),
        ];
        assert_eq!(decode(&enc(&segments)).unwrap(), segments);
    }

    #[test]
    fn test_sentinels_bound_children() {
        let parent = vec![Segment::from("stress8txn"), Segment::Int(3)];
        let mut before = parent.clone();
        before.push(Segment::Before);
        let mut after = parent.clone();
        after.push(Segment::After);

        let children = [
            Segment::Int(i64::MIN),
            Segment::Int(0),
            Segment::from(""),
            Segment::from("zzz"),
            Segment::Bytes(vec![0xff, 0xff]),
        ];
        for child in children {
            let mut key = parent.clone();
            key.push(child.clone());
            let bytes = enc(&key);
            assert!(enc(&before) < bytes, "BEFORE must sort below {child}");
            assert!(bytes < enc(&after), "AFTER must sort above {child}");
        }
    }

    #[test]
    fn test_parent_is_byte_prefix() {
        let parent = enc(&["acct".into(), Segment::Int(4)]);
        let child = enc(&["acct".into(), Segment::Int(4), Segment::Int(2)]);
        assert!(child.starts_with(&parent));
        assert!(parent < child);
    }

    #[test]
    fn test_segment_ends() {
        let key = enc(&["ab".into(), Segment::Int(7)]);
        let ends = segment_ends(&key).unwrap();
        assert_eq!(ends, vec![5, 14]);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            decode(&[0x10]),
            Err(KeyError::UnknownTag { tag: 0x10, offset: 0 })
        );
        assert!(matches!(
            decode(&[TAG_INT, 1, 2]),
            Err(KeyError::Truncated { .. })
        ));
        assert!(matches!(
            decode(&[TAG_STR, b'a', 0x00]),
            Err(KeyError::Truncated { .. })
        ));
        assert!(matches!(
            decode(&[TAG_STR, b'a', 0x00, 0x07]),
            Err(KeyError::BadEscape { offset: 2 })
        ));
        assert!(matches!(
            decode(&[TAG_STR, 0xc3, 0x28, 0x00, 0x00]),
            Err(KeyError::InvalidUtf8 { .. })
        ));
    }
}
