// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Typed value payloads.

use std::fmt;

use super::mvv::{self, Version};
use super::ValueError;

/// Maximum encoded value size in bytes (64MB).
pub const MAX_VALUE_SIZE: usize = 64 * 1024 * 1024;

const TYPE_INT: u8 = 0x01;
const TYPE_STR: u8 = 0x02;
const TYPE_BYTES: u8 = 0x03;

/// The type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Str,
    Bytes,
    Undefined,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int => "int",
            ValueType::Str => "string",
            ValueType::Bytes => "bytes",
            ValueType::Undefined => "undefined",
        };
        f.write_str(name)
    }
}

/// A value attached to a key.
///
/// `Undefined` is the state of a key with no value; it is also what a
/// removal stores.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    #[default]
    Undefined,
}

impl Value {
    /// Replaces the content of this value.
    pub fn put(&mut self, value: impl Into<Value>) -> &mut Self {
        *self = value.into();
        self
    }

    /// Resets to `Undefined`.
    pub fn clear(&mut self) -> &mut Self {
        *self = Value::Undefined;
        self
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        !matches!(self, Value::Undefined)
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Str(_) => ValueType::Str,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Undefined => ValueType::Undefined,
        }
    }

    #[inline]
    pub fn is_type(&self, ty: ValueType) -> bool {
        self.value_type() == ty
    }

    pub fn get_int(&self) -> Result<i64, ValueError> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(other.mismatch(ValueType::Int)),
        }
    }

    pub fn get_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(other.mismatch(ValueType::Str)),
        }
    }

    pub fn get_bytes(&self) -> Result<&[u8], ValueError> {
        match self {
            Value::Bytes(b) => Ok(b),
            other => Err(other.mismatch(ValueType::Bytes)),
        }
    }

    fn mismatch(&self, expected: ValueType) -> ValueError {
        match self {
            Value::Undefined => ValueError::Undefined,
            other => ValueError::TypeMismatch {
                expected,
                actual: other.value_type(),
            },
        }
    }

    /// Decodes the full version history held in this buffer.
    ///
    /// Only meaningful after a fetch with MVCC ignored, which loads the raw
    /// multi-version blob as bytes.
    pub fn unpack_versions(&self) -> Result<Vec<Version>, ValueError> {
        mvv::unpack(self.get_bytes()?)
    }

    /// Encoded payload: empty for `Undefined`, otherwise a type tag followed
    /// by the body.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Int(v) => {
                buf.push(TYPE_INT);
                buf.extend_from_slice(&v.to_be_bytes());
            }
            Value::Str(s) => {
                buf.push(TYPE_STR);
                buf.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                buf.push(TYPE_BYTES);
                buf.extend_from_slice(b);
            }
            Value::Undefined => {}
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Value::Int(_) => 9,
            Value::Str(s) => 1 + s.len(),
            Value::Bytes(b) => 1 + b.len(),
            Value::Undefined => 0,
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ValueError> {
        let Some((&tag, body)) = buf.split_first() else {
            return Ok(Value::Undefined);
        };
        match tag {
            TYPE_INT => {
                let raw: [u8; 8] = body
                    .try_into()
                    .map_err(|_| ValueError::Truncated { needed: 8 })?;
                Ok(Value::Int(i64::from_be_bytes(raw)))
            }
            TYPE_STR => {
                let s = std::str::from_utf8(body).map_err(|_| ValueError::InvalidUtf8)?;
                Ok(Value::Str(s.to_string()))
            }
            TYPE_BYTES => Ok(Value::Bytes(body.to_vec())),
            tag => Err(ValueError::UnknownType { tag }),
        }
    }
}

/// Validates a value's encoded size.
pub fn validate_value(value: &Value) -> Result<(), ValueError> {
    let size = value.encoded_len();
    if size > MAX_VALUE_SIZE {
        return Err(ValueError::ValueTooLarge {
            size,
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Undefined => write!(f, "undefined"),
        }
    }
}
