// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Composite keys.
//!
//! A [`Key`] is an ordered list of typed [`Segment`]s. Its encoded form is
//! memory-comparable: comparing two encoded keys byte by byte gives the same
//! answer as comparing their segments one by one, and a key's encoding is a
//! byte prefix of the encodings of all its children.
//!
//! # Example
//!
//! ```
//! use burrowdb::key::{Key, Segment};
//!
//! let mut a = Key::new();
//! a.append("acct").append(1i64).append(Segment::Before);
//!
//! let mut b = Key::new();
//! b.append("acct").append(1i64).append(0i64);
//!
//! assert!(a < b);
//! assert_eq!(b.to_string(), "{\"acct\",1,0}");
//! ```

pub mod codec;
mod error;
#[allow(clippy::module_inception)]
mod key;
mod segment;

pub use error::KeyError;
pub use key::{validate_key, Key, MAX_KEY_SIZE};
pub use segment::Segment;
