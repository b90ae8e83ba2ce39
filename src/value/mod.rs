// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Values and multi-version values.
//!
//! Applications see a single [`Value`] per key. Underneath, each key holds
//! an [`Mvv`]: one version per committing transaction, each tagged with its
//! commit timestamp. A reader sees the newest version whose commit timestamp
//! is at or below its snapshot; later versions are invisible to it.

mod error;
pub mod mvv;
#[allow(clippy::module_inception)]
mod value;
pub mod varint;

pub use error::ValueError;
pub use mvv::{Mvv, Version, Visibility};
pub use value::{validate_value, Value, ValueType, MAX_VALUE_SIZE};
