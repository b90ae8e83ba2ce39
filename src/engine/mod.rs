// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Engine assembly.
//!
//! An [`Engine`] owns the clock, the journal, the named trees and the
//! transaction manager, recovers them at open and writes checkpoints on
//! request or on a background interval.
//!
//! # Example
//!
//! ```
//! use burrowdb::engine::{Engine, EngineConfig};
//!
//! let engine = Engine::open(EngineConfig::in_memory()).unwrap();
//! let tree = engine.tree("accounts").unwrap();
//! let ctx = engine.context();
//!
//! let mut ex = ctx.exchange(&tree);
//! ex.append("alice").value_mut().put(100);
//! ex.store().unwrap();
//!
//! let marker = engine.request_checkpoint().unwrap();
//! assert_eq!(engine.checkpoint_marker(), marker);
//! ```

mod config;
mod diagnostics;
#[allow(clippy::module_inception)]
mod engine;
mod error;
mod init_token;

pub use config::{ClockKind, EngineConfig};
pub use diagnostics::{EngineStats, MvvReport, ReportLine};
pub use engine::{Engine, MAX_TREE_NAME};
pub use error::EngineError;
pub use init_token::InitToken;
