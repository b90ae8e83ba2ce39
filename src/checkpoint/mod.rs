// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Checkpoint coordination.
//!
//! A checkpoint stores an image of every tree at a marker timestamp and
//! lets the journal drop the commit records it covers. The
//! [`CheckpointCoordinator`] orders commits against checkpoints through two
//! critical sections so the image at a marker contains exactly the commits
//! with a smaller timestamp.

mod coordinator;
#[cfg(any(test, feature = "interleave"))]
mod interleave;
mod periodic;

pub use coordinator::{
    Capture, CheckpointCoordinator, CHECKPOINT_ACTOR, COMMIT_ACTOR, SECTION_A, SECTION_B,
};
#[cfg(any(test, feature = "interleave"))]
pub use interleave::{Event, Interleave, AFTER_CAPTURE, BEFORE_JOURNAL};
pub use periodic::PeriodicCheckpointer;
