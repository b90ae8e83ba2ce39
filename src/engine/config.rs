// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Configuration for an engine instance.

use std::path::PathBuf;
#[cfg(any(test, feature = "interleave"))]
use std::sync::Arc;
use std::time::Duration;

#[cfg(any(test, feature = "interleave"))]
use crate::checkpoint::Interleave;
use crate::storage::DurabilityMode;
use crate::tree::DEFAULT_FANOUT;
use crate::txn::RetryPolicy;

/// Which clock hands out timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockKind {
    /// Hybrid logical clock over wall-clock nanoseconds.
    #[default]
    Hybrid,
    /// Counter-only clock. Deterministic; useful for tests.
    Logical,
}

/// Configuration for [`Engine::open`](super::Engine::open).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// RocksDB journal directory (None = in-memory journal).
    pub data_dir: Option<PathBuf>,
    /// Sync mode for commit records in the RocksDB journal.
    pub durability: DurabilityMode,
    /// Interval for background checkpoints (None = only on request).
    pub checkpoint_interval: Option<Duration>,
    /// Maximum entries per B+tree node.
    pub fanout: usize,
    /// Version count above which a key's history is pruned during commit.
    pub prune_threshold: usize,
    /// Policy for auto-committed cursor operations and the default `run`.
    pub retry: RetryPolicy,
    pub clock: ClockKind,
    #[cfg(any(test, feature = "interleave"))]
    pub interleave: Option<Arc<Interleave>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            durability: DurabilityMode::default(),
            checkpoint_interval: None,
            fanout: DEFAULT_FANOUT,
            prune_threshold: 16,
            retry: RetryPolicy::default(),
            clock: ClockKind::default(),
            #[cfg(any(test, feature = "interleave"))]
            interleave: None,
        }
    }
}

impl EngineConfig {
    /// An engine journaled in memory only.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// An engine journaled to RocksDB at `path`.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self::default().with_data_dir(path)
    }

    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    pub fn with_durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    /// Enables background checkpoints every `interval`.
    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = Some(interval);
        self
    }

    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn with_prune_threshold(mut self, threshold: usize) -> Self {
        self.prune_threshold = threshold.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: ClockKind) -> Self {
        self.clock = clock;
        self
    }

    /// Installs rendezvous hooks on the commit and checkpoint paths.
    #[cfg(any(test, feature = "interleave"))]
    pub fn with_interleave(mut self, hooks: Arc<Interleave>) -> Self {
        self.interleave = Some(hooks);
        self
    }
}
