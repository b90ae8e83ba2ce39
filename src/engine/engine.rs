// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Engine instance: trees, transactions and checkpoints over one journal.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument};

use crate::checkpoint::{CheckpointCoordinator, PeriodicCheckpointer};
#[cfg(any(test, feature = "interleave"))]
use crate::checkpoint::{Interleave, AFTER_CAPTURE};
use crate::key::Key;
use crate::storage::{CheckpointImage, Journal, MemoryJournal, Recovered, RocksJournal, TreeImage};
use crate::time::{HlcTimeService, TimeService, Timestamp};
use crate::tree::{Tree, TreeId};
use crate::txn::{TransactionContext, TransactionManager};

use super::config::{ClockKind, EngineConfig};
use super::diagnostics::{EngineStats, MvvReport};
use super::error::EngineError;

/// Longest tree name, in bytes.
pub const MAX_TREE_NAME: usize = 255;

struct EngineCore {
    config: EngineConfig,
    clock: Arc<dyn TimeService>,
    journal: Arc<dyn Journal>,
    coordinator: Arc<CheckpointCoordinator>,
    manager: Arc<TransactionManager>,
    trees: RwLock<BTreeMap<String, Arc<Tree>>>,
    next_tree_id: AtomicU32,
    /// Serializes checkpoints.
    checkpoint_lock: Mutex<()>,
    checkpoints: AtomicU64,
    #[cfg(any(test, feature = "interleave"))]
    hooks: Option<Arc<Interleave>>,
}

/// An open engine.
///
/// Dropping the engine stops background checkpoints; call
/// [`Engine::close`] to also write a final checkpoint.
pub struct Engine {
    // Declared first so the checkpoint thread is joined before the core goes.
    checkpointer: Mutex<Option<PeriodicCheckpointer>>,
    core: Arc<EngineCore>,
}

impl Engine {
    /// Opens an engine, journaling to RocksDB if `config.data_dir` is set
    /// and in memory otherwise.
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let journal: Arc<dyn Journal> = match &config.data_dir {
            Some(path) => Arc::new(RocksJournal::open_with_durability(path, config.durability)?),
            None => Arc::new(MemoryJournal::new()),
        };
        Self::open_with_journal(config, journal)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::open(EngineConfig::in_memory())
    }

    /// Opens an engine over an existing journal, recovering whatever it
    /// holds.
    pub fn open_with_journal(
        config: EngineConfig,
        journal: Arc<dyn Journal>,
    ) -> Result<Self, EngineError> {
        let clock: Arc<dyn TimeService> = match config.clock {
            ClockKind::Hybrid => Arc::new(HlcTimeService::new()),
            ClockKind::Logical => Arc::new(HlcTimeService::logical()),
        };

        let recovered = journal.load()?;
        let marker = recovered.image.as_ref().map_or(Timestamp::ZERO, |i| i.marker);
        clock.observe(recovered.max_timestamp());

        #[cfg(any(test, feature = "interleave"))]
        let hooks = config.interleave.clone();

        let coordinator = CheckpointCoordinator::new(marker);
        #[cfg(any(test, feature = "interleave"))]
        let coordinator = coordinator.with_hooks(hooks.clone());
        let coordinator = Arc::new(coordinator);

        let manager = TransactionManager::new(
            Arc::clone(&clock),
            Arc::clone(&journal),
            Arc::clone(&coordinator),
        );
        #[cfg(any(test, feature = "interleave"))]
        let manager = manager.with_hooks(hooks.clone());

        let core = Arc::new(EngineCore {
            clock,
            journal,
            coordinator,
            manager: Arc::new(manager),
            trees: RwLock::new(BTreeMap::new()),
            next_tree_id: AtomicU32::new(1),
            checkpoint_lock: Mutex::new(()),
            checkpoints: AtomicU64::new(0),
            #[cfg(any(test, feature = "interleave"))]
            hooks,
            config,
        });
        core.replay(recovered)?;

        let engine = Self {
            checkpointer: Mutex::new(None),
            core,
        };
        if let Some(interval) = engine.core.config.checkpoint_interval {
            engine.start_checkpoints(interval)?;
        }
        Ok(engine)
    }

    fn start_checkpoints(&self, interval: std::time::Duration) -> Result<(), EngineError> {
        let weak: Weak<EngineCore> = Arc::downgrade(&self.core);
        let checkpointer = PeriodicCheckpointer::spawn(interval, move || {
            let Some(core) = weak.upgrade() else {
                return false;
            };
            if let Err(err) = core.checkpoint() {
                error!(error = %err, "periodic checkpoint failed");
            }
            true
        })
        .map_err(EngineError::Thread)?;
        *self.checkpointer.lock() = Some(checkpointer);
        Ok(())
    }

    /// Returns the tree called `name`, creating it if needed.
    pub fn tree(&self, name: &str) -> Result<Arc<Tree>, EngineError> {
        validate_tree_name(name)?;
        Ok(self.core.tree(name))
    }

    /// Returns the tree called `name` if it exists.
    pub fn find_tree(&self, name: &str) -> Option<Arc<Tree>> {
        self.core.trees.read().get(name).cloned()
    }

    /// Names of every tree, in order.
    pub fn tree_names(&self) -> Vec<String> {
        self.core.trees.read().keys().cloned().collect()
    }

    /// A fresh per-thread transaction context using the configured retry
    /// policy.
    pub fn context(&self) -> TransactionContext {
        TransactionContext::new(Arc::clone(&self.core.manager), self.core.config.retry)
    }

    /// Writes a checkpoint and returns its marker.
    ///
    /// Blocks until every commit below the marker has resolved its journal
    /// record.
    pub fn request_checkpoint(&self) -> Result<Timestamp, EngineError> {
        self.core.checkpoint()
    }

    /// Prunes version histories no active transaction can read. Returns
    /// the number of keys removed.
    pub fn compact(&self) -> usize {
        self.core.compact()
    }

    /// Last published checkpoint marker.
    pub fn checkpoint_marker(&self) -> Timestamp {
        self.core.coordinator.marker()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            txn: self.core.manager.stats(),
            checkpoints: self.core.checkpoints.load(Ordering::Relaxed),
            marker: self.core.coordinator.marker(),
            trees: self.core.trees.read().len(),
            active_transactions: self.core.manager.active_count(),
        }
    }

    /// Version history of keys under `prefix` in tree `name`, or None if
    /// there is no such tree.
    pub fn mvv_report(&self, name: &str, prefix: &Key) -> Option<MvvReport> {
        self.find_tree(name)
            .map(|tree| MvvReport::collect(&tree, prefix))
    }

    #[inline]
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.core.manager
    }

    #[inline]
    pub fn clock(&self) -> &Arc<dyn TimeService> {
        &self.core.clock
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// Stops background checkpoints and writes a final one.
    pub fn close(self) -> Result<Timestamp, EngineError> {
        if let Some(mut checkpointer) = self.checkpointer.lock().take() {
            checkpointer.stop();
        }
        let marker = self.core.checkpoint()?;
        info!(%marker, "engine closed");
        Ok(marker)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("trees", &self.tree_names())
            .field("stats", &self.stats())
            .finish()
    }
}

impl EngineCore {
    fn tree(&self, name: &str) -> Arc<Tree> {
        if let Some(tree) = self.trees.read().get(name) {
            return Arc::clone(tree);
        }
        let mut trees = self.trees.write();
        let tree = trees.entry(name.to_string()).or_insert_with(|| {
            let id = TreeId(self.next_tree_id.fetch_add(1, Ordering::Relaxed));
            debug!(tree = name, %id, "created tree");
            Arc::new(Tree::new(
                id,
                name,
                self.config.fanout,
                self.config.prune_threshold,
            ))
        });
        Arc::clone(tree)
    }

    /// Rebuilds trees from the checkpoint image, then applies the commits
    /// journaled after it in timestamp order.
    #[instrument(skip_all)]
    fn replay(&self, recovered: Recovered) -> Result<(), EngineError> {
        let mut entries = 0;
        let marker = match recovered.image {
            Some(image) => {
                for tree_image in image.trees {
                    validate_tree_name(&tree_image.name)?;
                    let tree = self.tree(&tree_image.name);
                    for entry in tree_image.entries {
                        tree.install_committed(&entry.key, entry.commit_ts, entry.value);
                        entries += 1;
                    }
                }
                image.marker
            }
            None => Timestamp::ZERO,
        };

        let commits = recovered.commits.len();
        for record in recovered.commits {
            for write in record.writes {
                validate_tree_name(&write.tree)?;
                self.tree(&write.tree)
                    .install_committed(&write.key, record.commit_ts, write.value);
            }
        }

        if entries > 0 || commits > 0 {
            info!(%marker, entries, commits, "recovered journal");
        }
        Ok(())
    }

    #[instrument(skip_all)]
    fn checkpoint(&self) -> Result<Timestamp, EngineError> {
        let _serial = self.checkpoint_lock.lock();

        // The marker stays pinned until the image is taken so compaction
        // cannot prune the versions it shows.
        let mut pin = None;
        let capture = self.coordinator.capture(|| {
            let pinned = self.manager.pin(|| self.clock.now());
            let marker = pinned.timestamp();
            pin = Some(pinned);
            marker
        });
        interleave!(self.hooks, |h| h.pause_point(AFTER_CAPTURE));
        let aborted = capture.wait();
        let marker = capture.marker();

        let trees: Vec<Arc<Tree>> = self.trees.read().values().cloned().collect();
        let image = CheckpointImage {
            marker,
            trees: trees
                .iter()
                .map(|tree| TreeImage {
                    name: tree.name().to_string(),
                    entries: tree.image_at(marker),
                })
                .collect(),
        };
        drop(pin);
        self.journal.write_checkpoint(&image)?;
        self.coordinator.advance(marker);
        self.checkpoints.fetch_add(1, Ordering::Relaxed);

        let removed = self.compact();
        info!(
            %marker,
            trees = image.trees.len(),
            entries = image.entry_count(),
            waited = capture.in_flight(),
            aborted,
            removed,
            "checkpoint written"
        );
        Ok(marker)
    }

    fn compact(&self) -> usize {
        let horizon = self.manager.oldest_active();
        let trees: Vec<Arc<Tree>> = self.trees.read().values().cloned().collect();
        trees.iter().map(|tree| tree.compact(horizon)).sum()
    }
}

fn validate_tree_name(name: &str) -> Result<(), EngineError> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.len() > MAX_TREE_NAME {
        "longer than 255 bytes"
    } else {
        return Ok(());
    };
    Err(EngineError::InvalidTreeName {
        name: name.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    use crate::checkpoint::{BEFORE_JOURNAL, CHECKPOINT_ACTOR};
    use crate::value::Value;

    const WAIT: Duration = Duration::from_secs(5);

    fn logical() -> EngineConfig {
        EngineConfig::in_memory().with_clock(ClockKind::Logical)
    }

    fn put(engine: &Engine, tree: &Arc<Tree>, key: i64, value: i64) {
        let ctx = engine.context();
        ctx.run(5, 0, false, |ctx| {
            let mut ex = ctx.exchange(tree);
            ex.append("k").append(key);
            ex.value_mut().put(value);
            ex.store()?;
            Ok(())
        })
        .unwrap();
    }

    fn get(engine: &Engine, tree: &Arc<Tree>, key: i64) -> Value {
        let ctx = engine.context();
        let mut ex = ctx.exchange(tree);
        ex.append("k").append(key);
        ex.fetch().unwrap();
        ex.value().clone()
    }

    #[test]
    fn test_tree_names() {
        let engine = Engine::open_in_memory().unwrap();
        let a = engine.tree("accounts").unwrap();
        let again = engine.tree("accounts").unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        engine.tree("audit").unwrap();
        assert_eq!(engine.tree_names(), vec!["accounts", "audit"]);

        assert!(matches!(
            engine.tree(""),
            Err(EngineError::InvalidTreeName { .. })
        ));
        assert!(engine.tree(&"x".repeat(MAX_TREE_NAME + 1)).is_err());
        assert!(engine.find_tree("missing").is_none());
    }

    #[test]
    fn test_checkpoint_advances_marker() {
        let engine = Engine::open(logical()).unwrap();
        let tree = engine.tree("t").unwrap();
        put(&engine, &tree, 1, 10);

        assert_eq!(engine.checkpoint_marker(), Timestamp::ZERO);
        let first = engine.request_checkpoint().unwrap();
        assert_eq!(engine.checkpoint_marker(), first);

        put(&engine, &tree, 2, 20);
        let second = engine.request_checkpoint().unwrap();
        assert!(second > first);
        assert_eq!(engine.stats().checkpoints, 2);
    }

    #[test]
    fn test_recovers_image_and_commits() {
        let journal = Arc::new(MemoryJournal::new());
        {
            let engine = Engine::open_with_journal(logical(), journal.clone()).unwrap();
            let tree = engine.tree("t").unwrap();
            put(&engine, &tree, 1, 10);
            put(&engine, &tree, 2, 20);
            engine.request_checkpoint().unwrap();
            put(&engine, &tree, 2, 21);
            put(&engine, &tree, 3, 30);
            assert_eq!(journal.pending_records(), 2);
        }

        let engine = Engine::open_with_journal(logical(), journal.clone()).unwrap();
        let tree = engine.find_tree("t").unwrap();
        assert_eq!(get(&engine, &tree, 1), Value::Int(10));
        assert_eq!(get(&engine, &tree, 2), Value::Int(21));
        assert_eq!(get(&engine, &tree, 3), Value::Int(30));
        assert!(engine.checkpoint_marker() > Timestamp::ZERO);

        // New commits order after everything replayed.
        put(&engine, &tree, 1, 11);
        assert_eq!(get(&engine, &tree, 1), Value::Int(11));
    }

    #[test]
    fn test_close_writes_final_checkpoint() {
        let journal = Arc::new(MemoryJournal::new());
        let engine = Engine::open_with_journal(
            logical().with_checkpoint_interval(Duration::from_secs(60)),
            journal.clone(),
        )
        .unwrap();
        let tree = engine.tree("t").unwrap();
        put(&engine, &tree, 1, 1);
        assert_eq!(journal.pending_records(), 1);
        engine.close().unwrap();
        assert_eq!(journal.pending_records(), 0);
        assert_eq!(journal.load().unwrap().image.unwrap().entry_count(), 1);
    }

    #[test]
    fn test_periodic_checkpoints() {
        let engine =
            Engine::open(logical().with_checkpoint_interval(Duration::from_millis(5))).unwrap();
        let tree = engine.tree("t").unwrap();
        put(&engine, &tree, 1, 1);

        let deadline = std::time::Instant::now() + WAIT;
        while engine.stats().checkpoints < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(engine.stats().checkpoints >= 2);
    }

    #[test]
    fn test_compact_keeps_visible_versions() {
        let engine = Engine::open(logical().with_prune_threshold(1000)).unwrap();
        let tree = engine.tree("t").unwrap();
        for v in 0..10 {
            put(&engine, &tree, 1, v);
        }
        engine.compact();
        assert_eq!(get(&engine, &tree, 1), Value::Int(9));
        let report = engine.mvv_report("t", &Key::new()).unwrap();
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn test_checkpoint_waits_for_commit_in_flight() {
        let hooks = Arc::new(Interleave::new());
        let journal = Arc::new(MemoryJournal::new());
        let engine = Arc::new(
            Engine::open_with_journal(
                logical().with_interleave(Arc::clone(&hooks)),
                journal.clone(),
            )
            .unwrap(),
        );
        let tree = engine.tree("t").unwrap();

        hooks.arm(BEFORE_JOURNAL);
        let committer = {
            let engine = Arc::clone(&engine);
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let ctx = engine.context();
                ctx.begin().unwrap();
                for i in 0..9 {
                    let mut ex = ctx.exchange(&tree);
                    ex.append("k").append(i);
                    ex.value_mut().put(i);
                    ex.store().unwrap();
                }
                ctx.commit().unwrap();
                ctx.end();
            })
        };
        assert!(hooks.wait_parked(BEFORE_JOURNAL, WAIT));

        let checkpointer = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.request_checkpoint().unwrap())
        };
        assert!(hooks.wait_for_event(
            CHECKPOINT_ACTOR,
            "release:flushOnCheckpoint_a",
            WAIT
        ));
        thread::sleep(Duration::from_millis(20));
        assert!(!checkpointer.is_finished());
        assert_eq!(engine.checkpoint_marker(), Timestamp::ZERO);

        hooks.release(BEFORE_JOURNAL);
        committer.join().unwrap();
        let marker = checkpointer.join().unwrap();

        assert_eq!(
            hooks.sequence(CHECKPOINT_ACTOR),
            "acquire:flushOnCheckpoint_a,release:flushOnCheckpoint_a,\
             acquire:flushOnCheckpoint_b,release:flushOnCheckpoint_b,"
        );
        assert_eq!(engine.checkpoint_marker(), marker);
        let image = journal.load().unwrap().image.unwrap();
        assert_eq!(image.marker, marker);
        assert_eq!(image.entry_count(), 9);
        assert_eq!(journal.pending_records(), 0);
    }

    #[test]
    fn test_commit_after_capture_excluded() {
        let hooks = Arc::new(Interleave::new());
        let journal = Arc::new(MemoryJournal::new());
        let engine = Arc::new(
            Engine::open_with_journal(
                logical().with_interleave(Arc::clone(&hooks)),
                journal.clone(),
            )
            .unwrap(),
        );
        let tree = engine.tree("t").unwrap();
        put(&engine, &tree, 1, 1);

        hooks.arm(AFTER_CAPTURE);
        let checkpointer = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.request_checkpoint().unwrap())
        };
        assert!(hooks.wait_parked(AFTER_CAPTURE, WAIT));

        put(&engine, &tree, 2, 2);
        hooks.release(AFTER_CAPTURE);
        let marker = checkpointer.join().unwrap();

        let recovered = journal.load().unwrap();
        let image = recovered.image.unwrap();
        assert_eq!(image.marker, marker);
        assert_eq!(image.entry_count(), 1);
        assert_eq!(recovered.commits.len(), 1);
        assert!(recovered.commits[0].commit_ts > marker);
    }

    #[test]
    fn test_compaction_during_checkpoint_keeps_image() {
        let hooks = Arc::new(Interleave::new());
        let journal = Arc::new(MemoryJournal::new());
        let engine = Arc::new(
            Engine::open_with_journal(
                logical().with_interleave(Arc::clone(&hooks)),
                journal.clone(),
            )
            .unwrap(),
        );
        let tree = engine.tree("t").unwrap();
        put(&engine, &tree, 1, 1);

        hooks.arm(AFTER_CAPTURE);
        let checkpointer = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.request_checkpoint().unwrap())
        };
        assert!(hooks.wait_parked(AFTER_CAPTURE, WAIT));

        // Supersede the version visible at the marker, then prune.
        put(&engine, &tree, 1, 2);
        engine.compact();
        hooks.release(AFTER_CAPTURE);
        let marker = checkpointer.join().unwrap();

        let recovered = journal.load().unwrap();
        let image = recovered.image.unwrap();
        assert_eq!(image.marker, marker);
        assert_eq!(image.entry_count(), 1);
        assert_eq!(image.trees[0].entries[0].value, Value::Int(1));
        assert_eq!(recovered.commits.len(), 1);
        assert_eq!(get(&engine, &tree, 1), Value::Int(2));
    }
}
