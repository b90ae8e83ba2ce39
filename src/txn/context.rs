// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Per-thread transaction binding.

use std::cell::RefCell;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::time::Timestamp;
use crate::tree::Tree;

use super::error::TxnError;
use super::exchange::Exchange;
use super::manager::TransactionManager;
use super::retry::RetryPolicy;
use super::transaction::{Transaction, TxnState};

#[derive(Debug)]
struct Scope {
    txn: Option<Transaction>,
    state: TxnState,
    /// One flag per open `begin`, set once that scope commits.
    scopes: Vec<bool>,
    rollback_pending: bool,
}

/// The transaction a thread is working in.
///
/// `begin`/`commit`/`end` calls nest: only the outermost scope commits to
/// the engine, and a nested scope that ends without committing rolls back
/// the whole transaction. Cursors created with [`exchange`](Self::exchange)
/// read and write through the active transaction, or auto-commit each
/// operation when none is active.
///
/// A context is not `Sync`; give each thread its own.
pub struct TransactionContext {
    manager: Arc<TransactionManager>,
    policy: RetryPolicy,
    scope: RefCell<Scope>,
}

impl TransactionContext {
    pub fn new(manager: Arc<TransactionManager>, policy: RetryPolicy) -> Self {
        Self {
            manager,
            policy,
            scope: RefCell::new(Scope {
                txn: None,
                state: TxnState::NotStarted,
                scopes: Vec::new(),
                rollback_pending: false,
            }),
        }
    }

    #[inline]
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Policy used by auto-committed cursor operations.
    #[inline]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn state(&self) -> TxnState {
        self.scope.borrow().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == TxnState::Active
    }

    /// Number of open `begin` scopes.
    pub fn depth(&self) -> usize {
        self.scope.borrow().scopes.len()
    }

    /// Start timestamp of the bound transaction.
    pub fn start_ts(&self) -> Option<Timestamp> {
        self.scope.borrow().txn.as_ref().map(Transaction::start_ts)
    }

    /// Commit timestamp of the bound transaction, once committed.
    pub fn commit_ts(&self) -> Option<Timestamp> {
        self.scope.borrow().txn.as_ref().and_then(Transaction::commit_ts)
    }

    /// Opens a scope. The outermost scope starts a new transaction.
    pub fn begin(&self) -> Result<(), TxnError> {
        let mut scope = self.scope.borrow_mut();
        if scope.scopes.is_empty() {
            scope.txn = Some(self.manager.begin());
            scope.state = TxnState::Active;
            scope.rollback_pending = false;
        } else if scope.state.is_finished() {
            return Err(TxnError::NotActive { state: scope.state });
        }
        scope.scopes.push(false);
        Ok(())
    }

    /// Commits the innermost scope. Only the outermost commit validates and
    /// publishes the transaction.
    pub fn commit(&self) -> Result<(), TxnError> {
        let mut scope = self.scope.borrow_mut();
        let depth = scope.scopes.len();
        if depth > 0 && scope.rollback_pending {
            return Err(TxnError::RollbackPending);
        }
        if depth == 0 || scope.state != TxnState::Active {
            return Err(TxnError::NotActive { state: scope.state });
        }
        if depth > 1 {
            if let Some(committed) = scope.scopes.last_mut() {
                *committed = true;
            }
            return Ok(());
        }

        let Scope { txn, state, scopes, .. } = &mut *scope;
        let Some(txn) = txn.as_mut() else {
            return Err(TxnError::NotActive { state: *state });
        };
        let result = self.manager.commit(txn);
        *state = txn.state();
        if result.is_ok() {
            if let Some(committed) = scopes.last_mut() {
                *committed = true;
            }
        }
        result.map(|_| ())
    }

    /// Aborts the bound transaction. Enclosing scopes can no longer commit.
    pub fn rollback(&self) {
        let mut scope = self.scope.borrow_mut();
        if let Some(txn) = scope.txn.as_mut() {
            if txn.is_active() {
                let _ = self.manager.abort(txn);
            }
        }
        if scope.state == TxnState::Active {
            scope.state = TxnState::Aborted;
        }
        if !scope.scopes.is_empty() {
            scope.rollback_pending = true;
        }
    }

    /// Closes the innermost scope. Closing the outermost scope releases the
    /// transaction, rolling it back if it never committed.
    pub fn end(&self) {
        let (committed, remaining, state) = {
            let mut scope = self.scope.borrow_mut();
            let Some(committed) = scope.scopes.pop() else {
                return;
            };
            (committed, scope.scopes.len(), scope.state)
        };

        if !committed && state == TxnState::Active {
            debug!(depth = remaining + 1, "scope ended without commit, rolling back");
            self.rollback();
        }
        if remaining == 0 {
            let mut scope = self.scope.borrow_mut();
            scope.txn = None;
            scope.state = TxnState::Ended;
            scope.rollback_pending = false;
        }
    }

    /// Runs `unit` in a transaction, retrying on conflict, and returns the
    /// number of attempts used.
    ///
    /// Inside an active transaction `unit` joins it and runs once; the
    /// outermost `run` owns the retries.
    pub fn run<F>(
        &self,
        max_attempts: u32,
        min_retries: u32,
        wait_on_conflict: bool,
        unit: F,
    ) -> Result<u32, TxnError>
    where
        F: FnMut(&TransactionContext) -> Result<(), TxnError>,
    {
        self.run_with(
            RetryPolicy {
                max_attempts: max_attempts.max(1),
                min_retries,
                wait_on_conflict,
                ..self.policy
            },
            unit,
        )
    }

    /// Like [`run`](Self::run) with an explicit policy.
    pub fn run_with<F>(&self, policy: RetryPolicy, mut unit: F) -> Result<u32, TxnError>
    where
        F: FnMut(&TransactionContext) -> Result<(), TxnError>,
    {
        if self.depth() > 0 {
            self.begin()?;
            let result = unit(self).and_then(|()| self.commit());
            self.end();
            return result.map(|()| 1);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.begin()?;
            let result = unit(self).and_then(|()| self.commit());
            self.end();
            match result {
                Ok(()) => return Ok(attempt),
                Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                    debug!(attempt, error = %err, "retrying transaction");
                    policy.pause(attempt);
                }
                Err(err) if err.is_retryable() => {
                    warn!(attempts = attempt, error = %err, "transaction retry limit reached");
                    return Err(TxnError::RetryExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    if let TxnError::Consistency(violation) = &err {
                        error!(
                            key = %violation.key,
                            expected = violation.expected,
                            actual = violation.actual,
                            "consistency violation"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    /// A cursor over `tree` bound to this context.
    pub fn exchange(&self, tree: &Arc<Tree>) -> Exchange<'_> {
        Exchange::new(self, Arc::clone(tree))
    }

    /// Runs `op` against the bound transaction, or in a fresh auto-committed
    /// transaction when none is bound.
    pub(crate) fn with_txn<R>(
        &self,
        mut op: impl FnMut(&TransactionManager, &mut Transaction) -> Result<R, TxnError>,
    ) -> Result<R, TxnError> {
        {
            let mut scope = self.scope.borrow_mut();
            if let Some(txn) = scope.txn.as_mut() {
                return op(&*self.manager, txn);
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut txn = self.manager.begin();
            let result = match op(&*self.manager, &mut txn) {
                Ok(value) => self.manager.commit(&mut txn).map(|_| value),
                Err(err) => {
                    let _ = self.manager.abort(&mut txn);
                    Err(err)
                }
            };
            match result {
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    self.policy.pause(attempt);
                }
                Err(err) if err.is_retryable() => {
                    return Err(TxnError::RetryExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                other => return other,
            }
        }
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scope = self.scope.borrow();
        f.debug_struct("TransactionContext")
            .field("state", &scope.state)
            .field("depth", &scope.scopes.len())
            .field("start_ts", &scope.txn.as_ref().map(Transaction::start_ts))
            .finish()
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        let scope = self.scope.get_mut();
        if let Some(txn) = scope.txn.as_mut() {
            if txn.is_active() {
                let _ = self.manager.abort(txn);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointCoordinator;
    use crate::key::Key;
    use crate::storage::MemoryJournal;
    use crate::time::HlcTimeService;
    use crate::tree::{TreeId, DEFAULT_FANOUT};
    use crate::value::Value;

    fn setup() -> (Arc<TransactionManager>, Arc<Tree>) {
        let mgr = Arc::new(TransactionManager::new(
            Arc::new(HlcTimeService::logical()),
            Arc::new(MemoryJournal::new()),
            Arc::new(CheckpointCoordinator::default()),
        ));
        (mgr, Arc::new(Tree::new(TreeId(1), "t", DEFAULT_FANOUT, 16)))
    }

    fn counter_key() -> Vec<u8> {
        Key::from_segments(["counter"]).encoded().to_vec()
    }

    #[test]
    fn test_state_transitions() {
        let (mgr, _) = setup();
        let ctx = TransactionContext::new(mgr, RetryPolicy::default());
        assert_eq!(ctx.state(), TxnState::NotStarted);

        ctx.begin().unwrap();
        assert_eq!(ctx.state(), TxnState::Active);
        assert!(ctx.start_ts().is_some());
        ctx.commit().unwrap();
        assert_eq!(ctx.state(), TxnState::Committed);
        assert!(ctx.commit_ts().is_some());
        ctx.end();
        assert_eq!(ctx.state(), TxnState::Ended);
        assert!(ctx.start_ts().is_none());

        ctx.begin().unwrap();
        ctx.rollback();
        assert_eq!(ctx.state(), TxnState::Aborted);
        assert!(matches!(ctx.commit(), Err(TxnError::RollbackPending)));
        ctx.end();
        assert_eq!(ctx.state(), TxnState::Ended);
    }

    #[test]
    fn test_end_without_commit_rolls_back() {
        let (mgr, tree) = setup();
        let ctx = TransactionContext::new(Arc::clone(&mgr), RetryPolicy::default());
        ctx.begin().unwrap();
        ctx.with_txn(|m, txn| m.write(txn, &tree, &counter_key(), Value::Int(1)))
            .unwrap();
        ctx.end();
        assert_eq!(mgr.stats().rollbacks, 1);
        assert_eq!(mgr.active_count(), 0);

        let value = ctx
            .with_txn(|m, txn| m.read(txn, &tree, &counter_key()))
            .unwrap();
        assert_eq!(value, Value::Undefined);
    }

    #[test]
    fn test_nested_scope_rollback_poisons_outer() {
        let (mgr, _) = setup();
        let ctx = TransactionContext::new(mgr, RetryPolicy::default());
        ctx.begin().unwrap();
        ctx.begin().unwrap();
        assert_eq!(ctx.depth(), 2);
        ctx.end();
        assert_eq!(ctx.state(), TxnState::Aborted);
        assert!(matches!(ctx.commit(), Err(TxnError::RollbackPending)));
        ctx.end();
        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.state(), TxnState::Ended);

        // A fresh outermost scope starts clean.
        ctx.begin().unwrap();
        ctx.commit().unwrap();
        ctx.end();
    }

    #[test]
    fn test_nested_run_joins_outer() {
        let (mgr, tree) = setup();
        let ctx = TransactionContext::new(Arc::clone(&mgr), RetryPolicy::default());
        let attempts = ctx
            .run(10, 1, false, |ctx| {
                let outer_start = ctx.start_ts();
                let inner = ctx.run(10, 1, false, |ctx| {
                    assert_eq!(ctx.start_ts(), outer_start);
                    ctx.with_txn(|m, txn| m.write(txn, &tree, &counter_key(), Value::Int(7)))
                })?;
                assert_eq!(inner, 1);
                Ok(())
            })
            .unwrap();
        assert_eq!(attempts, 1);
        assert_eq!(mgr.stats().commits, 1);
    }

    #[test]
    fn test_run_retries_conflict() {
        let (mgr, tree) = setup();
        let ctx = TransactionContext::new(Arc::clone(&mgr), RetryPolicy::default());
        let rival = TransactionContext::new(Arc::clone(&mgr), RetryPolicy::default());

        let mut interfered = false;
        let attempts = ctx
            .run(5, 1, false, |ctx| {
                let current = ctx.with_txn(|m, txn| m.read(txn, &tree, &counter_key()))?;
                if !interfered {
                    interfered = true;
                    rival.with_txn(|m, txn| m.write(txn, &tree, &counter_key(), Value::Int(100)))?;
                }
                let next = current.get_int().unwrap_or(0) + 1;
                ctx.with_txn(|m, txn| m.write(txn, &tree, &counter_key(), Value::Int(next)))
            })
            .unwrap();

        assert_eq!(attempts, 2);
        let value = ctx
            .with_txn(|m, txn| m.read(txn, &tree, &counter_key()))
            .unwrap();
        assert_eq!(value, Value::Int(101));
    }

    #[test]
    fn test_run_exhausts() {
        let (mgr, tree) = setup();
        let ctx = TransactionContext::new(Arc::clone(&mgr), RetryPolicy::default());
        let rival = TransactionContext::new(Arc::clone(&mgr), RetryPolicy::default());

        let mut calls = 0;
        let err = ctx
            .run(3, 0, true, |ctx| {
                calls += 1;
                ctx.with_txn(|m, txn| m.write(txn, &tree, &counter_key(), Value::Int(1)))?;
                rival.with_txn(|m, txn| m.write(txn, &tree, &counter_key(), Value::Int(2)))
            })
            .unwrap_err();

        assert_eq!(calls, 3);
        match err {
            TxnError::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.is_retryable());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_run_does_not_retry_other_errors() {
        let (mgr, _) = setup();
        let ctx = TransactionContext::new(mgr, RetryPolicy::default());
        let mut calls = 0;
        let err = ctx
            .run(10, 0, false, |_| {
                calls += 1;
                Err(TxnError::consistency("{1}", 1, 2))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, TxnError::Consistency(_)));
        assert_eq!(ctx.state(), TxnState::Ended);
    }
}
