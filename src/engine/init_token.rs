// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! One-shot initialization shared by worker threads.

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{Condvar, Mutex};

const UNSET: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

/// Runs a closure once across all callers and publishes its result.
///
/// The first caller to win the compare-and-set runs the closure; callers
/// arriving meanwhile block until the result is published, then all of them
/// observe the same value. If the running closure panics the token is reset
/// and one of the waiters takes over.
///
/// ```
/// use burrowdb::engine::InitToken;
///
/// let token = InitToken::new();
/// assert_eq!(token.get_or_run(|| 42), 42);
/// assert_eq!(token.get_or_run(|| 7), 42);
/// ```
#[derive(Debug)]
pub struct InitToken<T> {
    state: AtomicU8,
    result: Mutex<Option<T>>,
    published: Condvar,
}

impl<T> Default for InitToken<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InitToken<T> {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(UNSET),
            result: Mutex::new(None),
            published: Condvar::new(),
        }
    }

    /// True once a result has been published.
    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }
}

impl<T: Clone> InitToken<T> {
    /// The published result, if any.
    pub fn get(&self) -> Option<T> {
        self.result.lock().clone()
    }

    /// Returns the published result, running `init` first if no caller has.
    pub fn get_or_run(&self, init: impl FnOnce() -> T) -> T {
        let mut init = Some(init);
        loop {
            if let Some(run) = init.take() {
                if self
                    .state
                    .compare_exchange(UNSET, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    let reset = ResetOnUnwind(self);
                    let value = run();
                    std::mem::forget(reset);

                    let mut result = self.result.lock();
                    *result = Some(value.clone());
                    self.state.store(DONE, Ordering::Release);
                    self.published.notify_all();
                    return value;
                }
                init = Some(run);
            }

            let mut result = self.result.lock();
            while result.is_none() && self.state.load(Ordering::Acquire) == RUNNING {
                self.published.wait(&mut result);
            }
            if let Some(value) = result.as_ref() {
                return value.clone();
            }
            // The runner unwound; compete again.
        }
    }
}

struct ResetOnUnwind<'a, T>(&'a InitToken<T>);

impl<T> Drop for ResetOnUnwind<'_, T> {
    fn drop(&mut self) {
        let _result = self.0.result.lock();
        self.0.state.store(UNSET, Ordering::Release);
        self.0.published.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_runs_once() {
        let token = InitToken::new();
        assert!(!token.is_done());
        assert_eq!(token.get(), None);
        assert!(token.get_or_run(|| true));
        assert!(token.get_or_run(|| false));
        assert!(token.is_done());
        assert_eq!(token.get(), Some(true));
    }

    #[test]
    fn test_concurrent_callers_share_result() {
        let token = Arc::new(InitToken::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let token = Arc::clone(&token);
                let runs = Arc::clone(&runs);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    token.get_or_run(|| {
                        runs.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        format!("checked by {i}")
                    })
                })
            })
            .collect();

        let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_panic_resets() {
        let token = Arc::new(InitToken::<u32>::new());
        let panicking = Arc::clone(&token);
        let result = thread::spawn(move || panicking.get_or_run(|| panic!("boom"))).join();
        assert!(result.is_err());
        assert!(!token.is_done());
        assert_eq!(token.get_or_run(|| 3), 3);
    }
}
