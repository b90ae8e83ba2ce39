// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Retry policy for [`TransactionContext::run`](super::TransactionContext::run).

use std::time::Duration;

/// How a unit of work is retried after a conflict.
///
/// The first `min_retries` retries follow immediately after yielding the
/// thread. Later retries sleep with exponential backoff when
/// `wait_on_conflict` is set.
///
/// ```
/// use burrowdb::txn::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(100, 5, true).with_max_delay(Duration::from_millis(2));
/// assert_eq!(policy.max_attempts, 100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up with `RetryExhausted`. At least one.
    pub max_attempts: u32,
    /// Retries that only yield before backoff starts.
    pub min_retries: u32,
    /// Sleep between later retries.
    pub wait_on_conflict: bool,
    /// First backoff delay.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            min_retries: 5,
            wait_on_conflict: false,
            base_delay: Duration::from_micros(50),
            max_delay: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_retries: u32, wait_on_conflict: bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_retries,
            wait_on_conflict,
            ..Default::default()
        }
    }

    /// A policy that runs the unit of work exactly once.
    pub fn no_retry() -> Self {
        Self::new(1, 0, false)
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before the retry following failed attempt number `attempt`
    /// (1-based). `None` means yield instead of sleeping.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if !self.wait_on_conflict || attempt <= self.min_retries {
            return None;
        }
        let shift = (attempt - self.min_retries - 1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        Some(delay.min(self.max_delay))
    }

    /// Pauses between attempts.
    pub(crate) fn pause(&self, attempt: u32) {
        match self.delay(attempt) {
            Some(delay) => std::thread::sleep(delay),
            None => std::thread::yield_now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yields_without_wait() {
        let policy = RetryPolicy::new(100, 5, false);
        assert_eq!(policy.delay(1), None);
        assert_eq!(policy.delay(50), None);
    }

    #[test]
    fn test_backoff_after_min_retries() {
        let policy = RetryPolicy::new(100, 2, true)
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5));
        assert_eq!(policy.delay(1), None);
        assert_eq!(policy.delay(2), None);
        assert_eq!(policy.delay(3), Some(Duration::from_millis(1)));
        assert_eq!(policy.delay(4), Some(Duration::from_millis(2)));
        assert_eq!(policy.delay(5), Some(Duration::from_millis(4)));
        assert_eq!(policy.delay(6), Some(Duration::from_millis(5)));
        assert_eq!(policy.delay(u32::MAX), Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, 0, false).max_attempts, 1);
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }
}
