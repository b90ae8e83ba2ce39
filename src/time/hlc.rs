// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Hybrid Logical Clock (HLC) implementation.
//!
//! HLC combines physical time with a logical counter to provide monotonic timestamps
//! even when physical clocks are imperfect. A purely logical mode (counter only) is
//! available for deterministic tests and replay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{TimeService, Timestamp};

/// Hybrid Logical Clock time service.
///
/// Guarantees that each call to `now()` returns a timestamp greater than all previous
/// calls, even under concurrent access.
pub struct HlcTimeService {
    last_timestamp: AtomicU64,
    physical: bool,
}

impl HlcTimeService {
    /// Creates a clock that follows wall-clock nanoseconds.
    pub fn new() -> Self {
        Self {
            last_timestamp: AtomicU64::new(0),
            physical: true,
        }
    }

    /// Creates a counter-only clock: ticks are 1, 2, 3, ...
    pub fn logical() -> Self {
        Self {
            last_timestamp: AtomicU64::new(0),
            physical: false,
        }
    }

    /// Returns true if the clock tracks physical time.
    #[inline]
    pub fn is_physical(&self) -> bool {
        self.physical
    }

    fn physical_time_nanos(&self) -> u64 {
        if !self.physical {
            return 0;
        }
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

impl Default for HlcTimeService {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeService for HlcTimeService {
    fn now(&self) -> Timestamp {
        loop {
            let physical = self.physical_time_nanos();
            let last = self.last_timestamp.load(Ordering::Acquire);
            let new_ts = physical.max(last.saturating_add(1));

            match self.last_timestamp.compare_exchange(
                last,
                new_ts,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Timestamp::new(new_ts),
                Err(_) => continue,
            }
        }
    }

    #[inline]
    fn current(&self) -> Timestamp {
        Timestamp::new(self.last_timestamp.load(Ordering::Acquire))
    }

    fn observe(&self, ts: Timestamp) {
        self.last_timestamp.fetch_max(ts.get(), Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hlc_monotonic() {
        let hlc = HlcTimeService::new();
        let mut last = hlc.now();

        for _ in 0..1000 {
            let current = hlc.now();
            assert!(current > last, "HLC must be strictly increasing: {current} > {last}");
            last = current;
        }
    }

    #[test]
    fn test_hlc_concurrent_unique() {
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::thread;

        let hlc = Arc::new(HlcTimeService::new());
        let mut handles = vec![];

        for _ in 0..4 {
            let hlc = Arc::clone(&hlc);
            handles.push(thread::spawn(move || {
                (0..1000).map(|_| hlc.now()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for ts in handle.join().expect("thread panicked") {
                assert!(seen.insert(ts), "duplicate tick {ts}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_logical_ticks() {
        let clock = HlcTimeService::logical();
        assert!(!clock.is_physical());
        assert_eq!(clock.current(), Timestamp::ZERO);
        assert_eq!(clock.now(), Timestamp::new(1));
        assert_eq!(clock.now(), Timestamp::new(2));
        assert_eq!(clock.current(), Timestamp::new(2));
    }

    #[test]
    fn test_observe_advances() {
        let clock = HlcTimeService::logical();
        clock.observe(Timestamp::new(100));
        assert_eq!(clock.now(), Timestamp::new(101));

        // Observing an older tick never moves the clock backwards.
        clock.observe(Timestamp::new(50));
        assert_eq!(clock.now(), Timestamp::new(102));
    }

    #[test]
    fn stress_hlc_contention() {
        use std::sync::Arc;
        use std::thread;

        let hlc = Arc::new(HlcTimeService::new());
        let threads: Vec<_> = (0..16)
            .map(|_| {
                let hlc = Arc::clone(&hlc);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        let _ = hlc.now();
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
    }
}
