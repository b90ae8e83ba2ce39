// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Rendezvous hooks for forcing thread interleavings in tests.
//!
//! Code under test records named events and passes through named pause
//! points. A test arms a pause point, waits until a thread is parked there,
//! drives another thread into position, then releases the first one. The
//! recorded events show the order in which critical sections were entered.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A commit with its versions installed, before its journal append.
pub const BEFORE_JOURNAL: &str = "commit:before_journal";
/// A checkpoint with its marker allocated, before it waits on captured commits.
pub const AFTER_CAPTURE: &str = "checkpoint:after_capture";

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub actor: &'static str,
    pub name: String,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    armed: HashSet<&'static str>,
    parked: HashSet<&'static str>,
}

/// Shared event log and pause points.
#[derive(Debug, Default)]
pub struct Interleave {
    state: Mutex<State>,
    changed: Condvar,
}

impl Interleave {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event to the log.
    pub fn record(&self, actor: &'static str, name: impl Into<String>) {
        let mut state = self.state.lock();
        state.events.push(Event {
            actor,
            name: name.into(),
        });
        self.changed.notify_all();
    }

    /// Makes the next threads reaching `point` park there until released.
    pub fn arm(&self, point: &'static str) {
        self.state.lock().armed.insert(point);
    }

    /// Unparks every thread at `point` and disarms it.
    pub fn release(&self, point: &'static str) {
        let mut state = self.state.lock();
        state.armed.remove(point);
        self.changed.notify_all();
    }

    /// Called by code under test. Parks while `point` is armed.
    pub fn pause_point(&self, point: &'static str) {
        let mut state = self.state.lock();
        if !state.armed.contains(point) {
            return;
        }
        state.parked.insert(point);
        self.changed.notify_all();
        while state.armed.contains(point) {
            self.changed.wait(&mut state);
        }
        state.parked.remove(point);
    }

    /// Waits until some thread is parked at `point`. Returns false on timeout.
    pub fn wait_parked(&self, point: &'static str, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.parked.contains(point))
    }

    /// Waits until `actor` has recorded `name`. Returns false on timeout.
    pub fn wait_for_event(&self, actor: &'static str, name: &str, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| {
            state
                .events
                .iter()
                .any(|e| e.actor == actor && e.name == name)
        })
    }

    fn wait_until(&self, timeout: Duration, mut done: impl FnMut(&State) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !done(&state) {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return done(&state);
            }
        }
        true
    }

    /// Every event recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    /// Events recorded by `actor`, rendered as `name,name,...,`.
    pub fn sequence(&self, actor: &str) -> String {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| e.actor == actor)
            .fold(String::new(), |mut out, e| {
                out.push_str(&e.name);
                out.push(',');
                out
            })
    }

    /// Clears the event log.
    pub fn reset(&self) {
        self.state.lock().events.clear();
    }
}
