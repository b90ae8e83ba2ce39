// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Internal macros.
//!
//! ## interleave!
//!
//! Marks a rendezvous point on a hot path. With `cfg(test)` or the
//! `interleave` feature it runs the body against the installed
//! [`Interleave`](crate::checkpoint::Interleave) hooks, if any. In every other
//! build it expands to nothing, so the hooks field it names need not exist.
//!
//! ```ignore
//! interleave!(self.hooks, |h| h.pause_point("commit:before_journal"));
//! ```

#[cfg(any(test, feature = "interleave"))]
macro_rules! interleave {
    ($hooks:expr, |$h:ident| $body:expr) => {
        if let Some($h) = $hooks.as_ref() {
            $body;
        }
    };
}

#[cfg(not(any(test, feature = "interleave")))]
macro_rules! interleave {
    ($($tokens:tt)*) => {};
}
