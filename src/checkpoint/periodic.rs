// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Background checkpoint thread.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

/// Runs a checkpoint task on a fixed interval until dropped.
///
/// The task returns `false` to stop the thread early, e.g. once the engine
/// it checkpoints has gone away.
pub struct PeriodicCheckpointer {
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl PeriodicCheckpointer {
    pub fn spawn<F>(interval: Duration, mut task: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let shutdown = Arc::new((Mutex::new(false), Condvar::new()));
        let shutdown_clone = Arc::clone(&shutdown);

        let handle = std::thread::Builder::new()
            .name("burrow-checkpoint".into())
            .spawn(move || {
                let (stopped, wake) = &*shutdown_clone;
                loop {
                    {
                        let mut stopped = stopped.lock();
                        if !*stopped {
                            let _ = wake.wait_for(&mut stopped, interval);
                        }
                        if *stopped {
                            break;
                        }
                    }
                    if !task() {
                        debug!("checkpoint task finished");
                        break;
                    }
                }
            })?;

        debug!(?interval, "started periodic checkpoints");
        Ok(Self {
            shutdown,
            handle: Some(handle),
            interval,
        })
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stops the thread and waits for a running checkpoint to finish.
    pub fn stop(&mut self) {
        let (stopped, wake) = &*self.shutdown;
        *stopped.lock() = true;
        wake.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("checkpoint thread panicked");
            }
        }
    }
}

impl Drop for PeriodicCheckpointer {
    fn drop(&mut self) {
        self.stop();
    }
}
