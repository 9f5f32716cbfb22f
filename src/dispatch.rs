// MIT License - Copyright (c) 2026 The ad2sock authors
// ser2sock keypad client

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::task::{JoinError, JoinSet};
use tracing::error;

/// Runs caller-supplied callbacks as independent tasks.
///
/// Each callback gets its own task so a slow or panicking callback never
/// holds up the caller. Panics are logged, not propagated. Dropping the
/// dispatcher detaches callbacks still in flight; they run to completion.
#[derive(Debug, Default)]
pub struct CallbackDispatcher {
    tasks: Mutex<JoinSet<()>>,
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `callback` on its own task. Must be called from within a
    /// tokio runtime.
    pub fn dispatch<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut tasks = self.lock();
        while let Some(done) = tasks.try_join_next() {
            log_outcome(done);
        }
        tasks.spawn(async move { callback() });
    }

    /// Callbacks started and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Wait until every callback dispatched so far has finished.
    pub async fn idle(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.lock());
            if tasks.is_empty() {
                return;
            }
            while let Some(done) = tasks.join_next().await {
                log_outcome(done);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CallbackDispatcher {
    fn drop(&mut self) {
        self.lock().detach_all();
    }
}

fn log_outcome(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Callback panicked: {}", e);
        }
    }
}
