//! Debounced job trigger with cancel-and-restart semantics.
//!
//! Every `trigger` aborts the pending timer and starts a new one, so a burst
//! of mutations results in a single run once the settle window elapses.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum DebounceError {
    #[error("debouncer needs a running tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Runs the most recently triggered job after `delay` of quiet.
#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `job`, replacing any job that has not fired yet.
    pub fn trigger<F, Fut>(&self, job: F) -> Result<(), DebounceError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current()?;
        let delay = self.delay;
        let mut pending = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            job().await;
        }));
        Ok(())
    }

    /// Drop the pending job, if any. Returns whether one was cancelled.
    pub fn cancel(&self) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Whether a triggered job is still waiting or running.
    pub fn is_pending(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        pending.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        // Only the last clone cancels the timer
        if Arc::strong_count(&self.pending) == 1 {
            self.cancel();
        }
    }
}
