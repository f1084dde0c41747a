//! Single cancellable delayed callback used to schedule reconnects.

use std::time::Duration;

use tokio::task::JoinHandle;

/// At most one pending timer. Scheduling again supersedes the previous one.
///
/// An abort can lose the race against a callback that already ran, so the
/// callback's effect must be checked by its receiver (the manager compares
/// generations when the fire event arrives).
#[derive(Debug, Default)]
pub struct ReconnectTimer {
    pending: Option<JoinHandle<()>>,
}

impl ReconnectTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` after `delay`, replacing any pending timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        }));
    }

    /// Cancel the pending timer, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                let was_pending = !handle.is_finished();
                handle.abort();
                was_pending
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
