//! Timer used to arm retry attempts.

use std::time::Duration;

use tracing::trace;

/// Runs tasks after a delay on the tokio timer.
///
/// The scheduler owns no threads; each armed timeout is a spawned task that
/// sleeps and then runs its closure. Arming never blocks the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutScheduler;

impl TimeoutScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Arm `task` to run after `delay`.
    ///
    /// `describe` is evaluated lazily, only when the firing is logged.
    pub fn on_timeout<F, D>(&self, delay: Duration, task: F, describe: D)
    where
        F: FnOnce() + Send + 'static,
        D: FnOnce() -> String + Send + 'static,
    {
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            trace!(delay_ms = delay.as_millis() as u64, "timeout fired: {}", describe());
            task();
        });
    }
}
