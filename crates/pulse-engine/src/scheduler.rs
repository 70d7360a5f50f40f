//! Cancellable periodic and delayed tasks.
//!
//! Both the ingestion cadence and the debounce timers run through these
//! helpers so cancellation is uniform: dropping a [`TaskHandle`] aborts
//! the underlying task deterministically.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a scheduled task; aborts the task on drop.
#[derive(Debug)]
pub struct TaskHandle {
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Cancels the task. Work already executing synchronously completes;
    /// the task stops at its next await point.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the task has finished or been cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Runs `work` repeatedly, sleeping `next_delay()` before each invocation.
///
/// The delay source is consulted before every iteration, so cadence
/// changes take effect on the next scheduled tick rather than mid-sleep
/// retroactively.
pub fn repeat<D, F>(mut next_delay: D, mut work: F) -> TaskHandle
where
    D: FnMut() -> Duration + Send + 'static,
    F: FnMut() + Send + 'static,
{
    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(next_delay()).await;
            work();
        }
    });
    TaskHandle { handle }
}

/// Runs `work` once after `after` elapses.
pub fn delay<F>(after: Duration, work: F) -> TaskHandle
where
    F: FnOnce() + Send + 'static,
{
    let handle = tokio::spawn(async move {
        tokio::time::sleep(after).await;
        work();
    });
    TaskHandle { handle }
}

/// Runs `work` as its own task, immediately.
pub fn immediate<F>(work: F) -> TaskHandle
where
    F: FnOnce() + Send + 'static,
{
    let handle = tokio::spawn(async move { work() });
    TaskHandle { handle }
}
