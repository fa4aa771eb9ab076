//! Background task plumbing.
//!
//! The cache sweeper, the memory sampler, and the cleanup loop all run as
//! detached tokio tasks with the same shutdown shape: a watch channel flips,
//! the loop finishes its in-flight cycle, then returns.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Handle to a periodic background task. Dropping the handle leaves the task
/// running; call [`shutdown`](Self::shutdown) for a graceful stop.
pub struct BackgroundHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BackgroundHandle {
    pub(crate) fn new(name: &'static str, shutdown: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { name, shutdown, task }
    }

    /// Signal the task to stop and wait for its in-flight cycle to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(task = self.name, error = %e, "background task did not exit cleanly");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}
