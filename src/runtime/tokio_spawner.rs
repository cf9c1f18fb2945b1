//! The caller's own tokio runtime as a scheduler target.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::core::scheduler::{tracked, SchedulerCounters};
use crate::core::{Scheduler, SchedulerError, SchedulerId, SchedulerStats, UnitOfWork};

/// Spawns units onto the tokio runtime the submitting code is running on.
///
/// The runtime is resolved on every submission, never captured up front: a
/// submitter outside any runtime, or one whose runtime has shut down, is
/// rejected with `SchedulerUnavailable`. On a current-thread runtime this is
/// the cooperative, same-context model: units only make progress when the
/// code that dispatched them yields.
#[derive(Clone)]
pub struct TokioSpawner {
    id: SchedulerId,
    counters: Arc<SchedulerCounters>,
}

impl TokioSpawner {
    /// Create a spawner bound to whichever runtime submits to it.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SchedulerId::new(),
            counters: Arc::new(SchedulerCounters::default()),
        }
    }

    /// Create a spawner, checking that the calling code runs inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// `SchedulerError::SchedulerUnavailable` when called outside a tokio runtime.
    pub fn current() -> Result<Self, SchedulerError> {
        caller_runtime()?;
        Ok(Self::new())
    }
}

impl Default for TokioSpawner {
    fn default() -> Self {
        Self::new()
    }
}

fn caller_runtime() -> Result<Handle, SchedulerError> {
    Handle::try_current()
        .map_err(|e| SchedulerError::SchedulerUnavailable(format!("no caller runtime: {e}")))
}

impl Scheduler for TokioSpawner {
    fn id(&self) -> SchedulerId {
        self.id
    }

    fn is_running(&self) -> bool {
        Handle::try_current().is_ok()
    }

    fn submit(&self, unit: UnitOfWork) -> Result<(), SchedulerError> {
        let handle = caller_runtime()?;
        handle.spawn(tracked(unit, self.counters.accept()));
        Ok(())
    }

    fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }
}
