//! Fire-and-forget dispatch of units of work onto a scheduler.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{Scheduler, SchedulerError, SchedulerId};
use crate::util::clock::now_ms;

/// Proof that a unit was accepted for background execution.
///
/// Carries no handle to the unit: its outcome is never reported back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTicket {
    /// Sequence number assigned by the dispatcher.
    pub task_id: u64,
    /// Scheduler the unit was handed to.
    pub scheduler: SchedulerId,
    /// Pending units on that scheduler right after the handoff.
    pub pending: u64,
    /// Acceptance time in milliseconds since epoch.
    pub accepted_at_ms: u128,
}

/// Immediate acknowledgment of a dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchResult {
    /// Unit queued for background execution.
    Accepted(DispatchTicket),
    /// Unit was not queued.
    Rejected {
        /// Why the scheduler refused the unit.
        reason: String,
    },
}

impl DispatchResult {
    /// Whether the unit was queued.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

impl From<Result<DispatchTicket, SchedulerError>> for DispatchResult {
    fn from(result: Result<DispatchTicket, SchedulerError>) -> Self {
        match result {
            Ok(ticket) => Self::Accepted(ticket),
            Err(e) => Self::Rejected { reason: e.to_string() },
        }
    }
}

/// Hands units of work to a target scheduler and returns at once.
#[derive(Debug, Default)]
pub struct Dispatcher {
    next_task_id: AtomicU64,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `unit` on `target`.
    ///
    /// Performs no I/O and never waits on the unit.
    ///
    /// # Errors
    ///
    /// `SchedulerError::SchedulerUnavailable` if `target` is not running, or
    /// whatever the target's own submission refuses with.
    pub fn schedule<F>(&self, unit: F, target: &dyn Scheduler) -> Result<DispatchTicket, SchedulerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let scheduler = target.id();
        if !target.is_running() {
            return Err(SchedulerError::SchedulerUnavailable(format!(
                "scheduler {scheduler} is not running"
            )));
        }

        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = target.submit(Box::pin(unit)) {
            warn!(task_id, scheduler_id = %scheduler, error = %e, "Dispatch rejected");
            return Err(e);
        }

        let pending = target.stats().pending;
        debug!(task_id, scheduler_id = %scheduler, pending, "Unit dispatched");
        Ok(DispatchTicket {
            task_id,
            scheduler,
            pending,
            accepted_at_ms: now_ms(),
        })
    }
}
