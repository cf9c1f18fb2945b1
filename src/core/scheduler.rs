//! Scheduler abstraction shared by the caller's runtime and the worker scheduler.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::SchedulerError;

/// A deferred, zero-argument operation that captured its own inputs.
///
/// Ownership moves into the scheduler on enqueue; nothing is ever returned
/// from it, which is what makes dispatch fire-and-forget.
pub type UnitOfWork = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Identity of a scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchedulerId(Uuid);

impl SchedulerId {
    /// Generate a fresh random identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SchedulerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SchedulerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A target that units of work can be enqueued onto.
///
/// Implementations must only enqueue: `submit` returns once the unit has been
/// handed off and never waits on the unit itself.
pub trait Scheduler: Send + Sync {
    /// Identity of this scheduler.
    fn id(&self) -> SchedulerId;

    /// Whether the scheduler currently accepts work.
    fn is_running(&self) -> bool;

    /// Hand a unit of work to the scheduler.
    ///
    /// # Errors
    ///
    /// `SchedulerError::SchedulerUnavailable` if the scheduler is not running,
    /// `SchedulerError::QueueFull` if a bounded queue is at capacity.
    fn submit(&self, unit: UnitOfWork) -> Result<(), SchedulerError>;

    /// Snapshot of the scheduler's counters.
    fn stats(&self) -> SchedulerStats;
}

/// Statistics about scheduler throughput. Observability only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Units accepted for execution.
    pub submitted: u64,
    /// Units accepted but not yet finished.
    pub pending: u64,
    /// Units that ran to completion.
    pub completed: u64,
    /// Units that panicked while running.
    pub panicked: u64,
    /// Units dropped unexecuted or aborted during shutdown.
    pub abandoned: u64,
}

/// Thread-safe counters backing [`SchedulerStats`].
#[derive(Debug, Default)]
pub(crate) struct SchedulerCounters {
    pub submitted: AtomicU64,
    pub pending: AtomicU64,
    pub completed: AtomicU64,
    pub panicked: AtomicU64,
    pub abandoned: AtomicU64,
}

impl SchedulerCounters {
    pub fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }

    /// Count a unit as accepted and return a guard that releases the pending
    /// slot when the unit is finished or dropped.
    pub fn accept(self: &Arc<Self>) -> PendingGuard {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_add(1, Ordering::Relaxed);
        PendingGuard {
            counters: Arc::clone(self),
        }
    }
}

/// Decrements the pending count exactly once, whether the unit finished,
/// panicked or was dropped unexecuted.
pub(crate) struct PendingGuard {
    counters: Arc<SchedulerCounters>,
}

impl PendingGuard {
    pub fn complete(self) {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.counters.pending.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Wrap a unit so its completion settles the pending guard.
pub(crate) fn tracked(unit: UnitOfWork, guard: PendingGuard) -> UnitOfWork {
    Box::pin(async move {
        unit.await;
        guard.complete();
    })
}
