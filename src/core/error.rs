//! Error types for scheduler and delivery operations.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the scheduling layer.
///
/// These are surfaced synchronously to whoever called into the scheduler:
/// the per-message caller sees `SchedulerUnavailable`/`QueueFull` as a rejected
/// dispatch, the lifecycle owner sees the start/stop variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Target scheduler is not running (never started, stopping or stopped).
    #[error("scheduler unavailable: {0}")]
    SchedulerUnavailable(String),
    /// Worker did not signal readiness within the startup timeout.
    #[error("worker startup timed out after {0:?}")]
    StartupTimeout(Duration),
    /// Worker thread did not join within the shutdown timeout.
    #[error("worker shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
    /// Lifecycle method called from the wrong state.
    #[error("invalid state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: &'static str,
        /// State the scheduler was actually in.
        actual: &'static str,
    },
    /// Submission queue is at capacity.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// Internal failure (thread spawn, runtime build, worker panic).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors produced by a single outbound delivery.
///
/// Never propagated to the dispatching caller; captured into an
/// [`ActionOutcome`](crate::core::ActionOutcome) and logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The outbound call exceeded its time ceiling.
    #[error("network timeout after {0:?}")]
    NetworkTimeout(Duration),
    /// Transport-level failure (connection refused, DNS, TLS, ...).
    #[error("network error: {0}")]
    Network(String),
    /// Remote answered with a non-200 status.
    #[error("push rejected with status {code}: {body}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body, possibly empty.
        body: String,
    },
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
