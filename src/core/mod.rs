//! Core scheduling abstractions, the worker scheduler and the deferred push action.

pub mod action;
pub mod dispatcher;
pub mod error;
pub mod outcome;
pub mod scheduler;
pub mod worker_scheduler;

pub use action::{
    ActionOutcome, DelayedAction, HttpPushTransport, PushEnvelope, PushPayload, PushRequest,
    PushTransport,
};
pub use dispatcher::{DispatchResult, DispatchTicket, Dispatcher};
pub use error::{ActionError, AppResult, SchedulerError};
pub use outcome::{InMemoryOutcomeSink, OutcomeRecord, OutcomeSink, TracingOutcomeSink};
pub use scheduler::{Scheduler, SchedulerId, SchedulerStats, UnitOfWork};
pub use worker_scheduler::{SchedulerState, WorkerScheduler};
