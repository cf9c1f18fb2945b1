//! Composition root: owns scheduler selection and the worker lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::{ExecutionMode, ServiceConfig};
use crate::core::{
    AppResult, DelayedAction, HttpPushTransport, OutcomeSink, PushTransport, Scheduler,
    TracingOutcomeSink, WorkerScheduler,
};
use crate::runtime::{MessageService, TokioSpawner};

/// Build a service posting over HTTP and logging outcomes.
///
/// In `CallerRuntime` mode this must be called from inside the tokio runtime
/// that will run the entry point. In `Worker` mode the worker thread is
/// started before returning; stop it with [`MessageService::shutdown`].
///
/// # Errors
///
/// Fails on invalid configuration, HTTP client construction, a missing caller
/// runtime, or worker startup failure.
pub fn build_service(cfg: &ServiceConfig) -> AppResult<MessageService> {
    let transport = HttpPushTransport::new(&cfg.push).context("building push transport")?;
    build_service_with(cfg, Arc::new(transport), Arc::new(TracingOutcomeSink))
}

/// Build a service over an arbitrary transport and outcome sink.
///
/// # Errors
///
/// See [`build_service`].
pub fn build_service_with(
    cfg: &ServiceConfig,
    transport: Arc<dyn PushTransport>,
    sink: Arc<dyn OutcomeSink>,
) -> AppResult<MessageService> {
    cfg.validate().context("invalid service configuration")?;

    let action = DelayedAction::from_config(&cfg.push, transport);
    let (target, worker): (Arc<dyn Scheduler>, Option<Arc<WorkerScheduler>>) = match cfg.mode {
        ExecutionMode::CallerRuntime => {
            let spawner = TokioSpawner::current().context("resolving caller runtime")?;
            (Arc::new(spawner), None)
        }
        ExecutionMode::Worker => {
            let worker = Arc::new(WorkerScheduler::new(cfg.worker.clone()));
            start_worker(&worker, cfg.worker.shutdown_timeout())?;
            let target: Arc<dyn Scheduler> = worker.clone();
            (target, Some(worker))
        }
    };

    info!(mode = ?cfg.mode, scheduler_id = %target.id(), "Message service ready");
    Ok(MessageService::new(
        action,
        sink,
        target,
        worker,
        cfg.push.topics.clone(),
        cfg.max_delay_secs,
    ))
}

/// Start `worker`, reaping a late-starting thread if startup fails.
fn start_worker(worker: &WorkerScheduler, shutdown_timeout: Duration) -> AppResult<()> {
    let Err(start_err) = worker.start() else {
        return Ok(());
    };
    let err = anyhow::Error::new(start_err);
    match worker.stop(shutdown_timeout) {
        Ok(()) => Err(err.context("starting worker scheduler")),
        Err(stop_err) => {
            warn!(
                scheduler_id = %worker.id(),
                error = %stop_err,
                "Worker thread not reaped after failed start"
            );
            Err(err.context(format!(
                "starting worker scheduler (cleanup failed: {stop_err})"
            )))
        }
    }
}
