//! Dedicated worker scheduler backed by one OS thread.
//!
//! The worker thread owns a single-threaded tokio runtime. Producers on any
//! thread hand units of work over a bounded tokio channel; the worker loop
//! receives them and spawns each onto its own runtime, so a unit waiting on a
//! delay or a network call does not hold up the ones queued behind it.
//!
//! # Lifecycle
//!
//! `Created -> Starting -> Running -> Stopping -> Stopped`. Exactly one
//! `start()` per instance. `start()` blocks until the worker signals readiness
//! over a one-shot channel or the startup timeout elapses. `stop(timeout)`
//! closes intake and waits for the worker thread to exit; a worker that
//! overruns the timeout keeps its `JoinHandle` in the scheduler so a later
//! `stop` can still join it.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{ShutdownPolicy, WorkerConfig};
use crate::core::scheduler::{tracked, SchedulerCounters};
use crate::core::{Scheduler, SchedulerError, SchedulerId, SchedulerStats, UnitOfWork};

/// Lifecycle state of a [`WorkerScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    /// Constructed, thread not yet spawned.
    Created = 0,
    /// Thread spawned, waiting for readiness.
    Starting = 1,
    /// Accepting work.
    Running = 2,
    /// Intake closed, worker winding down.
    Stopping = 3,
    /// Terminal.
    Stopped = 4,
}

impl SchedulerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    /// Lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

type ThreadStartHook = Arc<dyn Fn() + Send + Sync + 'static>;

/// Handle and exit signal for the spawned worker thread.
struct WorkerThread {
    handle: JoinHandle<()>,
    /// Disconnects when the worker thread has finished its loop.
    exited: Receiver<()>,
}

/// Everything the worker thread takes ownership of.
struct WorkerContext {
    id: SchedulerId,
    work_rx: mpsc::Receiver<UnitOfWork>,
    ready_tx: Sender<()>,
    exit_guard: Sender<()>,
    state: Arc<AtomicU8>,
    counters: Arc<SchedulerCounters>,
    policy: ShutdownPolicy,
    on_thread_start: Option<ThreadStartHook>,
}

/// An independently owned execution context running on its own thread.
pub struct WorkerScheduler {
    id: SchedulerId,
    config: WorkerConfig,
    state: Arc<AtomicU8>,
    /// Intake. `None` before startup and after stop.
    work_tx: Mutex<Option<mpsc::Sender<UnitOfWork>>>,
    worker: Mutex<Option<WorkerThread>>,
    counters: Arc<SchedulerCounters>,
    on_thread_start: Option<ThreadStartHook>,
    /// Serializes `start`/`stop`.
    lifecycle: Mutex<()>,
}

impl WorkerScheduler {
    /// Create a scheduler in the `Created` state. No thread is spawned yet.
    #[must_use]
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            id: SchedulerId::new(),
            config,
            state: Arc::new(AtomicU8::new(SchedulerState::Created as u8)),
            work_tx: Mutex::new(None),
            worker: Mutex::new(None),
            counters: Arc::new(SchedulerCounters::default()),
            on_thread_start: None,
            lifecycle: Mutex::new(()),
        }
    }

    /// Run `hook` on the worker thread before it signals readiness.
    #[must_use]
    pub fn on_thread_start<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_thread_start = Some(Arc::new(hook));
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Configuration this scheduler was built with.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Spawn the worker thread and wait for it to become ready.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidState` if called more than once
    /// - `SchedulerError::StartupTimeout` if readiness is not signalled in time;
    ///   the scheduler is then `Stopped` and the thread is kept for joining
    /// - `SchedulerError::Internal` if the thread or its runtime cannot be created
    pub fn start(&self) -> Result<(), SchedulerError> {
        let _lifecycle = self.lifecycle.lock();
        self.transition(SchedulerState::Created, SchedulerState::Starting)?;

        let (work_tx, work_rx) = mpsc::channel(self.config.max_queue_depth);
        let (ready_tx, ready_rx) = bounded::<()>(1);
        let (exit_guard, exited) = bounded::<()>(0);

        let ctx = WorkerContext {
            id: self.id,
            work_rx,
            ready_tx,
            exit_guard,
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
            policy: self.config.shutdown_policy,
            on_thread_start: self.on_thread_start.clone(),
        };

        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .stack_size(self.config.thread_stack_size)
            .spawn(move || run_worker(ctx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.set_state(SchedulerState::Stopped);
                error!(scheduler_id = %self.id, error = %e, "Failed to spawn worker thread");
                return Err(SchedulerError::Internal(format!("failed to spawn worker thread: {e}")));
            }
        };
        *self.worker.lock() = Some(WorkerThread { handle, exited });

        let timeout = self.config.startup_timeout();
        match ready_rx.recv_timeout(timeout) {
            Ok(()) => {
                // Intake must exist before anyone can observe `Running`.
                *self.work_tx.lock() = Some(work_tx);
                self.set_state(SchedulerState::Running);
                info!(
                    scheduler_id = %self.id,
                    thread = %self.config.thread_name,
                    max_queue_depth = self.config.max_queue_depth,
                    "Worker scheduler running"
                );
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                // Dropping the sender makes a late worker exit as soon as it starts its loop.
                drop(work_tx);
                self.set_state(SchedulerState::Stopped);
                warn!(
                    scheduler_id = %self.id,
                    timeout_ms = timeout.as_millis(),
                    "Worker did not signal readiness in time"
                );
                Err(SchedulerError::StartupTimeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                drop(work_tx);
                self.set_state(SchedulerState::Stopped);
                // The thread already returned; joining is immediate.
                let _ = self.join_worker(timeout);
                Err(SchedulerError::Internal(
                    "worker exited before signalling readiness".into(),
                ))
            }
        }
    }

    /// Enqueue a unit of work from any thread.
    ///
    /// Never blocks on the unit; only performs the handoff.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::SchedulerUnavailable` unless the scheduler is `Running`
    /// - `SchedulerError::QueueFull` if the submission queue is at capacity
    pub fn submit_threadsafe<F>(&self, unit: F) -> Result<(), SchedulerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.enqueue(Box::pin(unit))
    }

    fn enqueue(&self, unit: UnitOfWork) -> Result<(), SchedulerError> {
        let state = self.state();
        if state != SchedulerState::Running {
            return Err(self.unavailable(state));
        }

        let work_tx = self.work_tx.lock();
        let Some(tx) = work_tx.as_ref() else {
            return Err(self.unavailable(self.state()));
        };

        // Reserve first so a rejected unit never touches the counters.
        let permit = match tx.try_reserve() {
            Ok(permit) => permit,
            Err(mpsc::error::TrySendError::Full(())) => {
                warn!(scheduler_id = %self.id, "Worker queue is full");
                return Err(SchedulerError::QueueFull(format!(
                    "worker {} has {} queued units",
                    self.id, self.config.max_queue_depth
                )));
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                return Err(SchedulerError::SchedulerUnavailable(format!(
                    "worker {} has exited",
                    self.id
                )));
            }
        };
        permit.send(tracked(unit, self.counters.accept()));
        debug!(scheduler_id = %self.id, "Unit handed to worker");
        Ok(())
    }

    /// Close intake and join the worker thread within `timeout`.
    ///
    /// Calling `stop` again after a `ShutdownTimeout`, or after a startup
    /// timeout, retries the join of the retained thread.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidState` if the scheduler was never started
    /// - `SchedulerError::ShutdownTimeout` if the thread is still running after
    ///   `timeout`; the thread outlives this call and remains joinable
    pub fn stop(&self, timeout: Duration) -> Result<(), SchedulerError> {
        let _lifecycle = self.lifecycle.lock();
        match self.state() {
            state @ (SchedulerState::Created | SchedulerState::Starting) => {
                Err(SchedulerError::InvalidState {
                    expected: SchedulerState::Running.as_str(),
                    actual: state.as_str(),
                })
            }
            SchedulerState::Running => {
                self.set_state(SchedulerState::Stopping);
                self.work_tx.lock().take();
                info!(
                    scheduler_id = %self.id,
                    policy = ?self.config.shutdown_policy,
                    pending = self.counters.snapshot().pending,
                    "Stopping worker scheduler"
                );
                self.join_worker(timeout)
            }
            SchedulerState::Stopping | SchedulerState::Stopped => self.join_worker(timeout),
        }
    }

    fn join_worker(&self, timeout: Duration) -> Result<(), SchedulerError> {
        let mut slot = self.worker.lock();
        let Some(worker) = slot.as_ref() else {
            return Ok(());
        };

        match worker.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(worker) = slot.take() {
                    if worker.handle.join().is_err() {
                        warn!(scheduler_id = %self.id, "Worker thread panicked");
                    }
                }
                self.set_state(SchedulerState::Stopped);
                info!(scheduler_id = %self.id, "Worker thread joined");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    scheduler_id = %self.id,
                    timeout_ms = timeout.as_millis(),
                    "Worker thread did not exit in time; it outlives this stop call"
                );
                Err(SchedulerError::ShutdownTimeout(timeout))
            }
        }
    }

    fn transition(&self, from: SchedulerState, to: SchedulerState) -> Result<(), SchedulerError> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| SchedulerError::InvalidState {
                expected: from.as_str(),
                actual: SchedulerState::from_u8(actual).as_str(),
            })
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn unavailable(&self, state: SchedulerState) -> SchedulerError {
        SchedulerError::SchedulerUnavailable(format!("worker {} is {}", self.id, state.as_str()))
    }
}

impl Scheduler for WorkerScheduler {
    fn id(&self) -> SchedulerId {
        self.id
    }

    fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    fn submit(&self, unit: UnitOfWork) -> Result<(), SchedulerError> {
        self.enqueue(unit)
    }

    fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }
}

impl Drop for WorkerScheduler {
    fn drop(&mut self) {
        // Close intake but don't join; explicit stop() is required for that.
        if self.state() == SchedulerState::Running {
            self.set_state(SchedulerState::Stopping);
            self.work_tx.lock().take();
            warn!(
                scheduler_id = %self.id,
                "WorkerScheduler dropped without stop - worker thread detached"
            );
        }
    }
}

/// Body of the worker thread.
fn run_worker(ctx: WorkerContext) {
    let WorkerContext {
        id,
        mut work_rx,
        ready_tx,
        exit_guard,
        state,
        counters,
        policy,
        on_thread_start,
    } = ctx;
    // Declared first so it drops last, after the runtime and every task it owned.
    let _exit_guard = exit_guard;

    debug!(scheduler_id = %id, "Worker thread started");

    if let Some(hook) = on_thread_start {
        hook();
    }

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(scheduler_id = %id, error = %e, "Failed to create worker runtime");
            return;
        }
    };

    let loop_state = Arc::clone(&state);
    rt.block_on(async move {
        if ready_tx.send(()).is_err() {
            debug!(scheduler_id = %id, "Startup was abandoned before readiness");
        }
        drop(ready_tx);

        let mut inflight = JoinSet::new();
        loop {
            tokio::select! {
                received = work_rx.recv() => {
                    let Some(unit) = received else {
                        debug!(scheduler_id = %id, "Worker intake closed");
                        break;
                    };
                    let stopping = loop_state.load(Ordering::Acquire) == SchedulerState::Stopping as u8;
                    if stopping && policy == ShutdownPolicy::Abandon {
                        drop(unit);
                        counters.abandoned.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    inflight.spawn(unit);
                }
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    record_join(id, &counters, joined);
                }
            }
        }

        if policy == ShutdownPolicy::Abandon && !inflight.is_empty() {
            warn!(scheduler_id = %id, inflight = inflight.len(), "Aborting in-flight units on shutdown");
            inflight.abort_all();
        }
        while let Some(joined) = inflight.join_next().await {
            record_join(id, &counters, joined);
        }
    });
    drop(rt);

    state.store(SchedulerState::Stopped as u8, Ordering::Release);
    debug!(scheduler_id = %id, "Worker thread exiting");
}

fn record_join(id: SchedulerId, counters: &SchedulerCounters, joined: Result<(), JoinError>) {
    let Err(e) = joined else {
        return;
    };
    if e.is_panic() {
        counters.panicked.fetch_add(1, Ordering::Relaxed);
        warn!(scheduler_id = %id, "Unit of work panicked");
    } else {
        counters.abandoned.fetch_add(1, Ordering::Relaxed);
        debug!(scheduler_id = %id, "Unit of work aborted");
    }
}
