//! # Prometheus Deferred Push
//!
//! Fire-and-forget dispatch of delayed push messages.
//!
//! A synchronous entry point validates a request, hands a deferred unit of
//! work to a scheduler and returns an acknowledgment straight away. The unit
//! later waits out its delay, posts one push request, and records the outcome
//! to a sink. The caller never sees that outcome.
//!
//! ## Scheduling targets
//!
//! - **Caller runtime** ([`runtime::TokioSpawner`]): the unit is spawned on the
//!   tokio runtime the entry point is already running on; callers outside a
//!   live runtime are rejected.
//! - **Worker scheduler** ([`core::WorkerScheduler`]): a dedicated OS thread
//!   with its own single-threaded tokio runtime. Producers on any thread submit
//!   through a bounded channel; `start()` waits on a readiness handshake and
//!   `stop(timeout)` joins the thread.
//!
//! ```rust,ignore
//! use prometheus_deferred_push::builders::build_service;
//! use prometheus_deferred_push::config::ServiceConfig;
//! use prometheus_deferred_push::runtime::{ContextArgs, SendMessageRequest};
//!
//! let cfg = ServiceConfig::from_env()?;
//! let service = build_service(&cfg)?;
//!
//! let status = service.send_message(
//!     SendMessageRequest::new("hello").with_delay(5),
//!     &ContextArgs::from_value(&host_args),
//! );
//! assert!(status.success); // queued, not delivered
//!
//! service.shutdown(cfg.worker.shutdown_timeout())?;
//! ```
//!
//! ## Limitations
//!
//! Queued work is not persisted and cannot be cancelled once accepted.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Scheduling abstractions, the worker scheduler and the deferred push action.
pub mod core;
/// Configuration models for the push endpoint, worker and service.
pub mod config;
/// Composition root building the message service from configuration.
pub mod builders;
/// Runtime adapters and the entry-point API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
