//! Configuration models for the push endpoint, worker scheduler and service.

pub mod service;

pub use service::{ConfigError, ExecutionMode, PushConfig, ServiceConfig, ShutdownPolicy, WorkerConfig};
