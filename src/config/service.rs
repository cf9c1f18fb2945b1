//! Service, push endpoint and worker scheduler configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// JSON input could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// A required environment variable is missing.
    #[error("missing environment variable `{0}`")]
    MissingEnv(&'static str),
}

/// Which scheduler deferred deliveries run on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// The tokio runtime the entry point itself is running on.
    CallerRuntime,
    /// A dedicated worker thread owned by the service.
    #[default]
    Worker,
}

impl ExecutionMode {
    /// Parse the `DISPATCH_MODE` spelling.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for unknown values.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "caller_runtime" | "caller" => Ok(Self::CallerRuntime),
            "worker" => Ok(Self::Worker),
            other => Err(ConfigError::Invalid(format!("unknown dispatch mode `{other}`"))),
        }
    }
}

/// What a stopping worker does with work it has already accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Run queued and in-flight units to completion before exiting.
    #[default]
    Drain,
    /// Drop queued units and abort in-flight ones.
    Abandon,
}

/// Outbound push endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Push endpoint URL.
    pub endpoint: String,
    /// Bearer token sent in the authorization header.
    pub api_token: String,
    /// Device identifier used when the caller context carries none.
    #[serde(default = "default_device")]
    pub default_device: String,
    /// Ceiling on a single outbound call, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Topics advertised to callers.
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
}

fn default_device() -> String {
    "unknown_device".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

fn default_topics() -> Vec<String> {
    ["A", "B", "C", "D"].iter().map(ToString::to_string).collect()
}

impl PushConfig {
    /// Create a push config with defaults for everything but the endpoint and token.
    pub fn new(endpoint: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token: api_token.into(),
            default_device: default_device(),
            request_timeout_secs: default_request_timeout_secs(),
            topics: default_topics(),
        }
    }

    /// Set the fallback device identifier.
    #[must_use]
    pub fn with_default_device(mut self, device: impl Into<String>) -> Self {
        self.default_device = device.into();
        self
    }

    /// Set the outbound call ceiling.
    #[must_use]
    pub const fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Outbound call ceiling as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate push configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ConfigError::Invalid("endpoint must be an http(s) URL".into()));
        }
        if self.api_token.trim().is_empty() {
            return Err(ConfigError::Invalid("api_token must not be empty".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Worker scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// OS thread name.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// Stack size for the worker thread in bytes.
    #[serde(default = "default_thread_stack_size")]
    pub thread_stack_size: usize,
    /// Maximum units waiting in the submission queue.
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
    /// How long `start()` waits for the readiness signal.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    /// Join timeout used by the service's shutdown path.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Fate of accepted work on stop.
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,
}

fn default_thread_name() -> String {
    "dp-worker".to_string()
}

const fn default_thread_stack_size() -> usize {
    2 * 1024 * 1024
}

const fn default_max_queue_depth() -> usize {
    1024
}

const fn default_startup_timeout_ms() -> u64 {
    5_000
}

const fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            thread_stack_size: default_thread_stack_size(),
            max_queue_depth: default_max_queue_depth(),
            startup_timeout_ms: default_startup_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            shutdown_policy: ShutdownPolicy::default(),
        }
    }
}

impl WorkerConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the submission queue bound.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    /// Set the startup handshake timeout.
    #[must_use]
    pub const fn with_startup_timeout_ms(mut self, ms: u64) -> Self {
        self.startup_timeout_ms = ms;
        self
    }

    /// Set the shutdown join timeout.
    #[must_use]
    pub const fn with_shutdown_timeout_ms(mut self, ms: u64) -> Self {
        self.shutdown_timeout_ms = ms;
        self
    }

    /// Set the shutdown policy.
    #[must_use]
    pub const fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Startup handshake timeout as a `Duration`.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Shutdown join timeout as a `Duration`.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate worker configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name.is_empty() {
            return Err(ConfigError::Invalid("thread_name must not be empty".into()));
        }
        if self.max_queue_depth == 0 {
            return Err(ConfigError::Invalid("max_queue_depth must be greater than 0".into()));
        }
        if self.startup_timeout_ms == 0 {
            return Err(ConfigError::Invalid("startup_timeout_ms must be greater than 0".into()));
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err(ConfigError::Invalid("thread_stack_size must be at least 64 KiB".into()));
        }
        Ok(())
    }
}

/// Root service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Outbound push endpoint.
    pub push: PushConfig,
    /// Worker scheduler settings, used when `mode` is `Worker`.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Scheduler selection.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Upper bound applied to requested delays.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

const fn default_max_delay_secs() -> u64 {
    24 * 60 * 60
}

impl ServiceConfig {
    /// Create a config with default worker settings.
    #[must_use]
    pub fn new(push: PushConfig) -> Self {
        Self {
            push,
            worker: WorkerConfig::default(),
            mode: ExecutionMode::default(),
            max_delay_secs: default_max_delay_secs(),
        }
    }

    /// Set the execution mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the worker settings.
    #[must_use]
    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    /// Validate all sections.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure, prefixed with its section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.push
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("push: {e}")))?;
        if self.mode == ExecutionMode::Worker {
            self.worker
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("worker: {e}")))?;
        }
        Ok(())
    }

    /// Parse service configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` or `ConfigError::Invalid`.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(input)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the process environment, reading `.env` first
    /// if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnv` for absent required variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Reads `PUSH_ENDPOINT`, `PUSH_API_TOKEN` (required), `PUSH_DEFAULT_DEVICE`
    /// and `DISPATCH_MODE` (optional).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnv` or a validation failure.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup("PUSH_ENDPOINT").ok_or(ConfigError::MissingEnv("PUSH_ENDPOINT"))?;
        let token = lookup("PUSH_API_TOKEN").ok_or(ConfigError::MissingEnv("PUSH_API_TOKEN"))?;

        let mut push = PushConfig::new(endpoint, token);
        if let Some(device) = lookup("PUSH_DEFAULT_DEVICE") {
            push = push.with_default_device(device);
        }

        let mut cfg = Self::new(push);
        if let Some(mode) = lookup("DISPATCH_MODE") {
            cfg.mode = ExecutionMode::parse(&mode)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_worker_config_defaults_are_valid() {
        let cfg = WorkerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.shutdown_policy, ShutdownPolicy::Drain);
        assert_eq!(cfg.startup_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_worker_config_rejects_zero_queue() {
        let cfg = WorkerConfig::new().with_max_queue_depth(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_push_config_rejects_non_http_endpoint() {
        let cfg = PushConfig::new("ftp://push.local", "token");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_service_config_from_json_applies_defaults() {
        let json = r#"{
            "push": { "endpoint": "https://push.local/api", "api_token": "secret" },
            "mode": "caller_runtime"
        }"#;
        let cfg = ServiceConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.mode, ExecutionMode::CallerRuntime);
        assert_eq!(cfg.push.request_timeout_secs, 30);
        assert_eq!(cfg.push.topics, vec!["A", "B", "C", "D"]);
        assert_eq!(cfg.worker.max_queue_depth, 1024);
    }

    #[test]
    fn test_service_config_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PUSH_ENDPOINT", "http://127.0.0.1:9000/push"),
            ("PUSH_API_TOKEN", "t0k3n"),
            ("PUSH_DEFAULT_DEVICE", "AA:BB:CC:DD:EE:FF"),
            ("DISPATCH_MODE", "worker"),
        ]);
        let cfg = ServiceConfig::from_lookup(|k| vars.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(cfg.mode, ExecutionMode::Worker);
        assert_eq!(cfg.push.default_device, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_service_config_missing_token() {
        let err = ServiceConfig::from_lookup(|k| {
            (k == "PUSH_ENDPOINT").then(|| "http://127.0.0.1/push".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("PUSH_API_TOKEN")));
    }
}
