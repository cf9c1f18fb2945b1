//! Entry point: request/response models and the message service.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::core::{
    DelayedAction, DispatchResult, Dispatcher, OutcomeRecord, OutcomeSink, Scheduler,
    SchedulerError, SchedulerStats, WorkerScheduler,
};

/// Accepted acknowledgment text.
pub const ACCEPTED_MESSAGE: &str = "Message is being sent asynchronously.";

const DEFAULT_CLIENT_ID: &str = "unknown_client";

/// Target topics: a single topic or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Topics {
    /// One topic.
    One(String),
    /// Several topics.
    Many(Vec<String>),
}

impl Topics {
    /// Trimmed, non-empty topic names.
    #[must_use]
    pub fn normalize(&self) -> Vec<String> {
        let raw: &[String] = match self {
            Self::One(topic) => std::slice::from_ref(topic),
            Self::Many(topics) => topics,
        };
        raw.iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

/// User-supplied `send_message` arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// Target topics.
    #[serde(default)]
    pub topics: Option<Topics>,
    /// Message text.
    pub message: String,
    /// Delay in seconds; negative values are treated as 0.
    #[serde(default)]
    pub delay: Option<i64>,
}

impl SendMessageRequest {
    /// Request with no topics and no delay.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            topics: None,
            message: message.into(),
            delay: None,
        }
    }

    /// Set the topics.
    #[must_use]
    pub fn with_topics(mut self, topics: Topics) -> Self {
        self.topics = Some(topics);
        self
    }

    /// Set the delay in seconds.
    #[must_use]
    pub const fn with_delay(mut self, delay_secs: i64) -> Self {
        self.delay = Some(delay_secs);
        self
    }
}

/// Caller identity injected by the host, never by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextArgs {
    /// Client identifier, defaults to `unknown_client`.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Device address, defaults to the configured device.
    #[serde(default)]
    pub mac_address: Option<String>,
}

impl ContextArgs {
    /// Read known fields out of a host-provided mapping.
    ///
    /// Missing, non-string or blank fields are left unset; anything that is
    /// not an object yields empty context.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
        };
        Self {
            client_id: field("client_id"),
            mac_address: field("mac_address"),
        }
    }

    fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string())
    }
}

/// Immediate status returned by `send_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendStatus {
    /// Whether the message was accepted for background delivery.
    pub success: bool,
    /// Acknowledgment or rejection text.
    pub result: String,
    /// Dispatch sequence number when accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<u64>,
}

impl SendStatus {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            result: reason.into(),
            task_id: None,
        }
    }
}

impl From<DispatchResult> for SendStatus {
    fn from(result: DispatchResult) -> Self {
        match result {
            DispatchResult::Accepted(ticket) => Self {
                success: true,
                result: ACCEPTED_MESSAGE.to_string(),
                task_id: Some(ticket.task_id),
            },
            DispatchResult::Rejected { reason } => Self::rejected(reason),
        }
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Whether the target scheduler accepts work.
    pub ok: bool,
    /// Target scheduler counters.
    pub scheduler: SchedulerStats,
}

/// Validates requests and dispatches deferred pushes onto the selected scheduler.
pub struct MessageService {
    dispatcher: Dispatcher,
    action: DelayedAction,
    sink: Arc<dyn OutcomeSink>,
    target: Arc<dyn Scheduler>,
    worker: Option<Arc<WorkerScheduler>>,
    topics: Vec<String>,
    max_delay_secs: u64,
}

impl MessageService {
    /// Assemble a service. `worker`, when given, is stopped by [`Self::shutdown`].
    pub fn new(
        action: DelayedAction,
        sink: Arc<dyn OutcomeSink>,
        target: Arc<dyn Scheduler>,
        worker: Option<Arc<WorkerScheduler>>,
        topics: Vec<String>,
        max_delay_secs: u64,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(),
            action,
            sink,
            target,
            worker,
            topics,
            max_delay_secs,
        }
    }

    /// Schedule a push and return before it runs.
    ///
    /// The status only says whether the push was queued; delivery results go
    /// to the outcome sink.
    pub fn send_message(&self, request: SendMessageRequest, context: &ContextArgs) -> SendStatus {
        if request.message.trim().is_empty() {
            return SendStatus::rejected("message must not be empty");
        }
        let message = request.message;

        let topics = request.topics.as_ref().map(Topics::normalize).unwrap_or_default();
        let delay_secs = request
            .delay
            .unwrap_or(0)
            .clamp(0, i64::try_from(self.max_delay_secs).unwrap_or(i64::MAX));
        let delay = Duration::from_secs(delay_secs.unsigned_abs());
        let client_id = context.client_id();
        let destination = context.mac_address.clone();

        let action = self.action.clone();
        let sink = Arc::clone(&self.sink);
        let record_client = client_id.clone();
        let record_topics = topics.clone();
        let unit = async move {
            let outcome = action.run(&message, delay, destination.as_deref()).await;
            sink.record(OutcomeRecord::new(record_client, record_topics, outcome));
        };

        let result = DispatchResult::from(self.dispatcher.schedule(unit, self.target.as_ref()));
        match &result {
            DispatchResult::Accepted(ticket) => info!(
                task_id = ticket.task_id,
                client_id = %client_id,
                topics = ?topics,
                delay_secs,
                "Scheduled message and returned immediately"
            ),
            DispatchResult::Rejected { reason } => warn!(
                client_id = %client_id,
                reason = %reason,
                "Message rejected"
            ),
        }
        SendStatus::from(result)
    }

    /// Topics callers may publish to.
    #[must_use]
    pub fn list_topics(&self) -> String {
        format!("Topics: {}", self.topics.join(", "))
    }

    /// Target scheduler health.
    #[must_use]
    pub fn health(&self) -> Health {
        Health {
            ok: self.target.is_running(),
            scheduler: self.target.stats(),
        }
    }

    /// Stop the owned worker scheduler, if any, joining its thread within `timeout`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::ShutdownTimeout` if the worker thread outlives `timeout`.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), SchedulerError> {
        match &self.worker {
            Some(worker) => worker.stop(timeout),
            None => Ok(()),
        }
    }
}
