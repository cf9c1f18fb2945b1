//! The deferred unit's body: optional wait, then exactly one push call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PushConfig;
use crate::core::ActionError;

/// Push body: `{"mac_address", "type": "custom", "message": {"payload": {"message"}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Lowercased device identifier.
    pub mac_address: String,
    /// Message kind; always `custom` for text pushes.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message envelope.
    pub message: PushEnvelope,
}

/// Outer message wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEnvelope {
    /// Payload carried to the device.
    pub payload: PushPayload,
}

/// Text payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    /// Message text.
    pub message: String,
}

impl PushRequest {
    /// Build a `custom` text push for `device`.
    pub fn custom(device: &str, message: impl Into<String>) -> Self {
        Self {
            mac_address: device.to_lowercase(),
            kind: "custom".to_string(),
            message: PushEnvelope {
                payload: PushPayload {
                    message: message.into(),
                },
            },
        }
    }
}

/// Outbound channel for push requests.
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    /// Deliver one request. `Ok` only for an HTTP 200 answer.
    async fn post(&self, request: &PushRequest) -> Result<(), ActionError>;
}

/// `reqwest`-backed transport posting JSON with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpPushTransport {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    timeout: Duration,
}

impl HttpPushTransport {
    /// Build a transport from push configuration.
    ///
    /// # Errors
    ///
    /// `ActionError::Network` if the HTTP client cannot be constructed.
    pub fn new(config: &PushConfig) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ActionError::Network(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_token: config.api_token.clone(),
            timeout: config.request_timeout(),
        })
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn post(&self, request: &PushRequest) -> Result<(), ActionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ActionError::NetworkTimeout(self.timeout)
                } else {
                    ActionError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ActionError::Status {
            code: status.as_u16(),
            body,
        })
    }
}

/// Result of a finished [`DelayedAction`]. Logged, never returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Whether the push was accepted with HTTP 200.
    pub success: bool,
    /// Human-readable detail; contains the status code or error text on failure.
    pub detail: String,
    /// Failure cause, if any.
    pub error: Option<ActionError>,
}

impl ActionOutcome {
    fn delivered(device: &str) -> Self {
        Self {
            success: true,
            detail: format!("message pushed to {device}"),
            error: None,
        }
    }

    fn failed(error: ActionError) -> Self {
        Self {
            success: false,
            detail: format!("failed to push message: {error}"),
            error: Some(error),
        }
    }
}

/// Optional wait followed by one outbound push.
#[derive(Clone)]
pub struct DelayedAction {
    transport: Arc<dyn PushTransport>,
    request_timeout: Duration,
    default_device: String,
}

impl DelayedAction {
    /// Create an action over `transport`.
    pub fn new(
        transport: Arc<dyn PushTransport>,
        request_timeout: Duration,
        default_device: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            request_timeout,
            default_device: default_device.into(),
        }
    }

    /// Build an action from push configuration using the given transport.
    pub fn from_config(config: &PushConfig, transport: Arc<dyn PushTransport>) -> Self {
        Self::new(transport, config.request_timeout(), config.default_device.clone())
    }

    /// Wait `delay`, then push `message` to `destination` (or the default device).
    ///
    /// The wait yields to the executing runtime. All failures end up in the
    /// returned outcome; this never panics or errors.
    pub async fn run(&self, message: &str, delay: Duration, destination: Option<&str>) -> ActionOutcome {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let device = destination
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(&self.default_device);
        let request = PushRequest::custom(device, message);
        debug!(device = %request.mac_address, "Posting push request");

        let result = tokio::time::timeout(self.request_timeout, self.transport.post(&request))
            .await
            .unwrap_or(Err(ActionError::NetworkTimeout(self.request_timeout)));

        match result {
            Ok(()) => ActionOutcome::delivered(&request.mac_address),
            Err(e) => ActionOutcome::failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    struct RecordingTransport {
        requests: Mutex<Vec<PushRequest>>,
        answer: Result<(), ActionError>,
        latency: Duration,
    }

    impl RecordingTransport {
        fn answering(answer: Result<(), ActionError>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                answer,
                latency: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl PushTransport for RecordingTransport {
        async fn post(&self, request: &PushRequest) -> Result<(), ActionError> {
            self.requests.lock().push(request.clone());
            tokio::time::sleep(self.latency).await;
            self.answer.clone()
        }
    }

    #[test]
    fn test_push_request_wire_shape() {
        let request = PushRequest::custom("AA:BB:CC:00:11:22", "hello");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "mac_address": "aa:bb:cc:00:11:22",
                "type": "custom",
                "message": { "payload": { "message": "hello" } }
            })
        );
    }

    #[tokio::test]
    async fn test_run_defaults_destination() {
        let transport = RecordingTransport::answering(Ok(()));
        let action = DelayedAction::new(transport.clone(), Duration::from_secs(30), "Default-Device");

        let outcome = action.run("hi", Duration::ZERO, None).await;
        assert!(outcome.success);
        assert_eq!(transport.requests.lock()[0].mac_address, "default-device");

        action.run("hi", Duration::ZERO, Some("  ")).await;
        assert_eq!(transport.requests.lock()[1].mac_address, "default-device");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_waits_for_delay() {
        let transport = RecordingTransport::answering(Ok(()));
        let action = DelayedAction::new(transport.clone(), Duration::from_secs(30), "dev");

        let started = Instant::now();
        action.run("later", Duration::from_secs(5), Some("dev")).await;
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(transport.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_run_captures_status_failure() {
        let transport = RecordingTransport::answering(Err(ActionError::Status {
            code: 500,
            body: "boom".into(),
        }));
        let action = DelayedAction::new(transport, Duration::from_secs(30), "dev");

        let outcome = action.run("hi", Duration::ZERO, None).await;
        assert!(!outcome.success);
        assert!(outcome.detail.contains("500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out_slow_transport() {
        let transport = Arc::new(RecordingTransport {
            requests: Mutex::new(Vec::new()),
            answer: Ok(()),
            latency: Duration::from_secs(60),
        });
        let action = DelayedAction::new(transport, Duration::from_secs(30), "dev");

        let outcome = action.run("hi", Duration::ZERO, None).await;
        assert!(!outcome.success);
        assert_eq!(
            outcome.error,
            Some(ActionError::NetworkTimeout(Duration::from_secs(30)))
        );
    }
}
