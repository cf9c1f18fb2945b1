//! End-to-end tests for the message service
//!
//! These tests drive `send_message` through both scheduling targets with an
//! in-process transport standing in for the push endpoint:
//! - Immediate acknowledgment independent of delay
//! - Delivery body and delay honored on the worker and caller runtimes
//! - Failed deliveries only reach the outcome sink

use async_trait::async_trait;
use prometheus_deferred_push::builders::build_service_with;
use prometheus_deferred_push::config::{
    ExecutionMode, PushConfig, ServiceConfig, ShutdownPolicy, WorkerConfig,
};
use prometheus_deferred_push::core::{
    ActionError, InMemoryOutcomeSink, OutcomeSink, PushRequest, PushTransport,
};
use prometheus_deferred_push::runtime::{
    ContextArgs, MessageService, SendMessageRequest, Topics, ACCEPTED_MESSAGE,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

// ============================================================================
// TEST TRANSPORT
// ============================================================================

/// Forwards every request (with its arrival time) to the test and answers
/// with a fixed status.
struct ChannelTransport {
    tx: mpsc::UnboundedSender<(PushRequest, tokio::time::Instant)>,
    status: u16,
}

#[async_trait]
impl PushTransport for ChannelTransport {
    async fn post(&self, request: &PushRequest) -> Result<(), ActionError> {
        let _ = self.tx.send((request.clone(), tokio::time::Instant::now()));
        if self.status == 200 {
            Ok(())
        } else {
            Err(ActionError::Status {
                code: self.status,
                body: String::new(),
            })
        }
    }
}

type Deliveries = mpsc::UnboundedReceiver<(PushRequest, tokio::time::Instant)>;

fn service(
    mode: ExecutionMode,
    status: u16,
) -> (MessageService, Deliveries, Arc<InMemoryOutcomeSink>, ServiceConfig) {
    service_with_worker(mode, status, WorkerConfig::new().with_thread_name("dp-e2e"))
}

fn service_with_worker(
    mode: ExecutionMode,
    status: u16,
    worker: WorkerConfig,
) -> (MessageService, Deliveries, Arc<InMemoryOutcomeSink>, ServiceConfig) {
    let cfg = ServiceConfig::new(
        PushConfig::new("http://push.invalid/api", "token").with_default_device("AA:BB:CC:DD:EE:FF"),
    )
    .with_mode(mode)
    .with_worker(worker);

    let (tx, rx) = mpsc::unbounded_channel();
    let sink = Arc::new(InMemoryOutcomeSink::new(16));
    let service = build_service_with(
        &cfg,
        Arc::new(ChannelTransport { tx, status }),
        Arc::clone(&sink) as Arc<dyn OutcomeSink>,
    )
    .unwrap();
    (service, rx, sink, cfg)
}

fn robot_context() -> ContextArgs {
    ContextArgs::from_value(&json!({ "client_id": "robot-7", "mac_address": "0A:1B:2C:3D:4E:5F" }))
}

// ============================================================================
// WORKER MODE
// ============================================================================

#[test]
fn test_worker_hello_is_delivered() {
    let (service, mut deliveries, sink, cfg) = service(ExecutionMode::Worker, 200);

    let status = service.send_message(
        SendMessageRequest::new("hello").with_topics(Topics::One("A".into())),
        &robot_context(),
    );
    assert!(status.success);
    assert_eq!(status.result, ACCEPTED_MESSAGE);

    let records = sink.wait_for(1, Duration::from_secs(1));
    assert_eq!(records.len(), 1);
    assert!(records[0].outcome.success);
    assert_eq!(records[0].client_id, "robot-7");
    assert_eq!(records[0].topics, vec!["A"]);

    let (request, _) = deliveries.try_recv().unwrap();
    let body = serde_json::to_string(&request).unwrap();
    assert!(body.contains(r#""message":"hello""#));
    assert_eq!(request.mac_address, "0a:1b:2c:3d:4e:5f");

    service.shutdown(cfg.worker.shutdown_timeout()).unwrap();
}

#[test]
fn test_send_returns_fast_regardless_of_delay() {
    let (service, _deliveries, _sink, cfg) = service_with_worker(
        ExecutionMode::Worker,
        200,
        WorkerConfig::new().with_shutdown_policy(ShutdownPolicy::Abandon),
    );

    for delay in [0, 5, 3_600] {
        let started = Instant::now();
        let status = service.send_message(
            SendMessageRequest::new("tick").with_delay(delay),
            &ContextArgs::default(),
        );
        assert!(status.success);
        assert!(started.elapsed() < Duration::from_millis(50));
    }
    assert_eq!(service.health().scheduler.submitted, 3);

    // Delayed pushes are still waiting; the abandon policy aborts them.
    service.shutdown(cfg.worker.shutdown_timeout()).unwrap();
    assert!(service.health().scheduler.abandoned >= 2);
}

#[test]
fn test_non_200_only_reaches_sink() {
    let (service, _deliveries, sink, cfg) = service(ExecutionMode::Worker, 503);

    let status = service.send_message(SendMessageRequest::new("hello"), &ContextArgs::default());
    assert!(status.success);

    let records = sink.wait_for(1, Duration::from_secs(1));
    assert_eq!(records.len(), 1);
    assert!(!records[0].outcome.success);
    assert!(records[0].outcome.detail.contains("503"));
    assert_eq!(records[0].client_id, "unknown_client");

    service.shutdown(cfg.worker.shutdown_timeout()).unwrap();
}

#[test]
fn test_rejected_after_shutdown() {
    let (service, _deliveries, _sink, cfg) = service(ExecutionMode::Worker, 200);
    service.shutdown(cfg.worker.shutdown_timeout()).unwrap();

    let status = service.send_message(SendMessageRequest::new("late"), &ContextArgs::default());
    assert!(!status.success);
    assert!(status.result.contains("scheduler unavailable"));
    assert_eq!(status.task_id, None);
}

#[test]
fn test_empty_message_is_rejected() {
    let (service, _deliveries, _sink, cfg) = service(ExecutionMode::Worker, 200);

    let status = service.send_message(SendMessageRequest::new("   "), &ContextArgs::default());
    assert!(!status.success);
    assert_eq!(service.health().scheduler.submitted, 0);

    service.shutdown(cfg.worker.shutdown_timeout()).unwrap();
}

#[test]
fn test_message_text_is_sent_unchanged() {
    let (service, mut deliveries, sink, cfg) = service(ExecutionMode::Worker, 200);

    let status = service.send_message(
        SendMessageRequest::new("  indented\n"),
        &ContextArgs::default(),
    );
    assert!(status.success);
    assert_eq!(sink.wait_for(1, Duration::from_secs(1)).len(), 1);

    let (request, _) = deliveries.try_recv().unwrap();
    assert_eq!(request.message.payload.message, "  indented\n");

    service.shutdown(cfg.worker.shutdown_timeout()).unwrap();
}

#[test]
fn test_list_topics() {
    let (service, _deliveries, _sink, cfg) = service(ExecutionMode::Worker, 200);
    assert_eq!(service.list_topics(), "Topics: A, B, C, D");
    service.shutdown(cfg.worker.shutdown_timeout()).unwrap();
}

// ============================================================================
// CALLER RUNTIME MODE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_caller_runtime_honors_delay() {
    let (service, mut deliveries, _sink, _cfg) = service(ExecutionMode::CallerRuntime, 200);

    let submitted_at = tokio::time::Instant::now();
    let status = service.send_message(
        SendMessageRequest::new("later").with_delay(5),
        &ContextArgs::default(),
    );
    assert!(status.success);
    assert!(deliveries.try_recv().is_err());

    let (request, delivered_at) = deliveries.recv().await.unwrap();
    assert!(delivered_at.duration_since(submitted_at) >= Duration::from_secs(5));
    assert_eq!(request.message.payload.message, "later");
    assert_eq!(request.mac_address, "aa:bb:cc:dd:ee:ff");
}

#[tokio::test(start_paused = true)]
async fn test_negative_delay_is_clamped() {
    let (service, mut deliveries, _sink, _cfg) = service(ExecutionMode::CallerRuntime, 200);

    let submitted_at = tokio::time::Instant::now();
    let status = service.send_message(
        SendMessageRequest::new("now").with_delay(-10),
        &ContextArgs::default(),
    );
    assert!(status.success);

    let (_, delivered_at) = deliveries.recv().await.unwrap();
    assert!(delivered_at.duration_since(submitted_at) < Duration::from_secs(1));
}

#[test]
fn test_caller_runtime_rejects_after_runtime_shutdown() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let (service, _deliveries, sink, _cfg) =
        rt.block_on(async { service(ExecutionMode::CallerRuntime, 200) });
    drop(rt);

    assert!(!service.health().ok);
    let status = service.send_message(SendMessageRequest::new("hello"), &ContextArgs::default());
    assert!(!status.success);
    assert!(status.result.contains("scheduler unavailable"));
    assert_eq!(status.task_id, None);

    let stats = service.health().scheduler;
    assert_eq!(stats.submitted, 0);
    assert!(sink.records().is_empty());
}
