//! Dispatcher Concurrency Tests
//!
//! Exercises the priority queue + bounded dispatcher pair with an
//! instrumented fake engine: the in-flight cap is never exceeded, events are
//! handled in non-decreasing priority rank, every submitted event completes,
//! and shutdown drains in-flight handlers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use opswatch::events::{EventDispatcher, PriorityEventQueue};
use opswatch::integrations::ChatNotifier;
use opswatch::types::{Event, EventPriority, IncidentReport};
use opswatch::workflow::{InvestigationEngine, WorkflowKind};

/// Engine that records concurrency and handling order.
struct InstrumentedEngine {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    handled: Mutex<Vec<String>>,
    delay: Duration,
}

impl InstrumentedEngine {
    fn new(delay: Duration) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            handled: Mutex::new(Vec::new()),
            delay,
        }
    }
}

#[async_trait]
impl InvestigationEngine for InstrumentedEngine {
    async fn execute_workflow(
        &self,
        workflow: WorkflowKind,
        incident_id: &str,
        event: Event,
    ) -> IncidentReport {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.handled.lock().unwrap().push(event.id.clone());

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        IncidentReport {
            success: true,
            incident_id: incident_id.to_string(),
            workflow: workflow.as_str().to_string(),
            root_cause: Some("test".to_string()),
            recommendations: vec!["noop".to_string()],
            duration_secs: self.delay.as_secs_f64(),
            findings: Vec::new(),
            error: None,
        }
    }
}

/// Engine that panics for every event.
struct PanickingEngine;

#[async_trait]
impl InvestigationEngine for PanickingEngine {
    async fn execute_workflow(
        &self,
        _workflow: WorkflowKind,
        _incident_id: &str,
        _event: Event,
    ) -> IncidentReport {
        panic!("boom");
    }
}

/// Chat sink recording every notification.
#[derive(Default)]
struct RecordingChat {
    notifications: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChatNotifier for RecordingChat {
    async fn send_notification(
        &self,
        _channel: &str,
        message: &str,
        severity: &str,
        _incident_id: Option<&str>,
        _thread_ts: Option<&str>,
    ) -> Option<String> {
        self.notifications
            .lock()
            .unwrap()
            .push((severity.to_string(), message.to_string()));
        None
    }

    async fn send_investigation_summary(
        &self,
        _channel: &str,
        _incident_id: &str,
        _result: &IncidentReport,
        _thread_ts: Option<&str>,
    ) -> Option<String> {
        None
    }

    async fn send_remediation_approval(
        &self,
        _channel: &str,
        _incident_id: &str,
        _action: &str,
        _details: &Value,
        _thread_ts: Option<&str>,
    ) -> Option<String> {
        None
    }

    async fn update_message(
        &self,
        _channel: &str,
        _timestamp: &str,
        _message: &str,
        _blocks: Option<Value>,
    ) -> bool {
        false
    }

    async fn add_reaction(&self, _channel: &str, _timestamp: &str, _reaction: &str) -> bool {
        false
    }
}

fn payload(id: &str, alarm: &str, state: &str) -> Value {
    json!({
        "id": id,
        "time": "2025-06-01T10:00:00Z",
        "source": "aws.cloudwatch",
        "detail-type": "CloudWatch Alarm State Change",
        "detail": {"alarmName": alarm, "state": {"value": state}},
    })
}

async fn wait_for_completed(dispatcher: &EventDispatcher, expected: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while dispatcher.stats().completed < expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {expected} completions, got {}",
            dispatcher.stats().completed
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_ten_mixed_events_cap_three() {
    let queue = Arc::new(PriorityEventQueue::new());
    let engine = Arc::new(InstrumentedEngine::new(Duration::from_millis(50)));
    let chat = Arc::new(RecordingChat::default());
    let cancel = CancellationToken::new();

    let dispatcher = Arc::new(EventDispatcher::new(
        Arc::clone(&queue),
        Arc::clone(&engine) as Arc<dyn InvestigationEngine>,
        Arc::clone(&chat) as Arc<dyn ChatNotifier>,
        "#test".to_string(),
        3,
        cancel.clone(),
    ));

    // Enqueue everything before the loop starts so rank ordering is observable.
    let alarms = [
        ("e1", "cpu-high", "ALARM"),          // HIGH
        ("e2", "pod-oom-critical", "ALARM"),  // CRITICAL
        ("e3", "steady-state", "OK"),         // MEDIUM
        ("e4", "svc-latency-high", "ALARM"),  // HIGH
        ("e5", "node-down", "ALARM"),         // CRITICAL
        ("e6", "queue-depth", "OK"),          // MEDIUM
        ("e7", "cpu-throttling", "ALARM"),    // HIGH
        ("e8", "pod-crashloop", "ALARM"),     // HIGH
        ("e9", "disk-oom", "ALARM"),          // CRITICAL
        ("e10", "misc", "OK"),                // MEDIUM
    ];
    for (id, alarm, state) in alarms {
        dispatcher.submit(payload(id, alarm, state)).unwrap();
    }

    let run = tokio::spawn(Arc::clone(&dispatcher).run());
    wait_for_completed(&dispatcher, 10).await;

    // Invariant: concurrent handlers never exceed the cap.
    assert!(engine.max_in_flight.load(Ordering::SeqCst) <= 3);

    // All events were handled, in non-decreasing priority rank.
    let handled = engine.handled.lock().unwrap().clone();
    assert_eq!(handled.len(), 10);
    let rank = |id: &str| match id {
        "e2" | "e5" | "e9" => 1,
        "e1" | "e4" | "e7" | "e8" => 2,
        _ => 3,
    };
    let ranks: Vec<u8> = handled.iter().map(|id| rank(id)).collect();
    let mut sorted = ranks.clone();
    sorted.sort_unstable();
    assert_eq!(ranks, sorted, "handled out of priority order: {handled:?}");

    cancel.cancel();
    run.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_handlers() {
    let queue = Arc::new(PriorityEventQueue::new());
    let engine = Arc::new(InstrumentedEngine::new(Duration::from_millis(200)));
    let chat = Arc::new(RecordingChat::default());
    let cancel = CancellationToken::new();

    let dispatcher = Arc::new(EventDispatcher::new(
        queue,
        Arc::clone(&engine) as Arc<dyn InvestigationEngine>,
        chat as Arc<dyn ChatNotifier>,
        "#test".to_string(),
        2,
        cancel.clone(),
    ));

    dispatcher.submit(payload("e1", "cpu-high", "ALARM")).unwrap();
    dispatcher.submit(payload("e2", "cpu-high", "ALARM")).unwrap();

    let run = tokio::spawn(Arc::clone(&dispatcher).run());

    // Let both handlers start, then request shutdown mid-flight.
    tokio::time::sleep(Duration::from_millis(80)).await;
    cancel.cancel();
    run.await.unwrap();

    // Neither event was dropped: both ran to completion.
    assert_eq!(dispatcher.stats().completed, 2);
    assert_eq!(engine.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_panicking_handler_does_not_kill_dispatcher() {
    let queue = Arc::new(PriorityEventQueue::new());
    let chat = Arc::new(RecordingChat::default());
    let cancel = CancellationToken::new();

    let dispatcher = Arc::new(EventDispatcher::new(
        queue,
        Arc::new(PanickingEngine) as Arc<dyn InvestigationEngine>,
        Arc::clone(&chat) as Arc<dyn ChatNotifier>,
        "#test".to_string(),
        3,
        cancel.clone(),
    ));

    dispatcher.submit(payload("e1", "cpu-high", "ALARM")).unwrap();
    dispatcher.submit(payload("e2", "memory-leak", "ALARM")).unwrap();

    let run = tokio::spawn(Arc::clone(&dispatcher).run());
    wait_for_completed(&dispatcher, 2).await;

    cancel.cancel();
    run.await.unwrap();

    // Both incidents produced a failure notification despite the panics.
    let notifications = chat.notifications.lock().unwrap();
    let failures: Vec<_> = notifications
        .iter()
        .filter(|(_, msg)| msg.contains("investigation failed"))
        .collect();
    assert_eq!(failures.len(), 2);
}

#[tokio::test]
async fn test_submit_reports_priority() {
    let queue = Arc::new(PriorityEventQueue::new());
    let chat = Arc::new(RecordingChat::default());
    let dispatcher = EventDispatcher::new(
        queue,
        Arc::new(InstrumentedEngine::new(Duration::ZERO)) as Arc<dyn InvestigationEngine>,
        chat as Arc<dyn ChatNotifier>,
        "#test".to_string(),
        3,
        CancellationToken::new(),
    );

    let priority = dispatcher
        .submit(payload("e1", "pod-oom-critical", "ALARM"))
        .unwrap();
    assert_eq!(priority, EventPriority::Critical);

    let err = dispatcher.submit(json!("not an object"));
    assert!(err.is_err());
}
