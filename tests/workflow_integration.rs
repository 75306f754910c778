//! Workflow Integration Tests
//!
//! Runs the real workflow engine end-to-end with deterministic fake
//! capabilities: memory-leak and latency scenarios, context threading between
//! steps, and the diagnosis rules over real step output.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use opswatch::config::{IdentifierFallbacks, Thresholds};
use opswatch::integrations::{
    ClusterApi, DeploymentChange, EvictionEvent, MetricSnapshot, MetricsQuery, PodEvent, PodInfo,
    ResourceLimits, TraceSegment, TraceStore, TraceSummary,
};
use opswatch::types::{Event, Trend};
use opswatch::workflow::{InvestigationEngine, StepToolkit, WorkflowEngine, WorkflowKind};

/// Cluster fake with a configurable OOM-event fixture.
struct FakeCluster {
    oom_events: usize,
    restart_count: u64,
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn pod_events(&self, _pod: &str, _namespace: &str) -> Vec<PodEvent> {
        (0..self.oom_events)
            .map(|i| PodEvent {
                kind: "Warning".to_string(),
                reason: "OOMKilling".to_string(),
                message: format!("Memory cgroup out of memory #{i}"),
                count: 1,
                first_timestamp: None,
                last_timestamp: None,
            })
            .collect()
    }

    async fn pod_logs(&self, _pod: &str, _namespace: &str, _lines: u32) -> Vec<String> {
        vec![
            "INFO starting".to_string(),
            "ERROR allocation failed".to_string(),
            "WARN retrying".to_string(),
        ]
    }

    async fn restart_count(&self, _pod: &str, _namespace: &str) -> u64 {
        self.restart_count
    }

    async fn resource_limits(&self, _pod: &str, _namespace: &str) -> ResourceLimits {
        ResourceLimits {
            cpu_request: 250.0,
            cpu_limit: 500.0,
            memory_request: 64.0,
            memory_limit: 96.0,
        }
    }

    async fn recent_changes(&self, _namespace: &str, _window_hours: i64) -> Vec<DeploymentChange> {
        Vec::new()
    }

    async fn node_summary(&self, node: &str) -> Value {
        json!({"name": node, "status": "True"})
    }

    async fn pods_on_node(&self, _node: &str) -> Vec<PodInfo> {
        vec![
            PodInfo {
                name: "small".to_string(),
                namespace: "default".to_string(),
                phase: "Running".to_string(),
                cpu: 100.0,
                memory: 128.0,
            },
            PodInfo {
                name: "hungry".to_string(),
                namespace: "default".to_string(),
                phase: "Running".to_string(),
                cpu: 400.0,
                memory: 1024.0,
            },
        ]
    }

    async fn eviction_events(&self, _node: &str) -> Vec<EvictionEvent> {
        Vec::new()
    }
}

/// Metrics fake returning a fixed trend.
struct FakeMetrics {
    trend: Trend,
}

#[async_trait]
impl MetricsQuery for FakeMetrics {
    async fn query(&self, _natural_language_query: &str) -> MetricSnapshot {
        MetricSnapshot {
            success: true,
            current: 85.0,
            max: 90.0,
            min: 40.0,
            average: 65.0,
            trend: self.trend,
            anomalies: Vec::new(),
            promql: "container_memory_usage_bytes".to_string(),
            insights: Vec::new(),
            values: Value::Array(Vec::new()),
        }
    }
}

struct FakeTraces {
    bottleneck: Option<String>,
}

#[async_trait]
impl TraceStore for FakeTraces {
    async fn slow_traces(
        &self,
        _service: &str,
        _threshold_secs: f64,
        _period_minutes: i64,
        _limit: usize,
    ) -> Vec<TraceSummary> {
        self.bottleneck
            .clone()
            .map(|bottleneck| TraceSummary {
                trace_id: "1-abc".to_string(),
                duration: 2.4,
                response_time: 2.2,
                http_status: Some(200),
                http_url: None,
                has_error: false,
                has_fault: false,
                bottleneck: Some(bottleneck.clone()),
                segments: vec![TraceSegment {
                    id: "seg-1".to_string(),
                    name: bottleneck,
                    start_time: 0.0,
                    end_time: 1.7,
                    duration: 1.7,
                    error: false,
                    fault: true,
                }],
            })
            .into_iter()
            .collect()
    }

    async fn error_traces(&self, _service: &str, _period_minutes: i64) -> Vec<TraceSummary> {
        vec![TraceSummary {
            trace_id: "1-err".to_string(),
            duration: 3.1,
            response_time: 3.0,
            http_status: Some(503),
            http_url: Some("http://svc/checkout".to_string()),
            has_error: false,
            has_fault: true,
            bottleneck: None,
            segments: Vec::new(),
        }]
    }

    async fn service_map(&self, service: &str, _period_minutes: i64) -> Value {
        json!({"service": service, "dependencies": [], "dependents": []})
    }
}

fn engine(oom_events: usize, trend: Trend) -> WorkflowEngine {
    WorkflowEngine::new(Arc::new(StepToolkit {
        cluster: Arc::new(FakeCluster {
            oom_events,
            restart_count: 7,
        }),
        metrics: Arc::new(FakeMetrics { trend }),
        traces: Arc::new(FakeTraces {
            bottleneck: Some("database".to_string()),
        }),
        thresholds: Thresholds::default(),
        fallbacks: IdentifierFallbacks::default(),
    }))
}

fn alarm_event(id: &str, alarm: &str) -> Event {
    Event {
        id: id.to_string(),
        time: "2025-06-01T10:00:00Z".to_string(),
        source: "aws.cloudwatch".to_string(),
        detail_type: "CloudWatch Alarm State Change".to_string(),
        detail: json!({"alarmName": alarm, "state": {"value": "ALARM"}}),
    }
}

#[tokio::test]
async fn test_memory_leak_with_oom_events() {
    // S1: OOM fixture returns events → root cause names OOMKill.
    let event = alarm_event("e1", "pod-oom-critical");
    assert_eq!(
        WorkflowKind::for_alarm(event.alarm_name()),
        WorkflowKind::MemoryLeakInvestigation
    );

    let report = engine(2, Trend::Increasing)
        .execute_workflow(WorkflowKind::MemoryLeakInvestigation, "INC-e1", event)
        .await;

    assert!(report.success);
    assert_eq!(
        report.root_cause.as_deref(),
        Some("Memory leak causing OOMKill events")
    );
    assert_eq!(report.findings.len(), 6);

    let oom_finding = report
        .findings
        .iter()
        .find(|f| f.step == "check_oom_events")
        .unwrap();
    assert_eq!(oom_finding.result["oom_count"], json!(2));
    assert_eq!(oom_finding.result["oom_kill_detected"], json!(true));
}

#[tokio::test]
async fn test_memory_leak_without_oom_but_increasing() {
    let report = engine(0, Trend::Increasing)
        .execute_workflow(
            WorkflowKind::MemoryLeakInvestigation,
            "INC-e1",
            alarm_event("e1", "pod-memory-high"),
        )
        .await;

    assert_eq!(
        report.root_cause.as_deref(),
        Some("Increasing memory usage pattern detected")
    );
}

#[tokio::test]
async fn test_memory_leak_stable_trend_is_pressure_only() {
    let report = engine(0, Trend::Stable)
        .execute_workflow(
            WorkflowKind::MemoryLeakInvestigation,
            "INC-e1",
            alarm_event("e1", "pod-memory-high"),
        )
        .await;

    assert_eq!(report.root_cause.as_deref(), Some("Memory pressure observed"));
    assert_eq!(
        report.recommendations,
        vec![
            "Restart pod to clear memory",
            "Increase memory limit to 512Mi",
            "Review application code for memory leaks",
            "Enable memory profiling",
        ]
    );
}

#[tokio::test]
async fn test_latency_workflow_resource_constrained() {
    // S2: correlate_with_resources reports resource_constrained, which wins
    // over the trace bottleneck.
    let event = alarm_event("e2", "svc-latency-high");
    assert_eq!(
        WorkflowKind::for_alarm(event.alarm_name()),
        WorkflowKind::HighLatencyInvestigation
    );

    let report = engine(0, Trend::Stable)
        .execute_workflow(WorkflowKind::HighLatencyInvestigation, "INC-e2", event)
        .await;

    assert!(report.success);
    assert_eq!(
        report.root_cause.as_deref(),
        Some("Latency caused by resource constraints")
    );

    let traces_finding = report
        .findings
        .iter()
        .find(|f| f.step == "analyze_traces")
        .unwrap();
    assert_eq!(traces_finding.result["bottleneck"], json!("database"));
    assert_eq!(traces_finding.result["slow_traces_count"], json!(1));
    // Error/fault trace retrieval ran alongside the slow-trace fetch
    assert_eq!(traces_finding.result["error_traces_count"], json!(1));
    assert_eq!(traces_finding.result["fault_trace_count"], json!(1));
    assert_eq!(traces_finding.result["faulted_segments"], json!(1));
}

#[tokio::test]
async fn test_pod_crash_workflow_threads_context() {
    let report = engine(0, Trend::Stable)
        .execute_workflow(
            WorkflowKind::PodCrashInvestigation,
            "INC-e3",
            alarm_event("e3", "pod-crashloop"),
        )
        .await;

    assert!(report.success);
    assert_eq!(
        report.root_cause.as_deref(),
        Some("Pod experiencing frequent crashes")
    );

    // analyze_logs filtered the error line fetched via the pod identified
    // two steps earlier.
    let logs_finding = report
        .findings
        .iter()
        .find(|f| f.step == "analyze_logs")
        .unwrap();
    assert_eq!(logs_finding.result["error_count"], json!(1));
    assert_eq!(
        logs_finding.result["errors"][0],
        json!("ERROR allocation failed")
    );

    // restart_count 7 > threshold 5
    let restarts = report
        .findings
        .iter()
        .find(|f| f.step == "check_restart_count")
        .unwrap();
    assert_eq!(restarts.result["frequent_restarts"], json!(true));

    // memory limit 96 MiB < 128 MiB floor
    let limits = report
        .findings
        .iter()
        .find(|f| f.step == "review_resource_limits")
        .unwrap();
    assert_eq!(limits.result["limits_appropriate"], json!(false));
}

#[tokio::test]
async fn test_node_pressure_workflow_aggregates_pods() {
    let report = engine(0, Trend::Stable)
        .execute_workflow(
            WorkflowKind::NodePressureInvestigation,
            "INC-e4",
            alarm_event("e4", "disk-pressure"),
        )
        .await;

    assert!(report.success);
    assert_eq!(report.root_cause.as_deref(), Some("Node under resource pressure"));

    let usage = report
        .findings
        .iter()
        .find(|f| f.step == "check_resource_usage")
        .unwrap();
    assert_eq!(usage.result["total_cpu"], json!(500.0));
    assert_eq!(usage.result["total_memory"], json!(1152.0));
    assert_eq!(usage.result["resource_hog"]["name"], json!("hungry"));
}

#[tokio::test]
async fn test_generic_workflow() {
    let report = engine(0, Trend::Stable)
        .execute_workflow(
            WorkflowKind::GenericInvestigation,
            "INC-e5",
            alarm_event("e5", "something-odd"),
        )
        .await;

    assert!(report.success);
    assert_eq!(report.root_cause.as_deref(), Some("Investigation completed"));
    assert_eq!(report.findings.len(), 4);
    assert_eq!(
        report.recommendations,
        vec!["Review metrics and logs", "Consult runbook documentation"]
    );
}
