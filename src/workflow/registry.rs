//! Workflow registry
//!
//! Static table mapping the six investigation workflows to their ordered step
//! lists, plus alarm-name based workflow selection. Loaded once; the step
//! vocabulary is fixed (see the step handler table).

use serde::{Deserialize, Serialize};

/// The six investigation workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    MemoryLeakInvestigation,
    HighCpuInvestigation,
    HighLatencyInvestigation,
    NodePressureInvestigation,
    PodCrashInvestigation,
    GenericInvestigation,
}

impl WorkflowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowKind::MemoryLeakInvestigation => "memory_leak_investigation",
            WorkflowKind::HighCpuInvestigation => "high_cpu_investigation",
            WorkflowKind::HighLatencyInvestigation => "high_latency_investigation",
            WorkflowKind::NodePressureInvestigation => "node_pressure_investigation",
            WorkflowKind::PodCrashInvestigation => "pod_crash_investigation",
            WorkflowKind::GenericInvestigation => "generic_investigation",
        }
    }

    /// Human-readable workflow title.
    pub fn title(self) -> &'static str {
        match self {
            WorkflowKind::MemoryLeakInvestigation => "Memory Leak Investigation",
            WorkflowKind::HighCpuInvestigation => "High CPU Investigation",
            WorkflowKind::HighLatencyInvestigation => "High Latency Investigation",
            WorkflowKind::NodePressureInvestigation => "Node Pressure Investigation",
            WorkflowKind::PodCrashInvestigation => "Pod Crash Investigation",
            WorkflowKind::GenericInvestigation => "Generic Investigation",
        }
    }

    /// Ordered step list; the finalizer step is always last.
    pub fn steps(self) -> &'static [&'static str] {
        match self {
            WorkflowKind::MemoryLeakInvestigation => &[
                "identify_pod",
                "collect_memory_metrics",
                "check_oom_events",
                "analyze_memory_trend",
                "review_recent_changes",
                "recommend_remediation",
            ],
            WorkflowKind::HighCpuInvestigation => &[
                "identify_pod",
                "collect_cpu_metrics",
                "check_cpu_throttling",
                "analyze_request_patterns",
                "review_resource_limits",
                "recommend_remediation",
            ],
            WorkflowKind::HighLatencyInvestigation => &[
                "identify_service",
                "collect_latency_metrics",
                "analyze_traces",
                "check_dependencies",
                "correlate_with_resources",
                "recommend_remediation",
            ],
            WorkflowKind::NodePressureInvestigation => &[
                "identify_node",
                "collect_node_metrics",
                "list_pods_on_node",
                "check_resource_usage",
                "analyze_evictions",
                "recommend_remediation",
            ],
            WorkflowKind::PodCrashInvestigation => &[
                "identify_pod",
                "collect_pod_events",
                "analyze_logs",
                "check_restart_count",
                "review_resource_limits",
                "recommend_remediation",
            ],
            WorkflowKind::GenericInvestigation => &[
                "identify_resource",
                "collect_metrics",
                "analyze_patterns",
                "recommend_actions",
            ],
        }
    }

    /// Select a workflow from the alarm name (lowercased substring match,
    /// first hit wins).
    pub fn for_alarm(alarm_name: &str) -> Self {
        let name = alarm_name.to_lowercase();
        if name.contains("memory") || name.contains("oom") {
            WorkflowKind::MemoryLeakInvestigation
        } else if name.contains("cpu") || name.contains("throttl") {
            WorkflowKind::HighCpuInvestigation
        } else if name.contains("latency") || name.contains("response") {
            WorkflowKind::HighLatencyInvestigation
        } else if name.contains("node") || name.contains("pressure") {
            WorkflowKind::NodePressureInvestigation
        } else if name.contains("restart") || name.contains("crash") {
            WorkflowKind::PodCrashInvestigation
        } else {
            WorkflowKind::GenericInvestigation
        }
    }

    pub fn all() -> [WorkflowKind; 6] {
        [
            WorkflowKind::MemoryLeakInvestigation,
            WorkflowKind::HighCpuInvestigation,
            WorkflowKind::HighLatencyInvestigation,
            WorkflowKind::NodePressureInvestigation,
            WorkflowKind::PodCrashInvestigation,
            WorkflowKind::GenericInvestigation,
        ]
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_name_selection() {
        assert_eq!(
            WorkflowKind::for_alarm("pod-oom-critical"),
            WorkflowKind::MemoryLeakInvestigation
        );
        assert_eq!(
            WorkflowKind::for_alarm("CPU-Throttling"),
            WorkflowKind::HighCpuInvestigation
        );
        assert_eq!(
            WorkflowKind::for_alarm("svc-latency-high"),
            WorkflowKind::HighLatencyInvestigation
        );
        assert_eq!(
            WorkflowKind::for_alarm("node-memory-pressure"),
            // "memory" is checked before "node": first hit wins
            WorkflowKind::MemoryLeakInvestigation
        );
        assert_eq!(
            WorkflowKind::for_alarm("disk-pressure"),
            WorkflowKind::NodePressureInvestigation
        );
        assert_eq!(
            WorkflowKind::for_alarm("pod-crashloop"),
            WorkflowKind::PodCrashInvestigation
        );
        assert_eq!(
            WorkflowKind::for_alarm("something-else"),
            WorkflowKind::GenericInvestigation
        );
    }

    #[test]
    fn test_selection_is_idempotent() {
        for _ in 0..5 {
            assert_eq!(
                WorkflowKind::for_alarm("svc-latency-high"),
                WorkflowKind::HighLatencyInvestigation
            );
        }
    }

    #[test]
    fn test_every_workflow_ends_with_finalizer() {
        for kind in WorkflowKind::all() {
            let last = kind.steps().last().copied().unwrap();
            assert!(
                last == "recommend_remediation" || last == "recommend_actions",
                "{kind} ends with {last}"
            );
        }
    }

    #[test]
    fn test_step_counts() {
        assert_eq!(WorkflowKind::MemoryLeakInvestigation.steps().len(), 6);
        assert_eq!(WorkflowKind::GenericInvestigation.steps().len(), 4);
    }
}
