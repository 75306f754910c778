//! Diagnosis reasoner
//!
//! Deterministic rules over the recorded findings, keyed on the workflow.
//! The root-cause and recommendation strings are part of the chat contract:
//! downstream runbooks match on them, so the exact text is load-bearing.

use crate::workflow::{IncidentContext, WorkflowKind};

/// Derive the root cause from the investigation findings.
pub fn determine_root_cause(ctx: &IncidentContext) -> String {
    match ctx.workflow {
        WorkflowKind::MemoryLeakInvestigation => {
            if ctx.finding_flag("oom_kill_detected") {
                "Memory leak causing OOMKill events".to_string()
            } else if ctx.finding_flag("memory_leak_likely") {
                "Increasing memory usage pattern detected".to_string()
            } else {
                "Memory pressure observed".to_string()
            }
        }
        WorkflowKind::HighCpuInvestigation => {
            if ctx.finding_flag("throttling_detected") {
                "CPU throttling due to insufficient limits".to_string()
            } else {
                "High CPU utilization".to_string()
            }
        }
        WorkflowKind::HighLatencyInvestigation => {
            if ctx.finding_flag("resource_constrained") {
                "Latency caused by resource constraints".to_string()
            } else if ctx.finding_has("bottleneck") {
                "Bottleneck in downstream service".to_string()
            } else {
                "Elevated response times".to_string()
            }
        }
        WorkflowKind::NodePressureInvestigation => "Node under resource pressure".to_string(),
        WorkflowKind::PodCrashInvestigation => "Pod experiencing frequent crashes".to_string(),
        WorkflowKind::GenericInvestigation => "Investigation completed".to_string(),
    }
}

/// Fixed remediation recommendations per workflow.
pub fn recommendations(workflow: WorkflowKind) -> Vec<String> {
    let texts: &[&str] = match workflow {
        WorkflowKind::MemoryLeakInvestigation => &[
            "Restart pod to clear memory",
            "Increase memory limit to 512Mi",
            "Review application code for memory leaks",
            "Enable memory profiling",
        ],
        WorkflowKind::HighCpuInvestigation => &[
            "Increase CPU limit to 500m",
            "Enable HPA for automatic scaling",
            "Review code for CPU-intensive operations",
        ],
        WorkflowKind::HighLatencyInvestigation => &[
            "Scale service horizontally",
            "Optimize slow queries",
            "Enable connection pooling",
            "Review timeout configurations",
        ],
        WorkflowKind::NodePressureInvestigation => &[
            "Cordon node to prevent new scheduling",
            "Drain pods to other nodes",
            "Add new nodes to cluster",
        ],
        WorkflowKind::PodCrashInvestigation => &[
            "Review application logs for errors",
            "Check resource limits",
            "Roll back to previous version if recent deployment",
        ],
        WorkflowKind::GenericInvestigation => &[
            "Review metrics and logs",
            "Consult runbook documentation",
        ],
    };
    texts.iter().map(|s| (*s).to_string()).collect()
}
