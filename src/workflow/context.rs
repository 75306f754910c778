//! Per-incident investigation context
//!
//! A typed core (identity, findings, per-category metrics, logs) plus an open
//! scratch map. Step handlers write scratch values under string keys; later
//! steps read them back verbatim, so anything a step stores must survive a
//! JSON round trip.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::types::{Event, Finding};
use crate::workflow::WorkflowKind;

pub struct IncidentContext {
    pub incident_id: String,
    pub workflow: WorkflowKind,
    pub event: Event,
    pub started_at: DateTime<Utc>,
    /// Step findings in execution order.
    pub findings: Vec<Finding>,
    /// Per-category metric summaries (`memory`, `cpu`, `latency`, `node`, ...).
    metrics: Map<String, Value>,
    pub logs: Vec<String>,
    pub recommendations: Vec<String>,
    scratch: Map<String, Value>,
}

impl IncidentContext {
    pub fn new(incident_id: impl Into<String>, workflow: WorkflowKind, event: Event) -> Self {
        Self {
            incident_id: incident_id.into(),
            workflow,
            event,
            started_at: Utc::now(),
            findings: Vec::new(),
            metrics: Map::new(),
            logs: Vec::new(),
            recommendations: Vec::new(),
            scratch: Map::new(),
        }
    }

    /// Store a scratch value for later steps.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.scratch.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.scratch.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Store a per-category metrics summary.
    pub fn set_metric(&mut self, category: &str, summary: Value) {
        self.metrics.insert(category.to_string(), summary);
    }

    pub fn metric(&self, category: &str) -> Option<&Value> {
        self.metrics.get(category)
    }

    /// Append a finding, preserving step execution order.
    pub fn record_finding(&mut self, step: &str, result: Value) {
        self.findings.push(Finding {
            step: step.to_string(),
            result,
            timestamp: Utc::now(),
        });
    }

    /// True when any finding recorded so far carries `key: true`.
    pub fn finding_flag(&self, key: &str) -> bool {
        self.findings.iter().any(|f| f.flag(key))
    }

    /// True when any finding carries `key` with a non-null value.
    pub fn finding_has(&self, key: &str) -> bool {
        self.findings.iter().any(|f| f.has(key))
    }
}
