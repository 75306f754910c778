//! Findings, step results, and the final incident report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of one investigation step, as recorded by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub step: String,
    pub result: Value,
    pub timestamp: DateTime<Utc>,
}

impl Finding {
    /// True when the recorded result carries `key: true`.
    pub fn flag(&self, key: &str) -> bool {
        self.result.get(key).and_then(Value::as_bool) == Some(true)
    }

    /// True when the recorded result carries `key` with a non-null value.
    pub fn has(&self, key: &str) -> bool {
        matches!(self.result.get(key), Some(v) if !v.is_null())
    }
}

/// Outcome of a single step handler.
///
/// `success = false` marks an expected failure (recorded and carried on);
/// `proceed = false` skips the remaining steps while still running the
/// diagnosis reasoner. Unexpected failures are surfaced as `Err` from the
/// handler instead and abort the incident.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub success: bool,
    pub proceed: bool,
    details: Map<String, Value>,
}

impl StepReport {
    pub fn ok() -> Self {
        Self {
            success: true,
            proceed: true,
            details: Map::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let mut details = Map::new();
        details.insert("error".to_string(), Value::String(error.into()));
        Self {
            success: false,
            proceed: true,
            details,
        }
    }

    /// Attach a detail field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Stop the workflow after this step.
    pub fn halt(mut self) -> Self {
        self.proceed = false;
        self
    }

    /// Flatten into the JSON object stored in the finding.
    pub fn into_value(self) -> Value {
        let mut map = self.details;
        map.insert("success".to_string(), Value::Bool(self.success));
        Value::Object(map)
    }
}

/// Final outcome of one investigated incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    pub success: bool,
    pub incident_id: String,
    pub workflow: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub duration_secs: f64,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
