//! Alarm events and priority derivation

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Priority assigned to an incoming alarm event.
///
/// Lower rank = more urgent. The dispatcher drains the queue in strictly
/// non-decreasing rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPriority {
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
}

impl EventPriority {
    /// Queue rank (1 = highest priority).
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Uppercase name used in notifications (`CRITICAL`, `HIGH`, ...).
    pub fn name(self) -> &'static str {
        match self {
            EventPriority::Critical => "CRITICAL",
            EventPriority::High => "HIGH",
            EventPriority::Medium => "MEDIUM",
            EventPriority::Low => "LOW",
        }
    }

    /// Lowercase severity string for chat notifications.
    pub fn severity(self) -> &'static str {
        match self {
            EventPriority::Critical => "critical",
            EventPriority::High => "high",
            EventPriority::Medium => "medium",
            EventPriority::Low => "low",
        }
    }
}

impl std::fmt::Display for EventPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Alarm name keywords that escalate an ALARM-state event to CRITICAL.
const CRITICAL_KEYWORDS: [&str; 4] = ["critical", "oom", "node", "down"];

/// One monitoring alarm as delivered by the event bus.
///
/// The `detail` payload is kept opaque; the orchestrator only relies on
/// `detail.alarmName` and `detail.state.value`, everything else is carried
/// through for the step handlers to inspect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default = "now_rfc3339")]
    pub time: String,
    #[serde(default)]
    pub source: String,
    #[serde(rename = "detail-type", default)]
    pub detail_type: String,
    #[serde(default)]
    pub detail: Value,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

impl Event {
    /// Parse an event from a raw payload, assigning a fresh id when the
    /// producer omitted one.
    pub fn from_payload(payload: Value) -> Result<Self, serde_json::Error> {
        let mut event: Event = serde_json::from_value(payload)?;
        if event.id.is_empty() {
            event.id = uuid::Uuid::new_v4().to_string();
        }
        Ok(event)
    }

    /// Alarm name from the detail payload (empty string when absent).
    pub fn alarm_name(&self) -> &str {
        self.detail
            .get("alarmName")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Alarm state value from the detail payload (empty string when absent).
    pub fn alarm_state(&self) -> &str {
        self.detail
            .get("state")
            .and_then(|s| s.get("value"))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Derive the event priority.
    ///
    /// An alarm in `ALARM` state is HIGH, escalated to CRITICAL when its name
    /// mentions any critical keyword. Everything else is MEDIUM. Pure
    /// function of the event: repeated calls always agree.
    pub fn priority(&self) -> EventPriority {
        if self.alarm_state() == "ALARM" {
            let name = self.alarm_name().to_lowercase();
            if CRITICAL_KEYWORDS.iter().any(|kw| name.contains(kw)) {
                return EventPriority::Critical;
            }
            return EventPriority::High;
        }
        EventPriority::Medium
    }

    /// Incident identifier derived from the event id (`INC-` + first 8 chars).
    pub fn incident_id(&self) -> String {
        let prefix: String = self.id.chars().take(8).collect();
        format!("INC-{prefix}")
    }
}
