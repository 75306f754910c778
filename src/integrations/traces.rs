//! Trace store capability
//!
//! Slow-trace retrieval and service dependency maps. The shipped adapter
//! talks to AWS X-Ray over signed HTTP; the bottleneck of a trace is the
//! segment with the longest duration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::config::defaults::ADAPTER_TIMEOUT_SECS;
use crate::integrations::signer::RequestSigner;

/// One segment of a distributed trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSegment {
    pub id: String,
    pub name: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub error: bool,
    pub fault: bool,
}

/// Summary of one retrieved trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub duration: f64,
    pub response_time: f64,
    pub http_status: Option<u64>,
    pub http_url: Option<String>,
    pub has_error: bool,
    pub has_fault: bool,
    /// Name of the slowest segment, when segments could be fetched.
    pub bottleneck: Option<String>,
    pub segments: Vec<TraceSegment>,
}

/// Cap on error/fault traces fetched per call.
const ERROR_TRACE_LIMIT: usize = 10;

/// Distributed-tracing access for the investigation steps.
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Traces slower than `threshold_secs` within the last `period_minutes`,
    /// capped at `limit`.
    async fn slow_traces(
        &self,
        service: &str,
        threshold_secs: f64,
        period_minutes: i64,
        limit: usize,
    ) -> Vec<TraceSummary>;

    /// Traces that ended in an error or fault within the last
    /// `period_minutes`, capped at 10. Summaries only: no segment fetch.
    async fn error_traces(&self, service: &str, period_minutes: i64) -> Vec<TraceSummary>;

    /// Dependency map for a service.
    async fn service_map(&self, service: &str, period_minutes: i64) -> Value;
}

/// Signed HTTP adapter for AWS X-Ray.
pub struct XRayClient {
    http: reqwest::Client,
    base_url: String,
    signer: Arc<dyn RequestSigner>,
}

impl XRayClient {
    pub fn new(region: &str, signer: Arc<dyn RequestSigner>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(ADAPTER_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: format!("https://xray.{region}.amazonaws.com"),
            signer,
        }
    }

    /// Signed POST with a JSON body; `None` on any failure (logged).
    async fn post_signed(&self, path: &str, body: &Value) -> Option<Value> {
        let url = format!("{}{path}", self.base_url);
        let payload = body.to_string();
        let base_headers = [(
            "content-type".to_string(),
            "application/json".to_string(),
        )];

        let headers = match self
            .signer
            .sign_request("POST", &url, &base_headers, payload.as_bytes())
            .await
        {
            Ok(headers) => headers,
            Err(e) => {
                error!(path, "Failed to sign trace store request: {e}");
                return None;
            }
        };

        let result = self
            .http
            .post(&url)
            .headers(headers)
            .body(payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match result {
            Ok(resp) => resp.json().await.ok(),
            Err(e) => {
                error!(path, "Trace store request failed: {e}");
                None
            }
        }
    }

    async fn trace_segments(&self, trace_id: &str) -> Vec<TraceSegment> {
        let body = self
            .post_signed("/Traces", &json!({"TraceIds": [trace_id]}))
            .await;

        let documents: Vec<Value> = body
            .as_ref()
            .and_then(|b| b.get("Traces")?.as_array()?.first()?.get("Segments")?.as_array().cloned())
            .unwrap_or_default();

        documents
            .iter()
            .filter_map(|segment| {
                let doc = segment.get("Document")?.as_str()?;
                let parsed: Value = serde_json::from_str(doc).ok()?;
                let start = parsed.get("start_time").and_then(Value::as_f64).unwrap_or(0.0);
                let end = parsed.get("end_time").and_then(Value::as_f64).unwrap_or(0.0);
                Some(TraceSegment {
                    id: parsed.get("id").and_then(Value::as_str).unwrap_or("").to_string(),
                    name: parsed.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                    start_time: start,
                    end_time: end,
                    duration: end - start,
                    error: parsed.get("error").and_then(Value::as_bool).unwrap_or(false),
                    fault: parsed.get("fault").and_then(Value::as_bool).unwrap_or(false),
                })
            })
            .collect()
    }

    /// Fetch trace summaries matching a filter expression.
    async fn trace_summaries(&self, filter_expression: &str, period_minutes: i64) -> Vec<Value> {
        let end = Utc::now();
        let start = end - ChronoDuration::minutes(period_minutes);
        let body = self
            .post_signed(
                "/TraceSummaries",
                &json!({
                    "StartTime": start.timestamp(),
                    "EndTime": end.timestamp(),
                    "FilterExpression": filter_expression,
                }),
            )
            .await;

        body.and_then(|b| b.get("TraceSummaries").and_then(Value::as_array).cloned())
            .unwrap_or_default()
    }

    /// Summary-level fields of a trace; segments are fetched separately.
    fn summary_shell(summary: &Value) -> TraceSummary {
        TraceSummary {
            trace_id: summary
                .get("Id")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            duration: summary.get("Duration").and_then(Value::as_f64).unwrap_or(0.0),
            response_time: summary
                .get("ResponseTime")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            http_status: summary
                .get("Http")
                .and_then(|h| h.get("HttpStatus"))
                .and_then(Value::as_u64),
            http_url: summary
                .get("Http")
                .and_then(|h| h.get("HttpURL"))
                .and_then(Value::as_str)
                .map(String::from),
            has_error: summary
                .get("HasError")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            has_fault: summary
                .get("HasFault")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            bottleneck: None,
            segments: Vec::new(),
        }
    }
}

/// The slowest segment's name, or `None` for an empty trace.
pub fn identify_bottleneck(segments: &[TraceSegment]) -> Option<String> {
    segments
        .iter()
        .max_by(|a, b| a.duration.total_cmp(&b.duration))
        .map(|s| s.name.clone())
}

#[async_trait]
impl TraceStore for XRayClient {
    async fn slow_traces(
        &self,
        _service: &str,
        threshold_secs: f64,
        period_minutes: i64,
        limit: usize,
    ) -> Vec<TraceSummary> {
        let summaries = self
            .trace_summaries(&format!("duration >= {threshold_secs}"), period_minutes)
            .await;

        let mut traces = Vec::new();
        for summary in summaries.iter().take(limit) {
            let mut trace = Self::summary_shell(summary);
            trace.segments = self.trace_segments(&trace.trace_id).await;
            trace.bottleneck = identify_bottleneck(&trace.segments);
            traces.push(trace);
        }
        traces
    }

    async fn error_traces(&self, _service: &str, period_minutes: i64) -> Vec<TraceSummary> {
        let summaries = self
            .trace_summaries("error = true OR fault = true", period_minutes)
            .await;

        summaries
            .iter()
            .take(ERROR_TRACE_LIMIT)
            .map(Self::summary_shell)
            .collect()
    }

    async fn service_map(&self, service: &str, period_minutes: i64) -> Value {
        let end = Utc::now();
        let start = end - ChronoDuration::minutes(period_minutes);
        let body = self
            .post_signed(
                "/ServiceGraph",
                &json!({
                    "StartTime": start.timestamp(),
                    "EndTime": end.timestamp(),
                }),
            )
            .await;

        let services: Vec<Value> = body
            .and_then(|b| b.get("Services").and_then(Value::as_array).cloned())
            .unwrap_or_default();

        let mut dependencies = Vec::new();
        for svc in &services {
            let edges = svc
                .get("Edges")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            for edge in edges {
                if let Some(reference) = edge.get("ReferenceId") {
                    dependencies.push(json!({
                        "name": reference,
                        "summary_statistics": edge.get("SummaryStatistics").cloned().unwrap_or(Value::Null),
                    }));
                }
            }
        }

        json!({
            "service": service,
            "dependencies": dependencies,
            "dependents": [],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(name: &str, duration: f64) -> TraceSegment {
        TraceSegment {
            id: format!("seg-{name}"),
            name: name.to_string(),
            start_time: 0.0,
            end_time: duration,
            duration,
            error: false,
            fault: false,
        }
    }

    #[test]
    fn test_bottleneck_is_slowest_segment() {
        let segments = vec![
            segment("frontend", 0.2),
            segment("database", 1.7),
            segment("cache", 0.1),
        ];
        assert_eq!(identify_bottleneck(&segments).as_deref(), Some("database"));
    }

    #[test]
    fn test_bottleneck_empty_trace() {
        assert!(identify_bottleneck(&[]).is_none());
    }

    #[test]
    fn test_summary_shell_parses_error_flags() {
        let summary = json!({
            "Id": "1-abc-def",
            "Duration": 2.5,
            "ResponseTime": 2.1,
            "HasError": false,
            "HasFault": true,
            "Http": {"HttpStatus": 503, "HttpURL": "http://svc/checkout"},
        });
        let trace = XRayClient::summary_shell(&summary);

        assert_eq!(trace.trace_id, "1-abc-def");
        assert_eq!(trace.duration, 2.5);
        assert!(!trace.has_error);
        assert!(trace.has_fault);
        assert_eq!(trace.http_status, Some(503));
        assert_eq!(trace.http_url.as_deref(), Some("http://svc/checkout"));
        assert!(trace.segments.is_empty());
        assert!(trace.bottleneck.is_none());
    }

    #[test]
    fn test_summary_shell_defaults() {
        let trace = XRayClient::summary_shell(&json!({"Id": "1-x"}));
        assert!(!trace.has_error);
        assert!(!trace.has_fault);
        assert!(trace.http_url.is_none());
    }
}
