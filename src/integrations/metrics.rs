//! Metrics query capability
//!
//! Step handlers ask for metrics in natural language; the capability turns
//! that into numbers. The shipped implementation calls the metrics query
//! gateway's `/api/v1/query` endpoint; tests inject deterministic fakes.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::config::defaults::ADAPTER_TIMEOUT_SECS;
use crate::types::Trend;

/// Aggregated metrics block consumed by the step handlers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MetricSnapshot {
    pub success: bool,
    pub current: f64,
    pub max: f64,
    pub min: f64,
    pub average: f64,
    pub trend: Trend,
    pub anomalies: Vec<Value>,
    pub promql: String,
    pub insights: Vec<String>,
    pub values: Value,
}

impl MetricSnapshot {
    /// Zeroed block returned when the gateway is unreachable.
    pub fn fallback() -> Self {
        Self {
            success: false,
            current: 0.0,
            max: 0.0,
            min: 0.0,
            average: 0.0,
            trend: Trend::Unknown,
            anomalies: Vec::new(),
            promql: String::new(),
            insights: vec!["MCP server unavailable, using fallback".to_string()],
            values: Value::Array(Vec::new()),
        }
    }

    /// Summary stored under `context.metrics[<category>]`.
    pub fn summary(&self) -> Value {
        json!({
            "current": self.current,
            "min": self.min,
            "max": self.max,
            "average": self.average,
            "trend": self.trend,
        })
    }
}

/// Natural-language metrics access for the investigation steps.
#[async_trait]
pub trait MetricsQuery: Send + Sync {
    /// Run one natural-language query. Infallible by contract: transport
    /// failures degrade to [`MetricSnapshot::fallback`].
    async fn query(&self, natural_language_query: &str) -> MetricSnapshot;

    async fn pod_metrics(&self, pod: &str, namespace: &str, metric_type: &str) -> MetricSnapshot {
        self.query(&format!(
            "Show me {metric_type} usage for pod {pod} in namespace {namespace} over the last hour"
        ))
        .await
    }

    async fn service_metrics(&self, service: &str, metric_type: &str) -> MetricSnapshot {
        self.query(&format!(
            "Show me {metric_type} for service {service} over the last hour"
        ))
        .await
    }

    async fn node_metrics(&self, node: &str) -> MetricSnapshot {
        self.query(&format!(
            "Show me resource usage for node {node} over the last hour"
        ))
        .await
    }
}

/// HTTP client for the metrics query gateway.
pub struct GatewayMetricsClient {
    http: reqwest::Client,
    base_url: String,
    cluster_name: String,
}

impl GatewayMetricsClient {
    pub fn new(base_url: &str, cluster_name: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(ADAPTER_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cluster_name: cluster_name.to_string(),
        }
    }

    fn parse_response(&self, body: &Value) -> MetricSnapshot {
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let as_f64 = |key: &str| data.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        let trend = data
            .get("trend")
            .and_then(Value::as_str)
            .and_then(|t| serde_json::from_value(Value::String(t.to_string())).ok())
            .unwrap_or(Trend::Unknown);

        MetricSnapshot {
            success: true,
            current: as_f64("current_value"),
            max: as_f64("max_value"),
            min: as_f64("min_value"),
            average: as_f64("average_value"),
            trend,
            anomalies: data
                .get("anomalies")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            promql: body
                .get("promql_query")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            insights: body
                .get("insights")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default(),
            values: data.get("values").cloned().unwrap_or(Value::Array(Vec::new())),
        }
    }

    async fn post_query(&self, query: &str) -> Result<Value, reqwest::Error> {
        let payload = json!({
            "query": query,
            "context": {"cluster": self.cluster_name},
        });
        let resp = self
            .http
            .post(format!("{}/api/v1/query", self.base_url))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        resp.json().await
    }
}

#[async_trait]
impl MetricsQuery for GatewayMetricsClient {
    async fn query(&self, natural_language_query: &str) -> MetricSnapshot {
        // One retry on transient failures, then fall back.
        for attempt in 0..2 {
            match self.post_query(natural_language_query).await {
                Ok(body) => return self.parse_response(&body),
                Err(e) => {
                    let transient = e.is_timeout()
                        || e.is_connect()
                        || e.status().is_some_and(|s| s.is_server_error());
                    if transient && attempt == 0 {
                        warn!("Gateway query failed ({e}), retrying once");
                        continue;
                    }
                    error!("Failed to query metrics gateway: {e}");
                    return MetricSnapshot::fallback();
                }
            }
        }
        MetricSnapshot::fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_parses_gateway_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/query")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "success": true,
                    "promql_query": "container_memory_usage_bytes{pod=\"web-1\"}",
                    "data": {
                        "current_value": 42.0,
                        "max_value": 50.0,
                        "min_value": 10.0,
                        "average_value": 30.0,
                        "trend": "increasing",
                        "values": [],
                        "series_count": 1
                    },
                    "insights": ["Current value: 42.00"]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = GatewayMetricsClient::new(&server.url(), "test-cluster");
        let snapshot = client.query("Show me memory usage for pod web-1").await;

        assert!(snapshot.success);
        assert_eq!(snapshot.current, 42.0);
        assert_eq!(snapshot.trend, Trend::Increasing);
        assert_eq!(
            snapshot.promql,
            "container_memory_usage_bytes{pod=\"web-1\"}"
        );
    }

    #[tokio::test]
    async fn test_query_falls_back_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/query")
            .with_status(500)
            .expect(2) // initial attempt + one retry
            .create_async()
            .await;

        let client = GatewayMetricsClient::new(&server.url(), "test-cluster");
        let snapshot = client.query("Show me memory usage for pod web-1").await;

        assert!(!snapshot.success);
        assert_eq!(snapshot.current, 0.0);
        assert_eq!(snapshot.trend, Trend::Unknown);
        assert_eq!(
            snapshot.insights,
            vec!["MCP server unavailable, using fallback".to_string()]
        );
    }
}
