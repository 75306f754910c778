//! PromQL execution against a managed Prometheus workspace
//!
//! Range and instant queries over signed HTTP, plus the parsing that reduces
//! both result shapes to one aggregate block: current / min / max / average /
//! trend. Trend compares the mean of the first half of the flattened samples
//! against the mean of the second half.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::defaults::ADAPTER_TIMEOUT_SECS;
use crate::integrations::signer::{RequestSigner, SignerError};
use crate::types::Trend;

/// One series from a range query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesData {
    pub metric: BTreeMap<String, String>,
    pub values: Vec<f64>,
    pub timestamps: Vec<f64>,
}

/// Aggregate view of a range (matrix) result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeSummary {
    pub current_value: f64,
    pub max_value: f64,
    pub min_value: f64,
    pub average_value: f64,
    pub trend: Trend,
    pub values: Vec<SeriesData>,
    pub series_count: usize,
    /// Flagged samples from upstream anomaly annotators; the parser itself
    /// never populates this.
    #[serde(default)]
    pub anomalies: Vec<Value>,
}

impl RangeSummary {
    fn empty() -> Self {
        Self {
            current_value: 0.0,
            max_value: 0.0,
            min_value: 0.0,
            average_value: 0.0,
            trend: Trend::Unknown,
            values: Vec::new(),
            series_count: 0,
            anomalies: Vec::new(),
        }
    }
}

/// One sample from an instant (vector) result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSample {
    pub metric: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: Option<f64>,
}

/// Aggregate view of an instant result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantSummary {
    pub current_value: f64,
    pub values: Vec<VectorSample>,
    pub series_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Query failed: {0}")]
    Status(reqwest::StatusCode),
    #[error("Signing error: {0}")]
    Signing(#[from] SignerError),
    #[error("Invalid query URL: {0}")]
    Url(String),
}

/// Time-series backend for the gateway pipeline.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    async fn query_range(
        &self,
        promql: &str,
        time_range: &str,
        step: &str,
    ) -> Result<RangeSummary, QueryError>;

    async fn query_instant(
        &self,
        promql: &str,
        time: Option<&str>,
    ) -> Result<InstantSummary, QueryError>;

    /// All metric names the backend knows (`/label/__name__/values`).
    async fn discover_metrics(&self) -> Result<Vec<String>, QueryError>;
}

/// Signed HTTP client for an AWS Managed Prometheus workspace.
pub struct PrometheusClient {
    http: reqwest::Client,
    base_url: String,
    signer: Arc<dyn RequestSigner>,
}

impl PrometheusClient {
    pub fn new(region: &str, workspace_id: &str, signer: Arc<dyn RequestSigner>) -> Self {
        if workspace_id.is_empty() {
            warn!("AMP_WORKSPACE_ID not set, client will not work");
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(ADAPTER_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        info!(workspace = workspace_id, "Prometheus client initialized");
        Self {
            http,
            base_url: format!(
                "https://aps-workspaces.{region}.amazonaws.com/workspaces/{workspace_id}/api/v1"
            ),
            signer,
        }
    }

    /// Signed GET; one retry on transient failures.
    async fn get_signed(&self, path: &str, params: &[(&str, String)]) -> Result<Value, QueryError> {
        let mut url = reqwest::Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| QueryError::Url(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        let mut last_transient: Option<QueryError> = None;
        for attempt in 0..2 {
            let headers = self
                .signer
                .sign_request("GET", url.as_str(), &[], b"")
                .await?;

            match self.http.get(url.clone()).headers(headers).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp.json().await.map_err(QueryError::Http);
                }
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_server_error() && attempt == 0 {
                        warn!(%status, path, "Query failed, retrying once");
                        last_transient = Some(QueryError::Status(status));
                        continue;
                    }
                    error!(%status, path, "Query failed");
                    return Err(QueryError::Status(status));
                }
                Err(e) => {
                    if (e.is_timeout() || e.is_connect()) && attempt == 0 {
                        warn!(path, "Query transport error ({e}), retrying once");
                        last_transient = Some(QueryError::Http(e));
                        continue;
                    }
                    error!(path, "Query execution error: {e}");
                    return Err(QueryError::Http(e));
                }
            }
        }
        Err(last_transient.unwrap_or(QueryError::Status(reqwest::StatusCode::BAD_GATEWAY)))
    }
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn query_range(
        &self,
        promql: &str,
        time_range: &str,
        step: &str,
    ) -> Result<RangeSummary, QueryError> {
        let end = Utc::now();
        let start = end - parse_time_range(time_range);

        let body = self
            .get_signed(
                "/query_range",
                &[
                    ("query", promql.to_string()),
                    ("start", start.timestamp().to_string()),
                    ("end", end.timestamp().to_string()),
                    ("step", step.to_string()),
                ],
            )
            .await?;
        Ok(parse_range_response(&body))
    }

    async fn query_instant(
        &self,
        promql: &str,
        time: Option<&str>,
    ) -> Result<InstantSummary, QueryError> {
        let mut params = vec![("query", promql.to_string())];
        if let Some(time) = time {
            params.push(("time", time.to_string()));
        }

        let body = self.get_signed("/query", &params).await?;
        Ok(parse_instant_response(&body))
    }

    async fn discover_metrics(&self) -> Result<Vec<String>, QueryError> {
        let body = self.get_signed("/label/__name__/values", &[]).await?;
        Ok(body
            .get("data")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Parse a `1h` / `30m` / `1d` / `7d` style range into a duration.
/// Unparseable input defaults to one hour.
pub fn parse_time_range(time_range: &str) -> ChronoDuration {
    let mut chars = time_range.chars();
    let Some(unit) = chars.next_back() else {
        return ChronoDuration::hours(1);
    };
    let Ok(value) = chars.as_str().parse::<i64>() else {
        return ChronoDuration::hours(1);
    };

    match unit {
        'h' => ChronoDuration::hours(value),
        'm' => ChronoDuration::minutes(value),
        'd' => ChronoDuration::days(value),
        'w' => ChronoDuration::weeks(value),
        _ => ChronoDuration::hours(1),
    }
}

/// Compare the mean of the first half of the samples to the mean of the
/// second half: `>1.1×` increasing, `<0.9×` decreasing, otherwise stable.
/// Fewer than two samples is unknown.
pub fn calculate_trend(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::Unknown;
    }

    let mid = values.len() / 2;
    let first_half: f64 = values[..mid].iter().sum::<f64>() / mid as f64;
    let second_half: f64 = values[mid..].iter().sum::<f64>() / (values.len() - mid) as f64;

    if second_half > first_half * 1.1 {
        Trend::Increasing
    } else if second_half < first_half * 0.9 {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

fn labels_of(item: &Value) -> BTreeMap<String, String> {
    item.get("metric")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn sample_value(pair: &Value) -> Option<(f64, f64)> {
    let ts = pair.get(0).and_then(Value::as_f64)?;
    let value = pair.get(1).and_then(Value::as_str)?.parse().ok()?;
    Some((ts, value))
}

/// Reduce a range (matrix) response: flatten every series' samples into one
/// list, take current/min/max/average over it, and derive the trend.
pub fn parse_range_response(body: &Value) -> RangeSummary {
    let results = body
        .get("data")
        .and_then(|d| d.get("result"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if results.is_empty() {
        return RangeSummary::empty();
    }

    let mut all_values: Vec<f64> = Vec::new();
    let mut series: Vec<SeriesData> = Vec::new();

    for item in &results {
        let pairs = item
            .get("values")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut values = Vec::with_capacity(pairs.len());
        let mut timestamps = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            if let Some((ts, value)) = sample_value(pair) {
                timestamps.push(ts);
                values.push(value);
            }
        }
        all_values.extend(&values);
        series.push(SeriesData {
            metric: labels_of(item),
            values,
            timestamps,
        });
    }

    if all_values.is_empty() {
        return RangeSummary {
            series_count: series.len(),
            values: series,
            ..RangeSummary::empty()
        };
    }

    let current = *all_values.last().unwrap_or(&0.0);
    let max = all_values.iter().copied().fold(f64::MIN, f64::max);
    let min = all_values.iter().copied().fold(f64::MAX, f64::min);
    let average = all_values.iter().sum::<f64>() / all_values.len() as f64;
    let trend = calculate_trend(&all_values);

    RangeSummary {
        current_value: current,
        max_value: max,
        min_value: min,
        average_value: average,
        trend,
        series_count: series.len(),
        values: series,
        anomalies: Vec::new(),
    }
}

/// Reduce an instant (vector) response: the first series' value is current.
pub fn parse_instant_response(body: &Value) -> InstantSummary {
    let data = body.get("data").cloned().unwrap_or(Value::Null);
    let result_type = data
        .get("resultType")
        .and_then(Value::as_str)
        .unwrap_or("");
    let results = data
        .get("result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if result_type != "vector" || results.is_empty() {
        return InstantSummary {
            current_value: 0.0,
            values: Vec::new(),
            series_count: 0,
        };
    }

    let samples: Vec<VectorSample> = results
        .iter()
        .map(|item| {
            let pair = item.get("value").cloned().unwrap_or(Value::Null);
            let (timestamp, value) = sample_value(&pair)
                .map_or((None, 0.0), |(ts, value)| (Some(ts), value));
            VectorSample {
                metric: labels_of(item),
                value,
                timestamp,
            }
        })
        .collect();

    InstantSummary {
        current_value: samples.first().map_or(0.0, |s| s.value),
        series_count: samples.len(),
        values: samples,
    }
}
