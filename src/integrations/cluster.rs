//! Cluster API capability
//!
//! Read-only access to the Kubernetes control plane: pod events and logs,
//! restart counts, resource requests/limits, recent deployments, node state.
//! Remediation verbs (delete, scale) are deliberately absent — the
//! orchestrator recommends, it does not act.
//!
//! Adapter failures degrade to empty results; steps treat "nothing found"
//! and "could not look" the same way and the error is logged here.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::config::defaults::ADAPTER_TIMEOUT_SECS;

/// One event attached to a pod or node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
    pub message: String,
    pub count: u64,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
}

/// Aggregated container requests/limits for a pod.
///
/// CPU in millicores, memory in MiB.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_request: f64,
    pub cpu_limit: f64,
    pub memory_request: f64,
    pub memory_limit: f64,
}

/// A pod scheduled on a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    /// Millicores; zero when the metrics API is unavailable.
    pub cpu: f64,
    /// MiB; zero when the metrics API is unavailable.
    pub memory: f64,
}

/// A workload created inside the recent-change window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentChange {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: Option<String>,
    pub replicas: Option<i64>,
    pub image: String,
}

/// A pod evicted from a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionEvent {
    pub pod: String,
    pub namespace: String,
    pub reason: String,
    pub message: String,
    pub timestamp: Option<String>,
}

/// Read-only view of the cluster for the investigation steps.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn pod_events(&self, pod: &str, namespace: &str) -> Vec<PodEvent>;
    async fn pod_logs(&self, pod: &str, namespace: &str, lines: u32) -> Vec<String>;
    async fn restart_count(&self, pod: &str, namespace: &str) -> u64;
    async fn resource_limits(&self, pod: &str, namespace: &str) -> ResourceLimits;
    async fn recent_changes(&self, namespace: &str, window_hours: i64) -> Vec<DeploymentChange>;
    async fn node_summary(&self, node: &str) -> Value;
    async fn pods_on_node(&self, node: &str) -> Vec<PodInfo>;
    async fn eviction_events(&self, node: &str) -> Vec<EvictionEvent>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("No cluster endpoint configured (in-cluster env or KUBE_API_URL)")]
    NoEndpoint,
    #[error("Failed to read service account material: {0}")]
    ServiceAccount(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

const SA_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const SA_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Thin HTTP adapter over the Kubernetes REST API.
pub struct HttpClusterClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpClusterClient {
    /// Connect using in-cluster service account material, falling back to
    /// `KUBE_API_URL` / `KUBE_BEARER_TOKEN` for out-of-cluster runs.
    pub fn from_env() -> Result<Self, ClusterError> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(ADAPTER_TIMEOUT_SECS));

        let (base_url, token) = if let Ok(host) = std::env::var("KUBERNETES_SERVICE_HOST") {
            let port = std::env::var("KUBERNETES_SERVICE_PORT_HTTPS")
                .unwrap_or_else(|_| "443".to_string());
            let token = std::fs::read_to_string(SA_TOKEN_PATH)
                .map_err(|e| ClusterError::ServiceAccount(e.to_string()))?;
            let ca = std::fs::read(SA_CA_PATH)
                .map_err(|e| ClusterError::ServiceAccount(e.to_string()))?;
            let cert = reqwest::Certificate::from_pem(&ca)
                .map_err(|e| ClusterError::ServiceAccount(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
            info!("Using in-cluster Kubernetes configuration");
            (format!("https://{host}:{port}"), token.trim().to_string())
        } else if let Ok(url) = std::env::var("KUBE_API_URL") {
            let token = std::env::var("KUBE_BEARER_TOKEN").unwrap_or_default();
            info!(url = %url, "Using external Kubernetes endpoint");
            (url.trim_end_matches('/').to_string(), token)
        } else {
            return Err(ClusterError::NoEndpoint);
        };

        let http = builder
            .build()
            .map_err(|e| ClusterError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Option<Value> {
        let result = self
            .http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match result {
            Ok(resp) => match resp.json().await {
                Ok(body) => Some(body),
                Err(e) => {
                    error!(path, "Failed to decode cluster API response: {e}");
                    None
                }
            },
            Err(e) => {
                error!(path, "Cluster API request failed: {e}");
                None
            }
        }
    }

    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Option<String> {
        let result = self
            .http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match result {
            Ok(resp) => resp.text().await.ok(),
            Err(e) => {
                error!(path, "Cluster API request failed: {e}");
                None
            }
        }
    }

    fn items(body: Option<Value>) -> Vec<Value> {
        body.and_then(|v| v.get("items").and_then(Value::as_array).cloned())
            .unwrap_or_default()
    }

    fn parse_event(item: &Value) -> PodEvent {
        PodEvent {
            kind: str_field(item, &["type"]),
            reason: str_field(item, &["reason"]),
            message: str_field(item, &["message"]),
            count: item.get("count").and_then(Value::as_u64).unwrap_or(0),
            first_timestamp: item
                .get("firstTimestamp")
                .and_then(Value::as_str)
                .map(String::from),
            last_timestamp: item
                .get("lastTimestamp")
                .and_then(Value::as_str)
                .map(String::from),
        }
    }
}

fn str_field(value: &Value, path: &[&str]) -> String {
    let mut cursor = value;
    for key in path {
        match cursor.get(key) {
            Some(next) => cursor = next,
            None => return String::new(),
        }
    }
    cursor.as_str().unwrap_or("").to_string()
}

/// Parse a Kubernetes CPU quantity into millicores (`250m` → 250, `1` → 1000).
pub fn parse_cpu_quantity(quantity: &str) -> f64 {
    if quantity.is_empty() {
        return 0.0;
    }
    if let Some(millis) = quantity.strip_suffix('m') {
        millis.parse().unwrap_or(0.0)
    } else {
        quantity.parse::<f64>().unwrap_or(0.0) * 1000.0
    }
}

/// Parse a Kubernetes memory quantity into MiB (`512Mi` → 512, `1Gi` → 1024,
/// plain numbers are bytes).
pub fn parse_memory_quantity(quantity: &str) -> f64 {
    if quantity.is_empty() {
        return 0.0;
    }
    let units: [(&str, f64); 6] = [
        ("Ki", 1.0 / 1024.0),
        ("Mi", 1.0),
        ("Gi", 1024.0),
        ("K", 1.0 / 1000.0),
        ("M", 1.0),
        ("G", 1000.0),
    ];
    for (unit, multiplier) in units {
        if let Some(amount) = quantity.strip_suffix(unit) {
            return amount.parse::<f64>().unwrap_or(0.0) * multiplier;
        }
    }
    quantity.parse::<f64>().unwrap_or(0.0) / (1024.0 * 1024.0)
}

#[async_trait]
impl ClusterApi for HttpClusterClient {
    async fn pod_events(&self, pod: &str, namespace: &str) -> Vec<PodEvent> {
        let body = self
            .get_json(
                &format!("/api/v1/namespaces/{namespace}/events"),
                &[("fieldSelector", format!("involvedObject.name={pod}"))],
            )
            .await;
        Self::items(body).iter().map(Self::parse_event).collect()
    }

    async fn pod_logs(&self, pod: &str, namespace: &str, lines: u32) -> Vec<String> {
        let text = self
            .get_text(
                &format!("/api/v1/namespaces/{namespace}/pods/{pod}/log"),
                &[("tailLines", lines.to_string())],
            )
            .await;
        text.map(|t| t.lines().map(String::from).collect())
            .unwrap_or_default()
    }

    async fn restart_count(&self, pod: &str, namespace: &str) -> u64 {
        let body = self
            .get_json(&format!("/api/v1/namespaces/{namespace}/pods/{pod}"), &[])
            .await;
        body.and_then(|pod| {
            pod.get("status")?
                .get("containerStatuses")?
                .as_array()
                .map(|statuses| {
                    statuses
                        .iter()
                        .filter_map(|s| s.get("restartCount").and_then(Value::as_u64))
                        .sum()
                })
        })
        .unwrap_or(0)
    }

    async fn resource_limits(&self, pod: &str, namespace: &str) -> ResourceLimits {
        let body = self
            .get_json(&format!("/api/v1/namespaces/{namespace}/pods/{pod}"), &[])
            .await;

        let mut limits = ResourceLimits::default();
        let containers = body
            .as_ref()
            .and_then(|p| p.get("spec")?.get("containers")?.as_array().cloned())
            .unwrap_or_default();

        for container in containers {
            let resources = container.get("resources").cloned().unwrap_or(Value::Null);
            limits.cpu_request +=
                parse_cpu_quantity(&str_field(&resources, &["requests", "cpu"]));
            limits.memory_request +=
                parse_memory_quantity(&str_field(&resources, &["requests", "memory"]));
            limits.cpu_limit += parse_cpu_quantity(&str_field(&resources, &["limits", "cpu"]));
            limits.memory_limit +=
                parse_memory_quantity(&str_field(&resources, &["limits", "memory"]));
        }
        limits
    }

    async fn recent_changes(&self, namespace: &str, window_hours: i64) -> Vec<DeploymentChange> {
        let body = self
            .get_json(
                &format!("/apis/apps/v1/namespaces/{namespace}/deployments"),
                &[],
            )
            .await;
        let cutoff = Utc::now() - ChronoDuration::hours(window_hours);

        Self::items(body)
            .iter()
            .filter_map(|deployment| {
                let created = str_field(deployment, &["metadata", "creationTimestamp"]);
                let created_at: DateTime<Utc> = created.parse().ok()?;
                if created_at <= cutoff {
                    return None;
                }
                let image = deployment
                    .get("spec")
                    .and_then(|s| s.get("template"))
                    .and_then(|t| t.get("spec"))
                    .and_then(|s| s.get("containers"))
                    .and_then(Value::as_array)
                    .and_then(|containers| containers.first())
                    .map_or_else(|| "unknown".to_string(), |c| str_field(c, &["image"]));
                Some(DeploymentChange {
                    name: str_field(deployment, &["metadata", "name"]),
                    kind: "deployment".to_string(),
                    timestamp: Some(created),
                    replicas: deployment
                        .get("spec")
                        .and_then(|s| s.get("replicas"))
                        .and_then(Value::as_i64),
                    image,
                })
            })
            .collect()
    }

    async fn node_summary(&self, node: &str) -> Value {
        let body = self.get_json(&format!("/api/v1/nodes/{node}"), &[]).await;
        let Some(body) = body else {
            return Value::Object(serde_json::Map::new());
        };

        let mut status = "Unknown".to_string();
        let mut conditions = Vec::new();
        if let Some(items) = body
            .get("status")
            .and_then(|s| s.get("conditions"))
            .and_then(Value::as_array)
        {
            for condition in items {
                if str_field(condition, &["type"]) == "Ready" {
                    status = str_field(condition, &["status"]);
                }
                conditions.push(serde_json::json!({
                    "type": str_field(condition, &["type"]),
                    "status": str_field(condition, &["status"]),
                    "reason": str_field(condition, &["reason"]),
                    "message": str_field(condition, &["message"]),
                }));
            }
        }

        let quantity_block = |section: &str| {
            serde_json::json!({
                "cpu": str_field(&body, &["status", section, "cpu"]),
                "memory": str_field(&body, &["status", section, "memory"]),
                "pods": str_field(&body, &["status", section, "pods"]),
            })
        };

        serde_json::json!({
            "name": str_field(&body, &["metadata", "name"]),
            "status": status,
            "conditions": conditions,
            "capacity": quantity_block("capacity"),
            "allocatable": quantity_block("allocatable"),
        })
    }

    async fn pods_on_node(&self, node: &str) -> Vec<PodInfo> {
        let body = self
            .get_json(
                "/api/v1/pods",
                &[("fieldSelector", format!("spec.nodeName={node}"))],
            )
            .await;
        Self::items(body)
            .iter()
            .map(|pod| PodInfo {
                name: str_field(pod, &["metadata", "name"]),
                namespace: str_field(pod, &["metadata", "namespace"]),
                phase: {
                    let phase = str_field(pod, &["status", "phase"]);
                    if phase.is_empty() {
                        "Unknown".to_string()
                    } else {
                        phase
                    }
                },
                cpu: 0.0,
                memory: 0.0,
            })
            .collect()
    }

    async fn eviction_events(&self, node: &str) -> Vec<EvictionEvent> {
        let body = self
            .get_json(
                "/api/v1/events",
                &[(
                    "fieldSelector",
                    format!("involvedObject.name={node},reason=Evicted"),
                )],
            )
            .await;
        Self::items(body)
            .iter()
            .map(|event| EvictionEvent {
                pod: str_field(event, &["involvedObject", "name"]),
                namespace: str_field(event, &["involvedObject", "namespace"]),
                reason: str_field(event, &["reason"]),
                message: str_field(event, &["message"]),
                timestamp: event
                    .get("lastTimestamp")
                    .and_then(Value::as_str)
                    .map(String::from),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_quantity() {
        assert_eq!(parse_cpu_quantity("250m"), 250.0);
        assert_eq!(parse_cpu_quantity("1"), 1000.0);
        assert_eq!(parse_cpu_quantity("2.5"), 2500.0);
        assert_eq!(parse_cpu_quantity(""), 0.0);
        assert_eq!(parse_cpu_quantity("garbage"), 0.0);
    }

    #[test]
    fn test_parse_memory_quantity() {
        assert_eq!(parse_memory_quantity("512Mi"), 512.0);
        assert_eq!(parse_memory_quantity("1Gi"), 1024.0);
        assert_eq!(parse_memory_quantity("1024Ki"), 1.0);
        assert_eq!(parse_memory_quantity("1G"), 1000.0);
        // Plain numbers are bytes
        assert_eq!(parse_memory_quantity("1048576"), 1.0);
        assert_eq!(parse_memory_quantity(""), 0.0);
    }

    #[test]
    fn test_parse_event_fields() {
        let item = serde_json::json!({
            "type": "Warning",
            "reason": "OOMKilling",
            "message": "Memory cgroup out of memory",
            "count": 3,
            "lastTimestamp": "2025-06-01T10:00:00Z",
        });
        let event = HttpClusterClient::parse_event(&item);
        assert_eq!(event.kind, "Warning");
        assert_eq!(event.reason, "OOMKilling");
        assert_eq!(event.count, 3);
        assert!(event.first_timestamp.is_none());
    }
}
