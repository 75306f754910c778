//! Environment-driven configuration for both services
//!
//! Everything is read once at startup. The orchestrator and the gateway share
//! the AWS settings; each has its own service-specific block.

pub mod defaults;

use std::time::Duration;

/// Read an env var with a fallback.
fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| fallback.to_string())
}

/// Read a parseable env var, falling back on absence or parse failure.
fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Configuration for the incident response orchestrator.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// AWS region for signed calls (Prometheus, X-Ray, Secrets Manager)
    pub region: String,
    /// EKS cluster the agent watches
    pub cluster_name: String,
    /// Chat channel for incident notifications
    pub slack_channel: String,
    /// Bot token (falls back to Secrets Manager lookup when unset)
    pub slack_bot_token: Option<String>,
    /// Secrets Manager secret holding the bot token
    pub slack_secret_name: String,
    /// Base URL of the metrics query gateway
    pub metrics_gateway_url: String,
    /// Sleep between polls of the (placeholder) event source
    pub poll_interval: Duration,
    /// Cap on concurrently investigated incidents
    pub max_concurrent_events: usize,
    /// Grafana base URL for dashboard links in chat messages
    pub grafana_url: String,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        Self {
            region: env_or("AWS_REGION", defaults::AWS_REGION),
            cluster_name: env_or("EKS_CLUSTER_NAME", defaults::CLUSTER_NAME),
            slack_channel: env_or("SLACK_CHANNEL", defaults::SLACK_CHANNEL),
            slack_bot_token: std::env::var("SLACK_BOT_TOKEN").ok(),
            slack_secret_name: env_or("SLACK_SECRET_NAME", defaults::SLACK_SECRET_NAME),
            metrics_gateway_url: env_or("PROMETHEUS_MCP_URL", defaults::METRICS_GATEWAY_URL),
            poll_interval: Duration::from_secs(env_parse(
                "EVENT_POLL_INTERVAL",
                defaults::EVENT_POLL_INTERVAL_SECS,
            )),
            max_concurrent_events: env_parse(
                "MAX_CONCURRENT_EVENTS",
                defaults::MAX_CONCURRENT_EVENTS,
            ),
            grafana_url: env_or("GRAFANA_URL", defaults::GRAFANA_URL),
        }
    }
}

// ============================================================================
// Query gateway
// ============================================================================

/// Configuration for the metrics query gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub region: String,
    /// Managed Prometheus workspace id
    pub workspace_id: String,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", defaults::GATEWAY_HOST),
            port: env_parse("PORT", defaults::GATEWAY_PORT),
            region: env_or("AWS_REGION", defaults::AWS_REGION),
            workspace_id: env_or("AMP_WORKSPACE_ID", ""),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Investigation thresholds
// ============================================================================

/// Tunable thresholds used by the step handlers.
///
/// Defaults match the values the investigation rules were calibrated with;
/// each can be overridden through the environment.
#[derive(Debug, Clone)]
pub struct Thresholds {
    /// Memory limit below which a pod is considered under-provisioned (MiB)
    pub memory_limit_floor_mb: f64,
    /// Restart count above which restarts are considered frequent
    pub frequent_restart_count: u64,
    /// CPU throttling ratio above which throttling is flagged
    pub throttling_ratio_warning: f64,
    /// Minimum trace duration considered slow (seconds)
    pub slow_trace_threshold_secs: f64,
    /// Cap on slow traces fetched per incident
    pub slow_trace_limit: usize,
    /// Lookback window for recent deployment changes (hours)
    pub recent_change_window_hours: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            memory_limit_floor_mb: 128.0,
            frequent_restart_count: 5,
            throttling_ratio_warning: 0.1,
            slow_trace_threshold_secs: 1.0,
            slow_trace_limit: 10,
            recent_change_window_hours: 24,
        }
    }
}

impl Thresholds {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            memory_limit_floor_mb: env_parse("MEMORY_LIMIT_FLOOR_MB", d.memory_limit_floor_mb),
            frequent_restart_count: env_parse("FREQUENT_RESTART_COUNT", d.frequent_restart_count),
            throttling_ratio_warning: env_parse(
                "THROTTLING_RATIO_WARNING",
                d.throttling_ratio_warning,
            ),
            slow_trace_threshold_secs: env_parse(
                "SLOW_TRACE_THRESHOLD_SECS",
                d.slow_trace_threshold_secs,
            ),
            slow_trace_limit: env_parse("SLOW_TRACE_LIMIT", d.slow_trace_limit),
            recent_change_window_hours: env_parse(
                "RECENT_CHANGE_WINDOW_HOURS",
                d.recent_change_window_hours,
            ),
        }
    }
}

/// Fallback target identifiers for `identify_*` steps.
///
/// Alarm payloads do not reliably carry the affected resource, so when
/// parsing fails the steps fall back to these configured names instead of
/// aborting the investigation.
#[derive(Debug, Clone)]
pub struct IdentifierFallbacks {
    pub pod_name: String,
    pub namespace: String,
    pub service_name: String,
    pub node_name: String,
}

impl Default for IdentifierFallbacks {
    fn default() -> Self {
        Self {
            pod_name: "petadoptionshistory-py".to_string(),
            namespace: "default".to_string(),
            service_name: "payforadoption-go".to_string(),
            node_name: "ip-10-0-1-100.ec2.internal".to_string(),
        }
    }
}

impl IdentifierFallbacks {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            pod_name: env_or("FALLBACK_POD_NAME", &d.pod_name),
            namespace: env_or("FALLBACK_NAMESPACE", &d.namespace),
            service_name: env_or("FALLBACK_SERVICE_NAME", &d.service_name),
            node_name: env_or("FALLBACK_NODE_NAME", &d.node_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_defaults() {
        let t = Thresholds::default();
        assert_eq!(t.memory_limit_floor_mb, 128.0);
        assert_eq!(t.frequent_restart_count, 5);
        assert_eq!(t.throttling_ratio_warning, 0.1);
        assert_eq!(t.slow_trace_limit, 10);
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        std::env::set_var("OPSWATCH_TEST_GARBAGE", "not-a-number");
        let v: usize = env_parse("OPSWATCH_TEST_GARBAGE", 7);
        assert_eq!(v, 7);
        std::env::remove_var("OPSWATCH_TEST_GARBAGE");
    }

    #[test]
    fn test_gateway_bind_addr() {
        let cfg = GatewayConfig {
            host: "127.0.0.1".to_string(),
            port: 9090,
            region: "us-east-1".to_string(),
            workspace_id: "ws-1".to_string(),
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9090");
    }
}
