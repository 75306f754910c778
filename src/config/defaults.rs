//! Built-in defaults for environment-driven settings

/// AWS region when `AWS_REGION` is unset
pub const AWS_REGION: &str = "us-east-1";

/// EKS cluster name when `EKS_CLUSTER_NAME` is unset
pub const CLUSTER_NAME: &str = "PetAdoptions-EKS";

/// Incident notification channel
pub const SLACK_CHANNEL: &str = "#eks-incidents";

/// Secrets Manager secret holding the chat bot token
pub const SLACK_SECRET_NAME: &str = "devops-agent/slack-token";

/// Metrics query gateway base URL
pub const METRICS_GATEWAY_URL: &str = "http://prometheus-mcp-server:8080";

/// Seconds between event source polls
pub const EVENT_POLL_INTERVAL_SECS: u64 = 5;

/// Cap on concurrently running incident handlers
pub const MAX_CONCURRENT_EVENTS: usize = 3;

/// Grafana base URL for dashboard links
pub const GRAFANA_URL: &str = "https://grafana.example.com";

/// Gateway HTTP bind host
pub const GATEWAY_HOST: &str = "0.0.0.0";

/// Gateway HTTP bind port
pub const GATEWAY_PORT: u16 = 8080;

/// Bounded wait on the event queue per dispatch tick (seconds)
pub const QUEUE_POP_TIMEOUT_SECS: u64 = 1;

/// Timeout for every outbound adapter call (seconds)
pub const ADAPTER_TIMEOUT_SECS: u64 = 30;

/// Default PromQL range-query resolution
pub const QUERY_STEP: &str = "15s";

/// Default query window when no time range is given or parseable
pub const DEFAULT_TIME_RANGE: &str = "1h";
