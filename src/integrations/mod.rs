//! Integration adapters
//!
//! Every external system sits behind a small capability trait so tests can
//! inject deterministic fakes and deployments can swap backends:
//!
//! - [`ClusterApi`] — Kubernetes control plane (read-only)
//! - [`MetricsQuery`] — natural-language metrics via the query gateway
//! - [`TraceStore`] — distributed traces
//! - [`ChatNotifier`] — incident notifications
//! - [`RequestSigner`] — authentication headers for signed backends

pub mod chat;
pub mod cluster;
pub mod metrics;
pub mod signer;
pub mod traces;

pub use chat::{severity_emoji, ChatNotifier, SlackClient};
pub use cluster::{
    ClusterApi, ClusterError, DeploymentChange, EvictionEvent, HttpClusterClient, PodEvent,
    PodInfo, ResourceLimits,
};
pub use metrics::{GatewayMetricsClient, MetricSnapshot, MetricsQuery};
pub use signer::{load_aws_credentials, NoopSigner, RequestSigner, SigV4Signer, SignerError};
pub use traces::{identify_bottleneck, TraceSegment, TraceStore, TraceSummary, XRayClient};
