//! Opswatch: Kubernetes incident response and metrics querying
//!
//! Two collaborating observability services:
//!
//! ## Architecture
//!
//! - **Incident Orchestrator**: priority event intake, bounded concurrent
//!   dispatch, declarative investigation workflows, rule-based diagnosis,
//!   chat reporting
//! - **Metrics Query Gateway**: natural-language → PromQL translation,
//!   signed range-query execution, threshold-driven insight generation
//!
//! External systems (cluster API, metrics store, trace store, chat, request
//! signing) are capability traits under `integrations`; tests inject fakes.

pub mod api;
pub mod config;
pub mod events;
pub mod integrations;
pub mod query;
pub mod types;
pub mod workflow;

// Re-export configuration
pub use config::{AgentConfig, GatewayConfig, IdentifierFallbacks, Thresholds};

// Re-export commonly used types
pub use types::{Event, EventPriority, Finding, IncidentReport, StepReport, Trend};

// Re-export the orchestrator surface
pub use events::{EventDispatcher, PriorityEventQueue};
pub use workflow::{InvestigationEngine, StepToolkit, WorkflowEngine, WorkflowKind};

// Re-export the query pipeline
pub use query::{InsightGenerator, PrometheusClient, QueryTranslator};
