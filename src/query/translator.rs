//! Natural-language → PromQL translation
//!
//! A fixed, ordered template table: the first template whose regex matches
//! the lowercased query wins, capture group 1 fills the placeholder named by
//! the rendered PromQL. Queries no template understands fall back to a
//! keyword lookup; a time window is extracted from phrasing independently.

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::config::defaults::DEFAULT_TIME_RANGE;

/// One NL → PromQL template.
struct QueryTemplate {
    pattern: Regex,
    promql: &'static str,
    description: &'static str,
    category: &'static str,
}

/// Successful translation.
#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    pub promql: String,
    pub template: String,
    pub category: String,
    pub time_range: String,
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Could not translate query. Please provide more specific information.")]
    NoMatch,
    #[error("Template '{0}' matched but captured no parameter")]
    MissingCapture(String),
    #[error("Invalid template pattern: {0}")]
    BadPattern(String),
}

/// Placeholder names a rendered PromQL may reference, with the substring
/// that marks the template as needing them.
const PLACEHOLDERS: [(&str, &str); 4] = [
    ("pod", "pod_name"),
    ("namespace", "namespace"),
    ("service", "service_name"),
    ("node", "node_name"),
];

pub struct QueryTranslator {
    templates: Vec<QueryTemplate>,
}

impl QueryTranslator {
    /// Compile the template table. Only called at startup.
    pub fn new() -> Self {
        let specs: [(&str, &str, &str, &str); 10] = [
            (
                r"memory usage.*pod\s+(\S+)",
                r#"container_memory_usage_bytes{pod="{pod_name}"}"#,
                "Memory usage for a specific pod",
                "memory",
            ),
            (
                r"cpu usage.*pod\s+(\S+)",
                r#"rate(container_cpu_usage_seconds_total{pod="{pod_name}"}[5m])"#,
                "CPU usage for a specific pod",
                "cpu",
            ),
            (
                r"memory usage.*namespace\s+(\S+)",
                r#"sum(container_memory_usage_bytes{namespace="{namespace}"}) by (pod)"#,
                "Memory usage by pod in namespace",
                "memory",
            ),
            (
                r"cpu usage.*namespace\s+(\S+)",
                r#"sum(rate(container_cpu_usage_seconds_total{namespace="{namespace}"}[5m])) by (pod)"#,
                "CPU usage by pod in namespace",
                "cpu",
            ),
            (
                r"request rate.*service\s+(\S+)",
                r#"rate(http_requests_total{service="{service_name}"}[5m])"#,
                "Request rate for a service",
                "requests",
            ),
            (
                r"error rate.*service\s+(\S+)",
                r#"rate(http_requests_total{service="{service_name}",status=~"5.."}[5m])"#,
                "Error rate for a service",
                "errors",
            ),
            (
                r"latency.*service\s+(\S+)",
                r#"histogram_quantile(0.99, rate(http_request_duration_seconds_bucket{service="{service_name}"}[5m]))"#,
                "P99 latency for a service",
                "latency",
            ),
            (
                r"resource usage.*node\s+(\S+)",
                r#"node_memory_MemAvailable_bytes{node="{node_name}"} / node_memory_MemTotal_bytes{node="{node_name}"}"#,
                "Memory availability on a node",
                "node",
            ),
            (
                r"pod count.*namespace\s+(\S+)",
                r#"count(kube_pod_info{namespace="{namespace}"}) by (namespace)"#,
                "Count of pods in namespace",
                "pods",
            ),
            (
                r"restart count.*pod\s+(\S+)",
                r#"kube_pod_container_status_restarts_total{pod="{pod_name}"}"#,
                "Container restart count for pod",
                "restarts",
            ),
        ];

        let templates: Vec<QueryTemplate> = specs
            .into_iter()
            .filter_map(|(pattern, promql, description, category)| {
                // Patterns are static; a failure here is a programming error
                // caught by the template tests.
                Regex::new(pattern).ok().map(|pattern| QueryTemplate {
                    pattern,
                    promql,
                    description,
                    category,
                })
            })
            .collect();

        info!(
            templates = templates.len(),
            "Query translator initialized"
        );
        Self { templates }
    }

    /// Translate a natural-language query.
    pub fn translate(&self, query: &str) -> Result<Translation, TranslateError> {
        let query_lower = query.to_lowercase();

        for template in &self.templates {
            let Some(captures) = template.pattern.captures(&query_lower) else {
                continue;
            };

            let parameters = extract_parameters(&captures, template)?;
            let mut promql = template.promql.to_string();
            for (name, value) in &parameters {
                promql = promql.replace(&format!("{{{name}}}"), value);
            }

            return Ok(Translation {
                promql,
                template: template.description.to_string(),
                category: template.category.to_string(),
                time_range: extract_time_range(query).to_string(),
                parameters,
            });
        }

        // Keyword fallback for queries no template understands.
        if let Some(promql) = keyword_fallback(&query_lower) {
            return Ok(Translation {
                promql: promql.to_string(),
                template: "keyword-based".to_string(),
                category: "generic".to_string(),
                time_range: extract_time_range(query).to_string(),
                parameters: HashMap::new(),
            });
        }

        Err(TranslateError::NoMatch)
    }

    /// Description, category, and an example phrasing per template.
    pub fn list_templates(&self) -> Vec<TemplateInfo> {
        self.templates
            .iter()
            .map(|t| TemplateInfo {
                description: t.description.to_string(),
                category: t.category.to_string(),
                example: example_for(t),
            })
            .collect()
    }

    /// Related-query suggestions keyed by the dominant keyword (top 5).
    pub fn suggest(&self, query: &str) -> Vec<String> {
        let query_lower = query.to_lowercase();
        let suggestions: &[&str] = if query_lower.contains("memory") {
            &[
                "Show me memory usage trend over the last day",
                "Compare memory usage across all pods",
                "Detect memory leaks in the application",
            ]
        } else if query_lower.contains("cpu") {
            &[
                "Show me CPU throttling events",
                "Compare CPU usage across all pods",
                "Show me CPU usage spikes",
            ]
        } else if query_lower.contains("latency") || query_lower.contains("request") {
            &[
                "Show me error rate for the service",
                "Compare latency across services",
                "Show me slow requests",
            ]
        } else {
            &[]
        };

        suggestions.iter().take(5).map(|s| (*s).to_string()).collect()
    }
}

impl Default for QueryTranslator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    pub description: String,
    pub category: String,
    pub example: String,
}

/// Fill parameters from capture group 1 for every placeholder the rendered
/// PromQL mentions. A template that references a placeholder without
/// capturing anything is a structured error, not a panic.
fn extract_parameters(
    captures: &regex::Captures<'_>,
    template: &QueryTemplate,
) -> Result<HashMap<String, String>, TranslateError> {
    let mut parameters = HashMap::new();

    for (marker, name) in PLACEHOLDERS {
        if template.promql.contains(marker) {
            let value = captures
                .get(1)
                .ok_or_else(|| TranslateError::MissingCapture(template.description.to_string()))?;
            parameters.insert(name.to_string(), value.as_str().to_string());
        }
    }
    Ok(parameters)
}

/// Time window phrases → range strings. Default is one hour.
pub fn extract_time_range(query: &str) -> &'static str {
    let query_lower = query.to_lowercase();

    if query_lower.contains("last hour") || query_lower.contains("past hour") {
        "1h"
    } else if query_lower.contains("last 30 minutes") {
        "30m"
    } else if query_lower.contains("last 15 minutes") {
        "15m"
    } else if query_lower.contains("last 5 minutes") {
        "5m"
    } else if query_lower.contains("last day") || query_lower.contains("past day") {
        "1d"
    } else if query_lower.contains("last week") {
        "7d"
    } else {
        DEFAULT_TIME_RANGE
    }
}

/// Parameterless PromQL for keyword-only queries.
fn keyword_fallback(query_lower: &str) -> Option<&'static str> {
    if query_lower.contains("memory") && query_lower.contains("pod") {
        Some("container_memory_usage_bytes")
    } else if query_lower.contains("cpu") && query_lower.contains("pod") {
        Some("rate(container_cpu_usage_seconds_total[5m])")
    } else if query_lower.contains("request") {
        Some("rate(http_requests_total[5m])")
    } else {
        None
    }
}

fn example_for(template: &QueryTemplate) -> String {
    let pattern = template.pattern.as_str();
    let sample = if pattern.contains("pod") {
        "my-pod-name"
    } else if pattern.contains("namespace") {
        "default"
    } else if pattern.contains("service") {
        "my-service"
    } else if pattern.contains("node") {
        "node-1"
    } else {
        "example"
    };
    pattern.replace(r"(\S+)", sample).replace(r".*", " ... ")
}
