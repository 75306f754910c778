//! Insight generation from parsed query results
//!
//! Turns an aggregate result block into an ordered list of short
//! human-readable observations: current value, trend commentary, variability,
//! keyword-driven threshold checks, anomaly count, cardinality, and finally
//! the PromQL itself for transparency.

use crate::query::executor::RangeSummary;
use crate::types::Trend;

/// Threshold values for the keyword-driven insight rules.
pub mod insight_thresholds {
    // === Memory (percent) ===
    pub const MEMORY_CRITICAL: f64 = 90.0;
    pub const MEMORY_WARNING: f64 = 80.0;
    pub const MEMORY_CAUTION: f64 = 70.0;

    // === CPU (percent) ===
    pub const CPU_CRITICAL: f64 = 85.0;
    pub const CPU_WARNING: f64 = 70.0;

    // === Latency (milliseconds) ===
    pub const LATENCY_CRITICAL: f64 = 3000.0;
    pub const LATENCY_WARNING: f64 = 1000.0;
    pub const LATENCY_CAUTION: f64 = 500.0;

    // === Error rate (percent) ===
    pub const ERROR_CRITICAL: f64 = 5.0;
    pub const ERROR_WARNING: f64 = 1.0;

    /// Min/max spread (percent of max) considered high variability
    pub const VARIABILITY_HIGH: f64 = 50.0;

    /// Series count considered high cardinality
    pub const HIGH_CARDINALITY: usize = 10;
}

/// Stateless insight generator; reentrant across gateway requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsightGenerator;

impl InsightGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Build the ordered insight list for one query result.
    pub fn generate(&self, query: &str, promql: &str, data: &RangeSummary) -> Vec<String> {
        let mut insights = Vec::new();

        let current = data.current_value;
        if current > 0.0 {
            insights.push(format!("Current value: {current:.2}"));
        }

        match data.trend {
            Trend::Increasing => {
                insights.push("⚠️ Metric is increasing over time - monitor closely".to_string());
            }
            Trend::Decreasing => {
                insights.push("✅ Metric is decreasing - situation improving".to_string());
            }
            Trend::Stable => insights.push("ℹ️ Metric is stable".to_string()),
            Trend::Unknown => {}
        }

        if data.max_value > 0.0 && data.min_value >= 0.0 {
            let variation = (data.max_value - data.min_value) / data.max_value * 100.0;
            if variation > insight_thresholds::VARIABILITY_HIGH {
                insights.push(format!(
                    "High variability detected: {variation:.1}% variation between min and max"
                ));
            }
        }

        insights.extend(check_thresholds(query, current));

        if !data.anomalies.is_empty() {
            insights.push(format!("🔍 {} anomalies detected", data.anomalies.len()));
        }

        if data.series_count > insight_thresholds::HIGH_CARDINALITY {
            insights.push(format!(
                "High cardinality: {} time series returned",
                data.series_count
            ));
        }

        insights.push(format!("PromQL: `{promql}`"));
        insights
    }
}

/// Keyword-driven threshold checks over the original query text.
fn check_thresholds(query: &str, current: f64) -> Vec<String> {
    use insight_thresholds as t;

    let mut insights = Vec::new();
    let query_lower = query.to_lowercase();

    if query_lower.contains("memory") {
        if current > t::MEMORY_CRITICAL {
            insights.push("🔴 CRITICAL: Memory usage > 90% - OOMKill risk".to_string());
        } else if current > t::MEMORY_WARNING {
            insights.push("🟠 WARNING: Memory usage > 80%".to_string());
        } else if current > t::MEMORY_CAUTION {
            insights.push("🟡 CAUTION: Memory usage > 70%".to_string());
        }
    }

    if query_lower.contains("cpu") {
        if current > t::CPU_CRITICAL {
            insights.push("🔴 CRITICAL: CPU usage > 85% - throttling likely".to_string());
        } else if current > t::CPU_WARNING {
            insights.push("🟠 WARNING: CPU usage > 70%".to_string());
        }
    }

    if query_lower.contains("latency") || query_lower.contains("duration") {
        if current > t::LATENCY_CRITICAL {
            insights
                .push("🔴 CRITICAL: Latency > 3s - user experience severely impacted".to_string());
        } else if current > t::LATENCY_WARNING {
            insights.push("🟠 WARNING: Latency > 1s - user experience degraded".to_string());
        } else if current > t::LATENCY_CAUTION {
            insights.push("🟡 CAUTION: Latency > 500ms".to_string());
        }
    }

    if query_lower.contains("error") {
        if current > t::ERROR_CRITICAL {
            insights.push("🔴 CRITICAL: Error rate > 5%".to_string());
        } else if current > t::ERROR_WARNING {
            insights.push("🟠 WARNING: Error rate > 1%".to_string());
        }
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(current: f64, min: f64, max: f64, trend: Trend, series: usize) -> RangeSummary {
        RangeSummary {
            current_value: current,
            min_value: min,
            max_value: max,
            average_value: (min + max) / 2.0,
            trend,
            values: Vec::new(),
            series_count: series,
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn test_anomaly_count_insight() {
        let gen = InsightGenerator::new();
        let mut data = summary(1.0, 1.0, 1.0, Trend::Stable, 1);
        data.anomalies = vec![serde_json::json!({"ts": 1}), serde_json::json!({"ts": 2})];
        let insights = gen.generate("q", "q", &data);
        assert!(insights.iter().any(|i| i.contains("2 anomalies detected")));
    }

    #[test]
    fn test_insights_always_end_with_promql() {
        let gen = InsightGenerator::new();
        let insights = gen.generate(
            "anything",
            "up",
            &summary(0.0, 0.0, 0.0, Trend::Unknown, 0),
        );
        assert_eq!(insights.last().unwrap(), "PromQL: `up`");
        // Zero current value, unknown trend: only the PromQL line
        assert_eq!(insights.len(), 1);
    }

    #[test]
    fn test_trend_commentary() {
        let gen = InsightGenerator::new();
        let increasing = gen.generate(
            "q",
            "up",
            &summary(10.0, 9.0, 11.0, Trend::Increasing, 1),
        );
        assert!(increasing
            .iter()
            .any(|i| i.contains("increasing over time")));

        let decreasing = gen.generate(
            "q",
            "up",
            &summary(10.0, 9.0, 11.0, Trend::Decreasing, 1),
        );
        assert!(decreasing.iter().any(|i| i.contains("situation improving")));
    }

    #[test]
    fn test_memory_thresholds() {
        let gen = InsightGenerator::new();
        let critical = gen.generate(
            "show memory usage",
            "q",
            &summary(95.0, 90.0, 95.0, Trend::Stable, 1),
        );
        assert!(critical.iter().any(|i| i.contains("OOMKill risk")));

        let warning = gen.generate(
            "show memory usage",
            "q",
            &summary(85.0, 80.0, 85.0, Trend::Stable, 1),
        );
        assert!(warning
            .iter()
            .any(|i| i.contains("WARNING: Memory usage > 80%")));

        let caution = gen.generate(
            "show memory usage",
            "q",
            &summary(75.0, 70.0, 75.0, Trend::Stable, 1),
        );
        assert!(caution
            .iter()
            .any(|i| i.contains("CAUTION: Memory usage > 70%")));
    }

    #[test]
    fn test_cpu_and_latency_thresholds() {
        let gen = InsightGenerator::new();
        let cpu = gen.generate(
            "cpu usage for pod x",
            "q",
            &summary(90.0, 88.0, 92.0, Trend::Stable, 1),
        );
        assert!(cpu.iter().any(|i| i.contains("throttling likely")));

        let latency = gen.generate(
            "latency for service y",
            "q",
            &summary(1500.0, 1000.0, 1500.0, Trend::Stable, 1),
        );
        assert!(latency
            .iter()
            .any(|i| i.contains("user experience degraded")));
    }

    #[test]
    fn test_error_rate_thresholds() {
        let gen = InsightGenerator::new();
        let insights = gen.generate(
            "error rate for service z",
            "q",
            &summary(6.0, 1.0, 6.0, Trend::Stable, 1),
        );
        assert!(insights.iter().any(|i| i.contains("Error rate > 5%")));
    }

    #[test]
    fn test_high_variability() {
        let gen = InsightGenerator::new();
        let insights = gen.generate(
            "q",
            "q",
            &summary(100.0, 20.0, 100.0, Trend::Stable, 1),
        );
        assert!(insights
            .iter()
            .any(|i| i.contains("High variability detected: 80.0%")));
    }

    #[test]
    fn test_high_cardinality() {
        let gen = InsightGenerator::new();
        let insights = gen.generate(
            "q",
            "q",
            &summary(1.0, 1.0, 1.0, Trend::Stable, 25),
        );
        assert!(insights
            .iter()
            .any(|i| i.contains("High cardinality: 25 time series returned")));
    }

    #[test]
    fn test_nonzero_query_has_multiple_insights() {
        // Invariant: a successful query always yields a non-empty insight
        // list, and current > 0 adds the value line first.
        let gen = InsightGenerator::new();
        let insights = gen.generate(
            "memory usage",
            "container_memory_usage_bytes",
            &summary(91.0, 50.0, 91.0, Trend::Increasing, 2),
        );
        assert_eq!(insights[0], "Current value: 91.00");
        assert!(insights.len() >= 3);
    }
}
