//! Natural-language metrics query pipeline
//!
//! Translator (NL → PromQL) → executor (signed range query) → insight
//! generator. All three are reentrant; the HTTP layer in `api` wires them
//! per request.

pub mod executor;
pub mod insight;
pub mod translator;

pub use executor::{
    calculate_trend, parse_instant_response, parse_range_response, parse_time_range,
    InstantSummary, MetricsBackend, PrometheusClient, QueryError, RangeSummary, SeriesData,
    VectorSample,
};
pub use insight::InsightGenerator;
pub use translator::{QueryTranslator, TemplateInfo, TranslateError, Translation};
