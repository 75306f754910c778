//! Gateway route definitions
//!
//! - /health - liveness probe
//! - /metrics - placeholder metrics endpoint
//! - /api/v1/query - natural-language metrics query
//! - /api/v1/templates - query template catalog
//! - /api/v1/metrics/discover - metric name discovery
//! - /api/v1/query/suggest - related-query suggestions

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, GatewayState};

/// Create all gateway routes.
pub fn gateway_routes(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .route("/api/v1/query", post(handlers::post_query))
        .route("/api/v1/templates", get(handlers::get_templates))
        .route("/api/v1/metrics/discover", get(handlers::discover_metrics))
        .route("/api/v1/query/suggest", post(handlers::suggest_queries))
        .with_state(state)
}
