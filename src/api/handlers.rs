//! Gateway HTTP handlers
//!
//! Translation failures are part of the contract: they come back as
//! `{success: false, error}` with a 200, never as a transport error. Only
//! metric discovery surfaces a 500, matching the upstream behavior callers
//! already handle.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::config::defaults::QUERY_STEP;
use crate::query::{InsightGenerator, MetricsBackend, QueryTranslator, RangeSummary};

/// Shared state for the gateway routes.
#[derive(Clone)]
pub struct GatewayState {
    pub translator: Arc<QueryTranslator>,
    pub backend: Arc<dyn MetricsBackend>,
    pub insights: InsightGenerator,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub time_range: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promql_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<RangeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            promql_query: None,
            data: None,
            insights: None,
            error: Some(error.into()),
        }
    }
}

/// GET /health
pub async fn get_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// GET /metrics — placeholder for scrape-format metrics
pub async fn get_metrics() -> Json<Value> {
    Json(json!({"message": "Metrics endpoint"}))
}

/// POST /api/v1/query — translate, execute, decorate
pub async fn post_query(
    State(state): State<GatewayState>,
    Json(request): Json<QueryRequest>,
) -> Json<QueryResponse> {
    info!(query = %request.query, "Received query");

    let translation = match state.translator.translate(&request.query) {
        Ok(translation) => translation,
        Err(e) => return Json(QueryResponse::failure(e.to_string())),
    };

    let time_range = request
        .time_range
        .unwrap_or_else(|| translation.time_range.clone());
    info!(promql = %translation.promql, %time_range, "Translated to PromQL");

    let data = match state
        .backend
        .query_range(&translation.promql, &time_range, QUERY_STEP)
        .await
    {
        Ok(data) => data,
        Err(e) => return Json(QueryResponse::failure(e.to_string())),
    };

    let insights = state
        .insights
        .generate(&request.query, &translation.promql, &data);

    Json(QueryResponse {
        success: true,
        promql_query: Some(translation.promql),
        data: Some(data),
        insights: Some(insights),
        error: None,
    })
}

/// GET /api/v1/templates
pub async fn get_templates(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "templates": state.translator.list_templates(),
    }))
}

/// GET /api/v1/metrics/discover
pub async fn discover_metrics(State(state): State<GatewayState>) -> Response {
    match state.backend.discover_metrics().await {
        Ok(metrics) => Json(json!({"success": true, "metrics": metrics})).into_response(),
        Err(e) => {
            error!("Metric discovery error: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// POST /api/v1/query/suggest
pub async fn suggest_queries(
    State(state): State<GatewayState>,
    Json(request): Json<QueryRequest>,
) -> Json<Value> {
    Json(json!({
        "success": true,
        "suggestions": state.translator.suggest(&request.query),
    }))
}
