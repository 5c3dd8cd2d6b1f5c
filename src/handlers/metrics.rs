use axum::{
    Json,
    extract::State,
    http::header,
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::cache::CacheStats;
use crate::errors::ApiError;
use crate::load_balancer::LoadBalancerStatus;
use crate::metrics::{HealthStatus, MetricsSnapshot};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub metrics: MetricsSnapshot,
    pub cache: CacheStats,
    pub load_balancer: LoadBalancerStatus,
    pub health: HealthStatus,
}

pub async fn performance_handler(State(state): State<Arc<AppState>>) -> Json<PerformanceReport> {
    Json(PerformanceReport {
        metrics: state.metrics.snapshot(),
        cache: state.cache.stats(),
        load_balancer: state.load_balancer.status(),
        health: state.metrics.health_status(),
    })
}

pub async fn reset_performance_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.metrics.reset();
    Json(json!({ "message": "Performance metrics reset" }))
}

// Prometheus text exposition
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .metrics
        .render(state.cache.len(), state.load_balancer.active_requests())
        .map_err(|e| ApiError::Internal(format!("metrics encoding failed: {e}")))?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}
