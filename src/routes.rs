use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::handlers::{
    analyze_handler, clear_cache_handler, health_handler, metrics_handler, performance_handler,
    rate_limit_handler, reset_performance_handler,
};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/analyze-subject", post(analyze_handler))
        .route("/api/rate-limit", get(rate_limit_handler))
        .route("/api/performance", get(performance_handler))
        .route("/api/performance/reset", post(reset_performance_handler))
        .route("/api/cache/clear", post(clear_cache_handler))
        .with_state(state)
}
