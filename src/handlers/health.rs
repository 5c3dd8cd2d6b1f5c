use axum::Json;
use serde_json::{Value, json};

// liveness only; load and error health live under /api/performance
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
