use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::state::AppState;

pub async fn clear_cache_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let dropped = state.cache.len();
    state.cache.clear();
    info!(dropped, "Cache cleared");
    Json(json!({ "message": "Cache cleared successfully" }))
}
