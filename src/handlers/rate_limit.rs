use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::handlers::client::ClientKey;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub remaining: u32,
    // epoch milliseconds
    pub reset_time: i64,
}

pub async fn rate_limit_handler(
    State(state): State<Arc<AppState>>,
    ClientKey(client): ClientKey,
) -> Json<RateLimitInfo> {
    Json(RateLimitInfo {
        remaining: state.rate_limiter.remaining(&client),
        reset_time: state.rate_limiter.reset_time_ms(&client),
    })
}
