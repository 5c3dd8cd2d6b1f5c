use axum::{Json, body::Bytes, extract::State};
use std::sync::Arc;

use crate::errors::ApiError;
use crate::handlers::client::ClientKey;
use crate::models::AnalyzeResponse;
use crate::state::AppState;

// The body is taken raw: validation runs after the capacity and rate limit
// checks, inside the analyzer.
pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    ClientKey(client): ClientKey,
    body: Bytes,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    state.analyzer.analyze(&client, &body).await.map(Json)
}
