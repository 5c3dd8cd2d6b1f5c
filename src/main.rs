mod analyzer;
mod cache;
mod config;
mod errors;
mod handlers;
mod housekeeping;
mod llm_client;
mod load_balancer;
mod metrics;
mod models;
mod rate_limit;
mod routes;
mod scoring;
mod state;
#[cfg(test)]
mod test_support;

use axum::response::{IntoResponse, Response};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cache::ResponseCache;
use crate::config::Args;
use crate::errors::ApiError;
use crate::housekeeping::spawn_sweeper;
use crate::llm_client::OpenAiGenerator;
use crate::load_balancer::LoadBalancer;
use crate::metrics::MetricsRecorder;
use crate::rate_limit::RateLimiter;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::load();

    let level = args.default_log_level();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("{}={level},tower_http={level}", env!("CARGO_CRATE_NAME")).into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    args.validate()?;

    if args.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY is not set, upstream calls will be rejected");
    }

    let rate_limiter = Arc::new(RateLimiter::new(args.rate_limit_requests, args.rate_limit_window()));
    let cache = Arc::new(ResponseCache::new(args.cache_config()));
    let metrics = Arc::new(MetricsRecorder::new(args.latency_window)?);
    let load_balancer = Arc::new(LoadBalancer::new(args.load_balancer_config()));
    let generator = Arc::new(OpenAiGenerator::new(
        &args.openai_base_url,
        args.openai_api_key.clone(),
        args.openai_model.clone(),
    )?);

    let state = Arc::new(AppState::new(
        Arc::clone(&rate_limiter),
        Arc::clone(&cache),
        metrics,
        load_balancer,
        generator,
    ));

    let sweeper = spawn_sweeper(rate_limiter, cache, args.sweep_interval());

    let app = routes::build_router(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(args.cors_layer()?);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Subject line gateway listening on {}", addr);
    info!("Environment: {}", args.environment);
    info!("Upstream model {} at {}", args.openai_model, args.openai_base_url);
    info!(
        "Rate limit: {} requests per {} ms",
        args.rate_limit_requests, args.rate_limit_window_ms
    );
    info!(
        "Upstream gate: {} concurrent, {} retries, {} ms timeout",
        args.max_concurrent, args.retry_attempts, args.request_timeout_ms
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

// A panicking handler becomes a generic 500, the process keeps serving.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
