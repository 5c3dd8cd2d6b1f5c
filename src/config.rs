use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::Parser;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::cache::CacheConfig;
use crate::load_balancer::LoadBalancerConfig;

// CLI argument structure. Every flag can also come from the environment
// (or a .env file loaded before parsing).
#[derive(Parser, Debug, Clone)]
#[command(name = "subject-line-gateway")]
#[command(about = "Email subject line analysis API with rate limiting, caching and upstream admission control")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    // Environment name ("production" lowers the default log level to warn)
    #[arg(long, env = "APP_ENV", default_value = "development")]
    pub environment: String,

    // API key for the text generation service
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    pub openai_api_key: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-3.5-turbo")]
    pub openai_model: String,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT_REQUESTS", default_value_t = 10)]
    pub rate_limit_requests: u32,

    // Rate limit window in milliseconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_MS", default_value_t = 60_000)]
    pub rate_limit_window_ms: u64,

    // "*" for any origin, otherwise a comma-separated list
    #[arg(long, env = "CORS_ORIGIN", default_value = "*")]
    pub cors_origin: String,

    // Cache TTL in seconds
    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 300)]
    pub cache_ttl_secs: u64,

    #[arg(long, env = "CACHE_MAX_ENTRIES", default_value_t = 1000)]
    pub cache_max_entries: usize,

    // Max upstream calls in flight
    #[arg(long, env = "MAX_CONCURRENT", default_value_t = 5)]
    pub max_concurrent: usize,

    // Per-attempt upstream timeout
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 30_000)]
    pub request_timeout_ms: u64,

    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 2)]
    pub retry_attempts: u32,

    #[arg(long, env = "BACKOFF_MULTIPLIER", default_value_t = 1.5)]
    pub backoff_multiplier: f64,

    #[arg(long, env = "BACKOFF_BASE_MS", default_value_t = 1000)]
    pub backoff_base_ms: u64,

    // Interval for cache and rate limiter sweeps
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    // Number of latency samples kept for the rolling average
    #[arg(long, env = "LATENCY_WINDOW", default_value_t = 1000)]
    pub latency_window: usize,
}

impl Args {
    /// Loads `.env` (if present) and then parses flags and environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok(); // missing .env is fine
        Self::parse()
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn default_log_level(&self) -> &'static str {
        if self.is_production() { "warn" } else { "info" }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.cache_max_entries,
            default_ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }

    pub fn load_balancer_config(&self) -> LoadBalancerConfig {
        LoadBalancerConfig {
            max_concurrent: self.max_concurrent,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            retry_attempts: self.retry_attempts,
            backoff_multiplier: self.backoff_multiplier,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }

    /// Checks values clap cannot express as types.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.rate_limit_requests > 0, "RATE_LIMIT_REQUESTS must be at least 1");
        anyhow::ensure!(self.rate_limit_window_ms > 0, "RATE_LIMIT_WINDOW_MS must be positive");
        anyhow::ensure!(self.cache_max_entries > 0, "CACHE_MAX_ENTRIES must be at least 1");
        anyhow::ensure!(self.max_concurrent > 0, "MAX_CONCURRENT must be at least 1");
        anyhow::ensure!(self.latency_window > 0, "LATENCY_WINDOW must be at least 1");
        anyhow::ensure!(
            self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0,
            "BACKOFF_MULTIPLIER must be a finite number >= 1.0"
        );
        self.cors_layer().map(|_| ())
    }

    pub fn cors_layer(&self) -> Result<CorsLayer> {
        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        let origin = self.cors_origin.trim();
        if origin == "*" || origin.eq_ignore_ascii_case("true") {
            return Ok(layer.allow_origin(Any));
        }

        let origins = origin
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .with_context(|| format!("CORS_ORIGIN entry '{s}' is not a valid header value"))
            })
            .collect::<Result<Vec<_>>>()?;
        anyhow::ensure!(!origins.is_empty(), "CORS_ORIGIN must be '*' or at least one origin");

        Ok(layer.allow_origin(AllowOrigin::list(origins)))
    }
}
