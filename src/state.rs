use std::sync::Arc;

use crate::analyzer::Analyzer;
use crate::cache::ResponseCache;
use crate::llm_client::Generator;
use crate::load_balancer::LoadBalancer;
use crate::metrics::MetricsRecorder;
use crate::rate_limit::RateLimiter;

// app's shared state. Each component is built once at startup and owned
// here; the analyzer holds handles to the same instances.
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: Arc<ResponseCache>,
    pub metrics: Arc<MetricsRecorder>,
    pub load_balancer: Arc<LoadBalancer>,
    pub analyzer: Analyzer,
}

impl AppState {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
        metrics: Arc<MetricsRecorder>,
        load_balancer: Arc<LoadBalancer>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let analyzer = Analyzer::new(
            Arc::clone(&load_balancer),
            Arc::clone(&rate_limiter),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            generator,
        );
        Self {
            rate_limiter,
            cache,
            metrics,
            load_balancer,
            analyzer,
        }
    }
}
