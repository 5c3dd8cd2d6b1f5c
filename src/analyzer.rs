use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::cache::{ResponseCache, fingerprint};
use crate::errors::{ApiError, CAPACITY_RETRY_AFTER_SECS};
use crate::llm_client::{Generation, Generator, build_prompt};
use crate::load_balancer::{GateError, LoadBalancer};
use crate::metrics::MetricsRecorder;
use crate::models::{AnalysisResult, AnalyzeRequest, AnalyzeResponse};
use crate::rate_limit::RateLimiter;
use crate::scoring::{calculate_score, identify_issues};

/// Request orchestrator. Runs the cheap checks first and only reaches the
/// upstream gate on a cache miss:
/// gate health -> rate limit -> validation -> cache -> gate -> cache write.
pub struct Analyzer {
    load_balancer: Arc<LoadBalancer>,
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    metrics: Arc<MetricsRecorder>,
    generator: Arc<dyn Generator>,
}

impl Analyzer {
    pub fn new(
        load_balancer: Arc<LoadBalancer>,
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
        metrics: Arc<MetricsRecorder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            load_balancer,
            rate_limiter,
            cache,
            metrics,
            generator,
        }
    }

    pub async fn analyze(&self, client_key: &str, body: &[u8]) -> Result<AnalyzeResponse, ApiError> {
        let start_time = Instant::now();

        if !self.load_balancer.is_healthy() {
            warn!(client = client_key, "Rejecting request, upstream gate is saturated");
            return Err(ApiError::Capacity {
                retry_after_secs: CAPACITY_RETRY_AFTER_SECS,
            });
        }

        if !self.rate_limiter.allow(client_key) {
            let retry_after = self.rate_limiter.retry_after(client_key);
            // round up, and never tell a client to retry after 0 seconds
            let retry_after_secs = retry_after.as_millis().div_ceil(1000).max(1) as u64;
            warn!(client = client_key, retry_after_secs, "Rate limit exceeded");
            return Err(ApiError::RateLimited { retry_after_secs });
        }

        let request = AnalyzeRequest::from_json(body).map_err(ApiError::Validation)?;

        let cache_key = fingerprint(&request.subject, request.industry);
        if let Some(cached) = self.cache.get(&cache_key) {
            debug!(industry = %request.industry, "Cache HIT");
            self.metrics.record(start_time.elapsed(), true, false);
            return Ok(AnalyzeResponse::new(request.subject, cached));
        }
        debug!(industry = %request.industry, "Cache MISS");

        match self.compute(&request).await {
            Ok(result) => {
                self.cache.set(cache_key, result.clone());
                self.metrics.record(start_time.elapsed(), false, false);
                Ok(AnalyzeResponse::new(request.subject, result))
            }
            Err(err) => {
                self.metrics.record(start_time.elapsed(), false, true);
                Err(err.into())
            }
        }
    }

    async fn compute(&self, request: &AnalyzeRequest) -> Result<AnalysisResult, GateError> {
        let prompt = build_prompt(&request.subject, request.industry);
        let reply = self
            .load_balancer
            .submit(|| self.generator.generate(&prompt))
            .await?;

        let generation = Generation::parse_or_fallback(&reply, &request.subject);
        Ok(AnalysisResult {
            score: calculate_score(&request.subject, request.industry),
            issues: identify_issues(&request.subject, request.industry),
            suggestions: generation.suggestions,
            ai_insights: generation.insight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::llm_client::UpstreamError;
    use crate::load_balancer::LoadBalancerConfig;
    use crate::test_support::StubGenerator;
    use std::time::Duration;

    struct Fixture {
        analyzer: Analyzer,
        generator: Arc<StubGenerator>,
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
        metrics: Arc<MetricsRecorder>,
    }

    fn fixture(generator: StubGenerator, limit: u32, max_concurrent: usize) -> Fixture {
        let generator = Arc::new(generator);
        let rate_limiter = Arc::new(RateLimiter::new(limit, Duration::from_secs(60)));
        let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
        let metrics = Arc::new(MetricsRecorder::new(100).unwrap());
        let load_balancer = Arc::new(LoadBalancer::new(LoadBalancerConfig {
            max_concurrent,
            request_timeout: Duration::from_secs(1),
            retry_attempts: 2,
            backoff_multiplier: 1.5,
            backoff_base: Duration::from_millis(10),
        }));
        let analyzer = Analyzer::new(
            load_balancer,
            Arc::clone(&rate_limiter),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            generator.clone(),
        );
        Fixture { analyzer, generator, rate_limiter, cache, metrics }
    }

    const BODY: &[u8] = br#"{"subject":"Your spring collection is here","industry":"retail"}"#;

    #[tokio::test]
    async fn test_miss_then_hit_calls_upstream_once() {
        let f = fixture(StubGenerator::valid(), 10, 5);

        let first = f.analyzer.analyze("c", BODY).await.unwrap();
        let second = f.analyzer.analyze("c", BODY).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.generator.calls(), 1);
        assert_eq!(first.suggestions, StubGenerator::valid_suggestions());
        let snapshot = f.metrics.snapshot();
        assert_eq!((snapshot.cache_hits, snapshot.cache_misses), (1, 1));
    }

    #[tokio::test]
    async fn test_cached_response_echoes_literal_subject() {
        let f = fixture(StubGenerator::valid(), 10, 5);
        f.analyzer.analyze("c", br#"{"subject":"Hello World","industry":"retail"}"#).await.unwrap();

        let again = f
            .analyzer
            .analyze("c", br#"{"subject":"  hello world  ","industry":"retail"}"#)
            .await
            .unwrap();
        assert_eq!(again.original, "  hello world  ");
        assert_eq!(f.generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_generation_falls_back() {
        let f = fixture(StubGenerator::replying("I think these are great ideas!"), 10, 5);
        let response = f.analyzer.analyze("c", BODY).await.unwrap();
        assert_eq!(
            response.suggestions,
            Generation::fallback("Your spring collection is here").suggestions
        );
    }

    #[tokio::test]
    async fn test_rate_limit_checked_before_validation() {
        let f = fixture(StubGenerator::valid(), 1, 5);
        let err = f.analyzer.analyze("c", b"not json").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = f.analyzer.analyze("c", BODY).await.unwrap_err();
        match err {
            ApiError::RateLimited { retry_after_secs } => assert!(retry_after_secs > 0),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_saturated_gate_rejects_before_rate_limiter() {
        let f = fixture(StubGenerator::hanging(), 10, 1);
        let analyzer = Arc::new(f.analyzer);

        let busy = {
            let analyzer = Arc::clone(&analyzer);
            tokio::spawn(async move { analyzer.analyze("first", BODY).await })
        };
        while f.generator.calls() == 0 {
            tokio::task::yield_now().await;
        }

        let err = analyzer.analyze("second", BODY).await.unwrap_err();
        assert!(matches!(err, ApiError::Capacity { retry_after_secs: 5 }));
        assert_eq!(f.rate_limiter.remaining("second"), 10);

        busy.abort();
    }

    #[tokio::test]
    async fn test_upstream_failure_is_recorded_and_not_cached() {
        let f = fixture(
            StubGenerator::failing(UpstreamError::Api { status: 401, message: "bad key".into() }),
            10,
            5,
        );
        let err = f.analyzer.analyze("c", BODY).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(f.generator.calls(), 1);
        assert_eq!(f.cache.len(), 0);
        assert_eq!(f.metrics.snapshot().error_count, 1);
    }
}
