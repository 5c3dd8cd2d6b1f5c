use chrono::{DateTime, Utc};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

// Health thresholds: error rate in percent, latency in milliseconds
const DEGRADED_ERROR_RATE: f64 = 5.0;
const CRITICAL_ERROR_RATE: f64 = 10.0;
const DEGRADED_LATENCY_MS: f64 = 3000.0;
const CRITICAL_LATENCY_MS: f64 = 5000.0;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn classify(error_rate: f64, average_response_ms: f64) -> Self {
        if error_rate > CRITICAL_ERROR_RATE || average_response_ms > CRITICAL_LATENCY_MS {
            HealthStatus::Critical
        } else if error_rate > DEGRADED_ERROR_RATE || average_response_ms > DEGRADED_LATENCY_MS {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub request_count: u64,
    pub error_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    // Milliseconds, averaged over the rolling window
    pub average_response_time: f64,
    // Percentages
    pub error_rate: f64,
    pub cache_hit_rate: f64,
    pub last_reset: DateTime<Utc>,
}

#[derive(Debug)]
struct Counters {
    request_count: u64,
    error_count: u64,
    cache_hits: u64,
    cache_misses: u64,
    latencies: VecDeque<Duration>,
    last_reset: DateTime<Utc>,
}

impl Counters {
    fn new(window: usize) -> Self {
        Self {
            request_count: 0,
            error_count: 0,
            cache_hits: 0,
            cache_misses: 0,
            latencies: VecDeque::with_capacity(window),
            last_reset: Utc::now(),
        }
    }
}

// Prometheus view of the same events, exported on /metrics
struct Exported {
    requests: IntCounter,
    errors: IntCounter,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    latency: Histogram,
    cache_size: IntGauge,
    active_upstream: IntGauge,
}

/// Request counters plus a bounded window of recent latencies. Rates and the
/// average are derived on snapshot.
pub struct MetricsRecorder {
    counters: Mutex<Counters>,
    window: usize,
    registry: Registry,
    exported: Exported,
}

impl MetricsRecorder {
    pub fn new(window: usize) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let exported = Exported {
            requests: IntCounter::new("subject_gateway_requests_total", "Total number of analysis requests")?,
            errors: IntCounter::new("subject_gateway_errors_total", "Total failed analysis requests")?,
            cache_hits: IntCounter::new("subject_gateway_cache_hits_total", "Total cache hits")?,
            cache_misses: IntCounter::new("subject_gateway_cache_misses_total", "Total cache misses")?,
            latency: Histogram::with_opts(HistogramOpts::new(
                "subject_gateway_request_latency_seconds",
                "Analysis request latency in seconds",
            ))?,
            cache_size: IntGauge::new("subject_gateway_cache_size", "Current number of items in cache")?,
            active_upstream: IntGauge::new(
                "subject_gateway_active_upstream_requests",
                "Upstream calls currently in flight",
            )?,
        };
        registry.register(Box::new(exported.requests.clone()))?;
        registry.register(Box::new(exported.errors.clone()))?;
        registry.register(Box::new(exported.cache_hits.clone()))?;
        registry.register(Box::new(exported.cache_misses.clone()))?;
        registry.register(Box::new(exported.latency.clone()))?;
        registry.register(Box::new(exported.cache_size.clone()))?;
        registry.register(Box::new(exported.active_upstream.clone()))?;

        Ok(Self {
            counters: Mutex::new(Counters::new(window)),
            window: window.max(1),
            registry,
            exported,
        })
    }

    pub fn record(&self, latency: Duration, from_cache: bool, is_error: bool) {
        {
            let mut c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
            c.request_count += 1;
            if is_error {
                c.error_count += 1;
            }
            if from_cache {
                c.cache_hits += 1;
            } else {
                c.cache_misses += 1;
            }
            c.latencies.push_back(latency);
            while c.latencies.len() > self.window {
                c.latencies.pop_front();
            }
        }

        self.exported.requests.inc();
        if is_error {
            self.exported.errors.inc();
        }
        if from_cache {
            self.exported.cache_hits.inc();
        } else {
            self.exported.cache_misses.inc();
        }
        self.exported.latency.observe(latency.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = self.counters.lock().unwrap_or_else(|e| e.into_inner());

        let average_response_time = if c.latencies.is_empty() {
            0.0
        } else {
            let total_ms: f64 = c.latencies.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
            total_ms / c.latencies.len() as f64
        };
        let error_rate = percentage(c.error_count, c.request_count);
        let cache_hit_rate = percentage(c.cache_hits, c.cache_hits + c.cache_misses);

        MetricsSnapshot {
            request_count: c.request_count,
            error_count: c.error_count,
            cache_hits: c.cache_hits,
            cache_misses: c.cache_misses,
            average_response_time,
            error_rate,
            cache_hit_rate,
            last_reset: c.last_reset,
        }
    }

    /// Operator reset of the rolling counters. Prometheus counters stay
    /// monotonic.
    pub fn reset(&self) {
        let mut c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        *c = Counters::new(self.window);
    }

    pub fn health_status(&self) -> HealthStatus {
        let snapshot = self.snapshot();
        HealthStatus::classify(snapshot.error_rate, snapshot.average_response_time)
    }

    /// Renders the Prometheus text format. Gauges owned by other components
    /// are passed in and set just before encoding.
    pub fn render(&self, cache_size: usize, active_upstream: usize) -> Result<String, prometheus::Error> {
        self.exported.cache_size.set(cache_size as i64);
        self.exported.active_upstream.set(active_upstream as i64);

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_empty_snapshot() {
        let metrics = MetricsRecorder::new(10).unwrap();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.request_count, 0);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.cache_hit_rate, 0.0);
        assert_eq!(snapshot.average_response_time, 0.0);
        assert_eq!(metrics.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_rates_are_derived_from_counters() {
        let metrics = MetricsRecorder::new(10).unwrap();
        metrics.record(ms(100), true, false);
        metrics.record(ms(300), false, false);
        metrics.record(ms(200), false, false);
        metrics.record(ms(400), false, true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.request_count, 4);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 3);
        assert!((snapshot.error_rate - 25.0).abs() < 1e-9);
        assert!((snapshot.cache_hit_rate - 25.0).abs() < 1e-9);
        assert!((snapshot.average_response_time - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_latency_window_drops_oldest() {
        let metrics = MetricsRecorder::new(2).unwrap();
        metrics.record(ms(10_000), false, false);
        metrics.record(ms(100), false, false);
        metrics.record(ms(300), false, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.request_count, 3);
        assert!((snapshot.average_response_time - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_health_thresholds() {
        assert_eq!(HealthStatus::classify(5.0, 3000.0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::classify(5.1, 0.0), HealthStatus::Degraded);
        assert_eq!(HealthStatus::classify(0.0, 3001.0), HealthStatus::Degraded);
        assert_eq!(HealthStatus::classify(10.1, 0.0), HealthStatus::Critical);
        assert_eq!(HealthStatus::classify(0.0, 5001.0), HealthStatus::Critical);
    }

    #[test]
    fn test_reset_clears_counters() {
        let metrics = MetricsRecorder::new(10).unwrap();
        metrics.record(ms(50), false, true);
        assert_eq!(metrics.health_status(), HealthStatus::Critical);

        metrics.reset();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.request_count, 0);
        assert_eq!(snapshot.error_count, 0);
        assert_eq!(metrics.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_render_exports_counters_and_gauges() {
        let metrics = MetricsRecorder::new(10).unwrap();
        metrics.record(ms(20), true, false);
        let text = metrics.render(7, 2).unwrap();
        assert!(text.contains("subject_gateway_requests_total 1"));
        assert!(text.contains("subject_gateway_cache_hits_total 1"));
        assert!(text.contains("subject_gateway_cache_size 7"));
        assert!(text.contains("subject_gateway_active_upstream_requests 2"));
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let metrics = MetricsRecorder::new(10).unwrap();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert!(json.get("requestCount").is_some());
        assert!(json.get("averageResponseTime").is_some());
        assert!(json.get("lastReset").is_some());
    }
}
