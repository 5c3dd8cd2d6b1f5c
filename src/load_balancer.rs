use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::llm_client::UpstreamError;

#[derive(Debug, Clone)]
pub struct LoadBalancerConfig {
    pub max_concurrent: usize,
    // Deadline for a single attempt
    pub request_timeout: Duration,
    // Extra attempts after the first one
    pub retry_attempts: u32,
    pub backoff_multiplier: f64,
    pub backoff_base: Duration,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            request_timeout: Duration::from_secs(30),
            retry_attempts: 2,
            backoff_multiplier: 1.5,
            backoff_base: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Service is at capacity. Please try again in a moment.")]
    AtCapacity,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerStatus {
    pub active_requests: usize,
    pub max_concurrent: usize,
    // Percentage of slots in use
    pub utilization: f64,
    pub is_healthy: bool,
}

// Slot held by an admitted call. Dropping it releases the slot, so every exit
// path (success, error, timeout, or the caller's future being dropped)
// decrements exactly once.
struct Permit<'a> {
    active: &'a AtomicUsize,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Admission gate for upstream calls: fail-fast concurrency bound plus
/// timeout and exponential backoff retry around each admitted call.
pub struct LoadBalancer {
    config: LoadBalancerConfig,
    active: AtomicUsize,
}

impl LoadBalancer {
    pub fn new(config: LoadBalancerConfig) -> Self {
        Self {
            config,
            active: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &LoadBalancerConfig {
        &self.config
    }

    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_healthy(&self) -> bool {
        self.active_requests() < self.config.max_concurrent
    }

    pub fn status(&self) -> LoadBalancerStatus {
        let active_requests = self.active_requests();
        LoadBalancerStatus {
            active_requests,
            max_concurrent: self.config.max_concurrent,
            utilization: active_requests as f64 / self.config.max_concurrent as f64 * 100.0,
            is_healthy: active_requests < self.config.max_concurrent,
        }
    }

    // Takes a slot if one is free. The check and the increment are one CAS,
    // so concurrent callers can never push the count past the maximum.
    fn try_admit(&self) -> Option<Permit<'_>> {
        let max = self.config.max_concurrent;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| Permit { active: &self.active })
    }

    /// Delay before retry number `attempt` (1-based): `multiplier^attempt * base`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.config.backoff_multiplier.powi(attempt as i32);
        Duration::try_from_secs_f64(self.config.backoff_base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }

    /// Runs `task` under the gate. `task` is invoked once per attempt; each
    /// invocation must start a fresh upstream call.
    pub async fn submit<T, F, Fut>(&self, task: F) -> Result<T, GateError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let Some(_permit) = self.try_admit() else {
            warn!(
                max_concurrent = self.config.max_concurrent,
                "Upstream gate at capacity, rejecting call"
            );
            return Err(GateError::AtCapacity);
        };

        self.execute_with_retry(task).await.map_err(GateError::Upstream)
    }

    async fn execute_with_retry<T, F, Fut>(&self, mut task: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                let delay = self.backoff_delay(attempt);
                info!(attempt, delay_ms = delay.as_millis() as u64, "Retrying upstream call after backoff");
                sleep(delay).await;
            }

            // a timed-out call is dropped here, which cancels it; its late
            // result can never reach a later attempt
            let outcome = match timeout(self.config.request_timeout, task()).await {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Timeout(self.config.request_timeout)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => {
                    warn!(attempt, error = %err, "Non-retryable upstream failure");
                    return Err(err);
                }
                Err(err) if attempt >= self.config.retry_attempts => {
                    warn!(attempts = attempt + 1, error = %err, "Upstream retries exhausted");
                    return Err(err);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "Upstream call failed");
                    attempt += 1;
                }
            }
        }
    }
}
