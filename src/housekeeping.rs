use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::cache::ResponseCache;
use crate::rate_limit::RateLimiter;

// Periodic sweep of expired rate limit windows and cache entries.
// Runs until the task is aborted at shutdown.
pub async fn sweeper(rate_limiter: Arc<RateLimiter>, cache: Arc<ResponseCache>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // first tick is immediate

    info!("Sweeper started (interval: {:?})", every);

    loop {
        ticker.tick().await;

        let clients = rate_limiter.sweep();
        let entries = cache.sweep();
        if clients > 0 || entries > 0 {
            debug!(clients, entries, "Swept expired rate limit windows and cache entries");
        }
    }
}

pub fn spawn_sweeper(
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(sweeper(rate_limiter, cache, every))
}
