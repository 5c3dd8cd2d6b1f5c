use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;
use tokio::time::Instant;

// Rate limit entry - tracks requests per client key
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at: Instant,
}

impl RateLimitEntry {
    fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            window_reset_at: now + window,
        }
    }

    // Closed on the reset side: a request exactly at the reset time opens a new window.
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.window_reset_at
    }
}

/// Fixed-window request counter keyed by client.
///
/// An entry whose window has elapsed is treated exactly like a missing one,
/// so a sweep racing with a refresh can never lose a live window.
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn allow(&self, client_key: &str) -> bool {
        self.allow_at(client_key, Instant::now())
    }

    pub fn allow_at(&self, client_key: &str, now: Instant) -> bool {
        // the shard lock is held for the whole read-modify-write
        match self.entries.entry(client_key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(RateLimitEntry::fresh(now, self.window));
                true
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if entry.is_expired(now) {
                    *entry = RateLimitEntry::fresh(now, self.window);
                    return true;
                }
                if entry.count < self.limit {
                    entry.count += 1;
                    return true;
                }
                false
            }
        }
    }

    pub fn remaining(&self, client_key: &str) -> u32 {
        self.remaining_at(client_key, Instant::now())
    }

    pub fn remaining_at(&self, client_key: &str, now: Instant) -> u32 {
        match self.entries.get(client_key) {
            Some(entry) if !entry.is_expired(now) => self.limit.saturating_sub(entry.count),
            _ => self.limit,
        }
    }

    /// End of the client's current window, or `now + window` when it has none.
    pub fn reset_at(&self, client_key: &str) -> Instant {
        self.reset_at_from(client_key, Instant::now())
    }

    pub fn reset_at_from(&self, client_key: &str, now: Instant) -> Instant {
        match self.entries.get(client_key) {
            Some(entry) if !entry.is_expired(now) => entry.window_reset_at,
            _ => now + self.window,
        }
    }

    /// Time until the client's window resets.
    pub fn retry_after(&self, client_key: &str) -> Duration {
        let now = Instant::now();
        self.reset_at_from(client_key, now).saturating_duration_since(now)
    }

    /// Wall-clock reset time in epoch milliseconds, for API responses.
    pub fn reset_time_ms(&self, client_key: &str) -> i64 {
        let remaining = self.retry_after(client_key);
        chrono::Utc::now().timestamp_millis() + remaining.as_millis() as i64
    }

    /// Drops every entry whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        // retain evaluates under the shard write lock, so an entry refreshed
        // by a concurrent allow() is seen with its new window
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(10, WINDOW);
        for _ in 0..10 {
            assert!(limiter.allow("10.0.0.1"));
        }
        assert!(!limiter.allow("10.0.0.1"));
        assert_eq!(limiter.remaining("10.0.0.1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_exactly_at_reset_opens_new_window() {
        let limiter = RateLimiter::new(3, WINDOW);
        let reset = limiter.reset_at("client");
        for _ in 0..3 {
            assert!(limiter.allow("client"));
        }
        assert!(!limiter.allow("client"));

        tokio::time::advance(WINDOW - Duration::from_millis(1)).await;
        assert!(!limiter.allow("client"));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(Instant::now(), reset);
        assert!(limiter.allow("client"));
        assert_eq!(limiter.remaining("client"), 2);
        assert_eq!(limiter.reset_at("client"), reset + WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_requests_do_not_count() {
        let limiter = RateLimiter::new(2, WINDOW);
        let now = Instant::now();
        assert!(limiter.allow_at("c", now));
        assert!(limiter.allow_at("c", now));
        for _ in 0..5 {
            assert!(!limiter.allow_at("c", now));
        }
        assert_eq!(limiter.entries.get("c").unwrap().count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_client_looks_fresh() {
        let limiter = RateLimiter::new(5, WINDOW);
        assert_eq!(limiter.remaining("nobody"), 5);
        assert_eq!(limiter.reset_at("nobody"), Instant::now() + WINDOW);
        assert_eq!(limiter.retry_after("nobody"), WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_independent() {
        let limiter = RateLimiter::new(1, WINDOW);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired_windows() {
        let limiter = RateLimiter::new(5, WINDOW);
        limiter.allow("old");
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.allow("young");
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.remaining("young"), 4);
        assert_eq!(limiter.remaining("old"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_reads_as_absent_before_sweep() {
        let limiter = RateLimiter::new(2, WINDOW);
        limiter.allow("c");
        limiter.allow("c");
        tokio::time::advance(WINDOW).await;
        assert_eq!(limiter.remaining("c"), 2);
        assert_eq!(limiter.reset_at("c"), Instant::now() + WINDOW);
    }

    #[tokio::test]
    async fn test_concurrent_clients_never_exceed_limit() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU32, Ordering};

        let limiter = Arc::new(RateLimiter::new(25, WINDOW));
        let allowed = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            let allowed = Arc::clone(&allowed);
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    if limiter.allow("shared") {
                        allowed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(allowed.load(Ordering::Relaxed), 25);
    }
}
