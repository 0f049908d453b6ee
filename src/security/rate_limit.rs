//! Per-source fixed-window rate limiting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// Request count for one source within its current window.
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u64,
    window_start: Instant,
}

/// In-memory per-source rate limiter with fixed-window counters.
///
/// The reset-and-increment for one source happens under that source's map
/// entry lock, so concurrent callers never lose or double-count a request.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    max_requests: u64,
    window: Duration,
    counters: DashMap<String, WindowCounter>,
}

impl RateLimiter {
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                max_requests,
                window,
                counters: DashMap::new(),
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    /// Count one request from `address`; `true` if it is within the ceiling.
    pub fn allow(&self, address: &str) -> bool {
        self.allow_at(address, Instant::now())
    }

    pub(crate) fn allow_at(&self, address: &str, now: Instant) -> bool {
        let mut entry = self
            .inner
            .counters
            .entry(address.to_string())
            .or_insert(WindowCounter {
                count: 0,
                window_start: now,
            });
        let counter = entry.value_mut();

        if now.saturating_duration_since(counter.window_start) > self.inner.window {
            counter.count = 0;
            counter.window_start = now;
        }
        counter.count += 1;

        counter.count <= self.inner.max_requests
    }

    /// Evict counters whose window has already expired.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub(crate) fn purge_expired_at(&self, now: Instant) -> usize {
        let window = self.inner.window;
        let before = self.inner.counters.len();
        self.inner
            .counters
            .retain(|_, c| now.saturating_duration_since(c.window_start) <= window);
        before.saturating_sub(self.inner.counters.len())
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Number of sources currently tracked.
    pub fn tracked(&self) -> usize {
        self.inner.counters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifty_first_request_rejected() {
        let limiter = RateLimiter::new(50, Duration::from_secs(60));
        let now = Instant::now();
        for i in 1..=50 {
            assert!(limiter.allow_at("10.0.0.1", now), "request {} should pass", i);
        }
        assert!(!limiter.allow_at("10.0.0.1", now));
        assert!(!limiter.allow_at("10.0.0.1", now));

        // Other sources are unaffected
        assert!(limiter.allow_at("10.0.0.2", now));
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.allow_at("a", start));
        assert!(limiter.allow_at("a", start));
        assert!(!limiter.allow_at("a", start + Duration::from_secs(30)));

        // Exactly at the window edge the old window still applies
        assert!(!limiter.allow_at("a", start + Duration::from_secs(60)));

        assert!(limiter.allow_at("a", start + Duration::from_secs(61)));
    }

    #[test]
    fn test_concurrent_same_source_counts_exactly() {
        let limiter = RateLimiter::new(50, Duration::from_secs(60));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.allow("198.51.100.1")).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[test]
    fn test_purge_expired() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        let start = Instant::now();
        limiter.allow_at("old", start);
        limiter.allow_at("fresh", start + Duration::from_secs(15));

        let purged = limiter.purge_expired_at(start + Duration::from_secs(20));
        assert_eq!(purged, 1);
        assert_eq!(limiter.tracked(), 1);
    }
}
