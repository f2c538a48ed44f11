//! Per-key token bucket limiter for the publish endpoint.

use std::time::Instant;

use dashmap::DashMap;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token buckets keyed by caller (the authenticated publisher name).
///
/// A `burst` of zero disables limiting.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    burst: f64,
    per_sec: f64,
}

impl RateLimiter {
    pub fn new(burst: u32, per_sec: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            burst: f64::from(burst),
            per_sec: f64::from(per_sec),
        }
    }

    /// Take one token for `key`. Returns `false` when the bucket is empty.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        if self.burst <= 0.0 {
            return true;
        }

        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.burst,
                last_refill: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.per_sec).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }
}
