// Rate Limiter
// Token-bucket admission control, one bucket per caller identity

use crate::models::RateLimitStatus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Token bucket with continuous refill.
///
/// Refill is computed lazily from elapsed time on every access, so no
/// background task is needed to keep balances current.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Attempt to consume `cost` tokens. Balances never go negative:
    /// an insufficient bucket is left unchanged.
    fn consume(&mut self, cost: f64, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= cost {
            self.tokens -= cost;
            return true;
        }
        false
    }

    /// Seconds until `cost` tokens will be available.
    fn secs_until(&self, cost: f64) -> u64 {
        let deficit = cost - self.tokens;
        if deficit <= 0.0 || self.refill_rate <= 0.0 {
            return 0;
        }
        (deficit / self.refill_rate).ceil() as u64
    }
}

/// Per-caller admission control.
///
/// Buckets are created lazily on first request and purged by `sweep` after
/// a period of inactivity. The outer map lock is held only for handle
/// lookup; refill and consume run under the per-caller lock.
pub struct RateLimiter {
    capacity: f64,
    refill_rate: f64,
    idle_horizon: Duration,
    buckets: Mutex<HashMap<String, Arc<Mutex<TokenBucket>>>>,
}

impl RateLimiter {
    /// Capacity is `requests_per_window + burst`; refill runs continuously
    /// at `requests_per_window / window_secs` tokens per second.
    pub fn new(requests_per_window: u32, window_secs: u64, burst: u32, idle_secs: u64) -> Self {
        let capacity = (requests_per_window + burst) as f64;
        let refill_rate = requests_per_window as f64 / window_secs.max(1) as f64;
        Self {
            capacity,
            refill_rate,
            idle_horizon: Duration::from_secs(idle_secs),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn bucket_for(&self, caller_id: &str) -> Arc<Mutex<TokenBucket>> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets
            .entry(caller_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(self.capacity, self.refill_rate))))
            .clone()
    }

    /// Admit or reject one request from `caller_id`. Rejection is
    /// synchronous and leaves the bucket untouched; callers retry later.
    pub fn admit(&self, caller_id: &str, cost: u32) -> bool {
        let bucket = self.bucket_for(caller_id);
        let mut bucket = bucket.lock().unwrap_or_else(|e| e.into_inner());
        let admitted = bucket.consume(cost as f64, Instant::now());
        if !admitted {
            debug!(
                "[RATE_LIMITER] denied caller={} tokens={:.2}",
                caller_id, bucket.tokens
            );
        }
        admitted
    }

    /// Seconds until `cost` tokens are available for `caller_id`.
    pub fn retry_after_secs(&self, caller_id: &str, cost: u32) -> u64 {
        let bucket = self.bucket_for(caller_id);
        let mut bucket = bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.refill(Instant::now());
        bucket.secs_until(cost as f64)
    }

    /// Remaining budget for `caller_id`, for transport-level headers.
    pub fn status(&self, caller_id: &str) -> RateLimitStatus {
        let bucket = self.bucket_for(caller_id);
        let mut bucket = bucket.lock().unwrap_or_else(|e| e.into_inner());
        bucket.refill(Instant::now());
        RateLimitStatus {
            limit: self.capacity as u32,
            remaining: bucket.tokens as u32,
            reset_after_secs: bucket.secs_until(bucket.capacity),
        }
    }

    /// Purge buckets idle beyond the configured horizon to bound memory.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            let bucket = bucket.lock().unwrap_or_else(|e| e.into_inner());
            now.duration_since(bucket.last_refill) <= self.idle_horizon
        });
        let removed = before - buckets.len();
        if removed > 0 {
            info!("[RATE_LIMITER] sweep removed {} idle buckets", removed);
        }
    }

    /// Run `sweep` periodically until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                limiter.sweep();
            }
        })
    }

    /// Drop all buckets (shutdown).
    pub fn clear(&self) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_up_to_capacity_then_denied() {
        // Capacity 5, negligible refill inside the test window
        let limiter = RateLimiter::new(5, 3600, 0, 300);
        for _ in 0..5 {
            assert!(limiter.admit("client-a", 1));
        }
        assert!(!limiter.admit("client-a", 1));
        // Another caller has its own budget
        assert!(limiter.admit("client-b", 1));
    }

    #[test]
    fn test_tokens_never_negative() {
        let limiter = RateLimiter::new(2, 3600, 0, 300);
        assert!(limiter.admit("c", 1));
        assert!(limiter.admit("c", 1));
        assert!(!limiter.admit("c", 1));
        assert!(!limiter.admit("c", 5));
        let status = limiter.status("c");
        assert_eq!(status.remaining, 0);
    }

    #[test]
    fn test_refill_over_elapsed_time() {
        let limiter = RateLimiter::new(60, 60, 0, 300);
        // Drain the bucket
        for _ in 0..60 {
            assert!(limiter.admit("c", 1));
        }
        assert!(!limiter.admit("c", 1));

        // Pretend two seconds passed: 1 token/sec refill rate
        {
            let bucket = limiter.bucket_for("c");
            let mut bucket = bucket.lock().unwrap();
            bucket.last_refill = Instant::now() - Duration::from_secs(2);
        }
        assert!(limiter.admit("c", 1));
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let limiter = RateLimiter::new(10, 60, 5, 300);
        limiter.admit("c", 2);
        {
            let bucket = limiter.bucket_for("c");
            let mut bucket = bucket.lock().unwrap();
            // One minute of refill at 10/min would overshoot the capacity
            bucket.last_refill = Instant::now() - Duration::from_secs(60);
        }
        let status = limiter.status("c");
        assert_eq!(status.limit, 15);
        assert_eq!(status.remaining, 15);
    }

    #[test]
    fn test_retry_after_reports_deficit() {
        let limiter = RateLimiter::new(60, 60, 0, 300);
        for _ in 0..60 {
            limiter.admit("c", 1);
        }
        // 1 token/sec: one token is at most a second away
        assert!(limiter.retry_after_secs("c", 1) <= 1);
        assert!(limiter.retry_after_secs("c", 10) >= 9);
    }

    #[test]
    fn test_sweep_purges_idle_buckets() {
        let limiter = RateLimiter::new(5, 60, 0, 10);
        limiter.admit("idle", 1);
        limiter.admit("active", 1);
        {
            let bucket = limiter.bucket_for("idle");
            let mut bucket = bucket.lock().unwrap();
            bucket.last_refill = Instant::now() - Duration::from_secs(60);
        }
        limiter.sweep();
        let buckets = limiter.buckets.lock().unwrap();
        assert!(!buckets.contains_key("idle"));
        assert!(buckets.contains_key("active"));
    }
}
