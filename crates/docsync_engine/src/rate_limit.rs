use std::time::Duration;

use engine_logging::engine_trace;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Slowest accepted refill rate: one request every 1000 seconds.
pub const MIN_RATE_PER_SECOND: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSettings {
    /// Bucket size: how many requests may be issued back to back.
    pub capacity: u32,
    /// Steady-state refill rate in tokens per second.
    pub per_second: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: 3,
            per_second: 1.0,
        }
    }
}

/// Token bucket gating outbound requests.
///
/// Waiters queue on a fair mutex and the holder sleeps while holding it, so
/// callers are admitted strictly in arrival order. Time comes from the tokio
/// monotonic clock.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    per_second: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl RateLimiter {
    /// Creates a full bucket. A rate below [`MIN_RATE_PER_SECOND`] (or NaN) is
    /// raised to it and a zero capacity is treated as one.
    pub fn new(settings: RateLimitSettings) -> Self {
        let per_second = if settings.per_second.is_nan() {
            MIN_RATE_PER_SECOND
        } else {
            settings.per_second.clamp(MIN_RATE_PER_SECOND, f64::MAX)
        };
        let capacity = f64::from(settings.capacity.max(1));
        Self {
            capacity,
            per_second,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Waits until a token is available and consumes it.
    pub async fn acquire(&self) {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens < 1.0 {
            let deficit = 1.0 - bucket.tokens;
            let wait = Duration::from_secs_f64(deficit / self.per_second);
            engine_trace!("Rate limiter waiting {:?}", wait);
            sleep_until(bucket.refilled_at + wait).await;
            self.refill(&mut bucket);
        }
        // Float rounding can leave the bucket a hair short of one token after the wait.
        bucket.tokens = (bucket.tokens - 1.0).max(0.0);
    }

    /// Tokens currently available, after refilling.
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        bucket.tokens
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.refilled_at);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.per_second).min(self.capacity);
        bucket.refilled_at = now;
    }
}
