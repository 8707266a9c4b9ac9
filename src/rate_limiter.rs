//! Per-source request rate limiting using a token bucket
//!
//! Every request against a source (listing page or payload download) takes one
//! token from that source's bucket. Tokens refill continuously at the source's
//! sustained rate up to its burst size. The bucket is shared by every collector
//! and worker touching the source, so the published rate holds regardless of
//! how many workers are draining its items.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::RateLimit;

/// Tokens are tracked in thousandths so slow rates (e.g. 50 per hour) refill smoothly
const MILLI: u64 = 1_000;

/// Token bucket shared across all tasks talking to one source
///
/// Cloning is cheap; clones share the same bucket.
///
/// # Implementation
///
/// Uses AtomicU64 for lock-free token tracking:
/// - `tokens`: available milli-tokens
/// - `last_refill`: timestamp of last refill (nanoseconds since an arbitrary epoch)
#[derive(Clone, Debug)]
pub struct RateLimiter {
    /// Sustained rate in milli-tokens per second (0 = unlimited)
    rate_milli_per_sec: u64,
    /// Bucket capacity in milli-tokens
    capacity: u64,
    /// Available milli-tokens
    tokens: Arc<AtomicU64>,
    /// Last refill timestamp (nanoseconds since arbitrary epoch)
    last_refill: Arc<AtomicU64>,
}

impl RateLimiter {
    /// Create a limiter for the given budget (`None` = unlimited)
    ///
    /// # Examples
    ///
    /// ```
    /// use media_dl::config::RateLimit;
    /// use media_dl::rate_limiter::RateLimiter;
    ///
    /// let limiter = RateLimiter::new(Some(RateLimit::per_second(5)));
    /// assert!(!limiter.is_unlimited());
    ///
    /// let unlimited = RateLimiter::new(None);
    /// assert!(unlimited.is_unlimited());
    /// ```
    #[must_use]
    pub fn new(limit: Option<RateLimit>) -> Self {
        let (rate, capacity) = match limit {
            Some(limit) if limit.requests > 0 && !limit.per.is_zero() => {
                let rate = (limit.requests_per_sec() * MILLI as f64).max(1.0) as u64;
                (rate, u64::from(limit.burst.max(1)) * MILLI)
            }
            _ => (0, 0),
        };

        Self {
            rate_milli_per_sec: rate,
            capacity,
            tokens: Arc::new(AtomicU64::new(capacity)),
            last_refill: Arc::new(AtomicU64::new(Self::now_nanos())),
        }
    }

    /// True when no limit is enforced
    pub fn is_unlimited(&self) -> bool {
        self.rate_milli_per_sec == 0
    }

    /// Wait until one request may be issued
    pub async fn acquire(&self) {
        if self.is_unlimited() {
            return;
        }

        loop {
            if self.try_acquire() {
                return;
            }

            // Sleep roughly until the next whole token is available.
            let current = self.tokens.load(Ordering::SeqCst);
            let missing = MILLI.saturating_sub(current);
            let wait_ms = missing.saturating_mul(1000) / self.rate_milli_per_sec.max(1);
            tokio::time::sleep(Duration::from_millis(wait_ms.clamp(5, 250))).await;
        }
    }

    /// Wait for a token unless `cancel` fires first
    ///
    /// Returns `false` without taking a token once `cancel` has fired, even when
    /// one is available.
    pub async fn acquire_until_cancelled(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.acquire() => true,
        }
    }

    /// Take one token if available, without waiting
    pub fn try_acquire(&self) -> bool {
        if self.is_unlimited() {
            return true;
        }

        self.refill_tokens();

        loop {
            let current = self.tokens.load(Ordering::SeqCst);
            if current < MILLI {
                return false;
            }
            if self
                .tokens
                .compare_exchange(current, current - MILLI, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
            // Lost a race with another task; re-read and try again
        }
    }

    /// Refill tokens based on elapsed time since last refill
    fn refill_tokens(&self) {
        let now = Self::now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);

        let elapsed_secs = now.saturating_sub(last) as f64 / 1_000_000_000.0;
        let to_add = (self.rate_milli_per_sec as f64 * elapsed_secs) as u64;

        if to_add > 0
            && self
                .last_refill
                .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            let capacity = self.capacity;
            let _ = self
                .tokens
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                    Some((t + to_add).min(capacity))
                });
        }
    }

    /// Get current monotonic time in nanoseconds
    fn now_nanos() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_unlimited() {
        let limiter = RateLimiter::new(None);
        let start = Instant::now();
        for _ in 0..1000 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_burst_then_empty() {
        let limiter = RateLimiter::new(Some(RateLimit {
            requests: 1,
            per: Duration::from_secs(60),
            burst: 3,
        }));

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(
            !limiter.try_acquire(),
            "fourth request must wait for a refill at 1/min"
        );
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        // 20 req/s, burst 1: the second request waits ~50ms
        let limiter = RateLimiter::new(Some(RateLimit {
            requests: 20,
            per: Duration::from_secs(1),
            burst: 1,
        }));

        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        let waited = start.elapsed();
        assert!(
            waited >= Duration::from_millis(30),
            "second token should not be available immediately, waited {waited:?}"
        );
        assert!(waited < Duration::from_secs(1), "waited too long: {waited:?}");
    }

    #[tokio::test]
    async fn test_clones_share_one_bucket() {
        let limiter = RateLimiter::new(Some(RateLimit {
            requests: 1,
            per: Duration::from_secs(60),
            burst: 2,
        }));
        let other = limiter.clone();

        assert!(limiter.try_acquire());
        assert!(other.try_acquire());
        assert!(!limiter.try_acquire());
        assert!(!other.try_acquire());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_never_oversubscribes() {
        let limiter = RateLimiter::new(Some(RateLimit {
            requests: 1,
            per: Duration::from_secs(60),
            burst: 5,
        }));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let l = limiter.clone();
            handles.push(tokio::spawn(async move { l.try_acquire() }));
        }
        let mut granted = 0;
        for h in handles {
            if h.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 5, "only the burst may be granted");
    }

    #[tokio::test]
    async fn test_cancel_interrupts_token_wait() {
        let limiter = RateLimiter::new(Some(RateLimit {
            requests: 1,
            per: Duration::from_secs(60),
            burst: 1,
        }));
        assert!(limiter.try_acquire());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        assert!(!limiter.acquire_until_cancelled(&cancel).await);
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "the wait for a refill at 1/min must end on cancel"
        );
    }

    #[tokio::test]
    async fn test_cancelled_caller_leaves_token_in_bucket() {
        let limiter = RateLimiter::new(Some(RateLimit {
            requests: 1,
            per: Duration::from_secs(60),
            burst: 1,
        }));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(!limiter.acquire_until_cancelled(&cancel).await);
        assert!(limiter.try_acquire(), "the token was not consumed");

        let live = CancellationToken::new();
        let unlimited = RateLimiter::new(None);
        assert!(unlimited.acquire_until_cancelled(&live).await);
    }

    #[test]
    fn test_zero_budget_is_unlimited() {
        let limiter = RateLimiter::new(Some(RateLimit {
            requests: 0,
            per: Duration::from_secs(1),
            burst: 1,
        }));
        assert!(limiter.is_unlimited());
    }
}
