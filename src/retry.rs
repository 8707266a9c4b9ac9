//! Bounded retries with capped exponential backoff
//!
//! Each item gets a bounded number of attempts. Transient failures are retried
//! after a delay that doubles from `initial_delay` (capped at `max_delay`), with
//! optional jitter so that workers hitting the same throttled host spread out.
//! Cancellation is observed between attempts and while backing off, never
//! while an attempt is running.
//!
//! # Example
//!
//! ```no_run
//! use media_dl::retry::{IsRetryable, download_with_retry};
//! use media_dl::config::RetryConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "transient")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let attempted = download_with_retry(&config, &cancel, |_attempt| async {
//!     Ok::<_, MyError>(())
//! })
//! .await;
//! assert_eq!(attempted.attempts, 1);
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{ItemError, SourceError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Errors that know whether another attempt could succeed
///
/// Transient failures (timeouts, throttling, truncated transfers) return `true`.
/// Deterministic failures (missing payload, wrong content, disk errors) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ItemError {
    fn is_retryable(&self) -> bool {
        match self {
            ItemError::Network(_) | ItemError::RateLimited(_) => true,
            // Content-Length mismatch or a broken body stream
            ItemError::Write { truncated, .. } => *truncated,
            ItemError::NotFound(_) | ItemError::InvalidContent(_) | ItemError::Cancelled => false,
        }
    }
}

impl IsRetryable for SourceError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::NetworkError(_) | SourceError::RateLimited(_)
        )
    }
}

/// Result of a retried operation together with how it got there
#[derive(Debug)]
pub struct Attempted<T, E> {
    /// Final result (the last error when every attempt failed)
    pub result: Result<T, E>,
    /// Attempts actually started
    pub attempts: u32,
    /// True when cancellation stopped further attempts
    pub cancelled: bool,
}

impl<T, E> Attempted<T, E> {
    fn settled(result: Result<T, E>, attempts: u32) -> Self {
        Self {
            result,
            attempts,
            cancelled: false,
        }
    }
}

/// Delay schedule between attempts
#[derive(Debug)]
struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    fn new(config: &RetryConfig) -> Self {
        Self {
            next: config.initial_delay.min(config.max_delay),
            max: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// Delay to wait now; advances the schedule
    fn step(&mut self) -> Duration {
        let base = self.next;
        self.next = base.mul_f64(self.multiplier.max(1.0)).min(self.max);
        if self.jitter { add_jitter(base) } else { base }
    }
}

/// Run `operation` until it succeeds, fails permanently or runs out of attempts
///
/// `operation` receives the 1-based attempt number. At most
/// `config.max_attempts` attempts run, strictly one after another. Retrying
/// stops early on a non-retryable error or when `cancel` fires between attempts.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Attempted<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut backoff = Backoff::new(config);

    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "attempt succeeded after retry");
                }
                return Attempted::settled(Ok(value), attempt);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            tracing::debug!(error = %error, attempt, "permanent failure, not retrying");
            return Attempted::settled(Err(error), attempt);
        }
        if attempt >= max_attempts {
            tracing::warn!(error = %error, attempts = attempt, "giving up after last attempt");
            return Attempted::settled(Err(error), attempt);
        }

        let wait = backoff.step();
        tracing::warn!(
            error = %error,
            attempt,
            max_attempts,
            wait_ms = wait.as_millis(),
            "transient failure, backing off"
        );
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(wait) => {}
        }
        if cancel.is_cancelled() {
            tracing::debug!(attempts = attempt, "retry abandoned, job cancelled");
            return Attempted {
                result: Err(error),
                attempts: attempt,
                cancelled: true,
            };
        }
    }
}

/// Stretch `delay` by a random 0-50%
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=0.5);
    delay.mul_f64(1.0 + factor)
}
