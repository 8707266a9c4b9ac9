//! Configuration types for media-dl

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};

use crate::error::{Error, Result};

/// Download behavior configuration (concurrency, queueing, verification)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Default worker pool size when a request does not set one (default: 8)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Capacity of the bounded work queue between collectors and workers (default: 64)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound on adapters collecting at the same time (default: 6)
    #[serde(default = "default_max_collectors")]
    pub max_collectors: usize,

    /// Maximum simultaneous downloads against one source (default: 4)
    #[serde(default = "default_max_concurrent_per_source")]
    pub max_concurrent_per_source: usize,

    /// Maximum listing pages requested from a single source per job (default: 10)
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Check leading magic bytes against the item's claimed kind (default: true)
    #[serde(default = "default_true")]
    pub verify_signature: bool,

    /// Hash files already present in the output directory so re-runs skip them (default: true)
    #[serde(default = "default_true")]
    pub seed_existing: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
            max_collectors: default_max_collectors(),
            max_concurrent_per_source: default_max_concurrent_per_source(),
            max_pages: default_max_pages(),
            verify_signature: true,
            seed_existing: true,
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per item, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 500ms)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Request budget for one source
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Requests allowed per `per` window
    pub requests: u32,

    /// Length of the window
    #[serde(with = "duration_serde")]
    pub per: Duration,

    /// Requests that may be issued back to back before throttling kicks in
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl RateLimit {
    /// `requests` per second with a burst of the same size
    pub fn per_second(requests: u32) -> Self {
        Self {
            requests,
            per: Duration::from_secs(1),
            burst: requests.max(1),
        }
    }

    /// Sustained rate in requests per second
    pub fn requests_per_sec(&self) -> f64 {
        if self.per.is_zero() {
            return f64::INFINITY;
        }
        f64::from(self.requests) / self.per.as_secs_f64()
    }
}

/// Per-source rate limiting
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Budget for sources that declare none of their own (default: 5 req/s, burst 5)
    #[serde(default = "default_rate_limit")]
    pub default: RateLimit,

    /// Overrides keyed by source name; these win over adapter-declared limits
    #[serde(default)]
    pub per_source: HashMap<String, RateLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default: default_rate_limit(),
            per_source: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Effective budget for `source`: configured override, then the adapter's own, then the default
    pub fn for_source(&self, source: &str, declared: Option<RateLimit>) -> RateLimit {
        self.per_source
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(source))
            .map(|(_, limit)| *limit)
            .or(declared)
            .unwrap_or(self.default)
    }
}

/// HTTP client settings shared by adapters and downloads within one job
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// TCP/TLS connect timeout (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Base URLs of the built-in sources
///
/// Overridable so that tests and mirrors can point adapters elsewhere.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceEndpoints {
    /// Unsplash API root
    #[serde(default = "default_unsplash_api")]
    pub unsplash: String,
    /// Pexels API root
    #[serde(default = "default_pexels_api")]
    pub pexels: String,
    /// Pixabay API root
    #[serde(default = "default_pixabay_api")]
    pub pixabay: String,
    /// Coverr site root
    #[serde(default = "default_coverr_site")]
    pub coverr: String,
    /// Mixkit site root
    #[serde(default = "default_mixkit_site")]
    pub mixkit: String,
    /// Videvo site root
    #[serde(default = "default_videvo_site")]
    pub videvo: String,
}

impl Default for SourceEndpoints {
    fn default() -> Self {
        Self {
            unsplash: default_unsplash_api(),
            pexels: default_pexels_api(),
            pixabay: default_pixabay_api(),
            coverr: default_coverr_site(),
            mixkit: default_mixkit_site(),
            videvo: default_videvo_site(),
        }
    }
}

/// Main configuration for [`MediaFetcher`](crate::MediaFetcher)
///
/// Every field has a sensible default, so `Config::default()` is a working setup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool, queue and verification settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry/backoff policy applied per item
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-source request budgets
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Built-in source base URLs
    #[serde(default)]
    pub endpoints: SourceEndpoints,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or misconfigure a job
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str, &str); 6] = [
            (
                self.download.concurrency == 0,
                "download.concurrency",
                "concurrency must be at least 1",
            ),
            (
                self.download.queue_capacity == 0,
                "download.queue_capacity",
                "queue capacity must be at least 1",
            ),
            (
                self.download.max_collectors == 0,
                "download.max_collectors",
                "at least one collector is required",
            ),
            (
                self.download.max_concurrent_per_source == 0,
                "download.max_concurrent_per_source",
                "per-source concurrency must be at least 1",
            ),
            (
                self.retry.max_attempts == 0,
                "retry.max_attempts",
                "at least one attempt is required",
            ),
            (
                self.retry.backoff_multiplier < 1.0,
                "retry.backoff_multiplier",
                "backoff multiplier must be >= 1.0",
            ),
        ];

        for (failed, key, message) in checks {
            if failed {
                return Err(Error::Config {
                    message: message.to_string(),
                    key: Some(key.to_string()),
                });
            }
        }

        let limits = std::iter::once(("rate_limit.default".to_string(), &self.rate_limit.default))
            .chain(
                self.rate_limit
                    .per_source
                    .iter()
                    .map(|(name, limit)| (format!("rate_limit.per_source.{}", name), limit)),
            );
        for (key, limit) in limits {
            if limit.requests == 0 || limit.burst == 0 {
                return Err(Error::Config {
                    message: "rate limits need at least one request and a burst of one"
                        .to_string(),
                    key: Some(key),
                });
            }
        }

        Ok(())
    }
}

// Default value functions
fn default_concurrency() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    64
}

fn default_max_collectors() -> usize {
    6
}

fn default_max_concurrent_per_source() -> usize {
    4
}

fn default_max_pages() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_burst() -> u32 {
    1
}

fn default_rate_limit() -> RateLimit {
    RateLimit::per_second(5)
}

fn default_user_agent() -> String {
    format!("media-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_unsplash_api() -> String {
    "https://api.unsplash.com".to_string()
}

fn default_pexels_api() -> String {
    "https://api.pexels.com".to_string()
}

fn default_pixabay_api() -> String {
    "https://pixabay.com/api".to_string()
}

fn default_coverr_site() -> String {
    "https://coverr.co".to_string()
}

fn default_mixkit_site() -> String {
    "https://mixkit.co".to_string()
}

fn default_videvo_site() -> String {
    "https://www.videvo.net".to_string()
}

// Duration serialization helper (milliseconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
