//! Error types for media-dl
//!
//! Errors are layered by blast radius:
//! - [`RequestError`] rejects a whole job before any network I/O happens
//! - [`SourceError`] degrades a single source to zero further items
//! - [`ItemError`] fails a single item (after retries) without touching the job
//! - [`Error`] is the crate-level error returned by fallible setup APIs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::types::SourceName;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.concurrency")
        key: Option<String>,
    },

    /// The fetch request was rejected before any work started
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or transport error
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reasons a [`FetchRequest`](crate::types::FetchRequest) is rejected up front
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Query string is empty or whitespace only
    #[error("query must not be empty")]
    EmptyQuery,

    /// `items_per_source` was zero
    #[error("items per source must be at least 1")]
    ZeroItems,

    /// `concurrency` was zero
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    /// No sources were requested
    #[error("at least one source must be requested")]
    NoSources,

    /// A requested source has no registered adapter
    #[error("unknown source '{0}'")]
    UnknownSource(SourceName),

    /// The output directory could not be created or is not a directory
    #[error("output directory {path} is unusable: {reason}")]
    OutputDir {
        /// The rejected output directory
        path: PathBuf,
        /// Why it could not be used
        reason: String,
    },
}

/// Adapter-level failure, scoped to one source
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum SourceError {
    /// The source throttled us (HTTP 429 or equivalent)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Missing or rejected credentials
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// Transport failure or server-side error
    #[error("network error: {0}")]
    NetworkError(String),

    /// The response could not be understood (bad JSON, markup drift)
    #[error("parse error: {0}")]
    ParseError(String),

    /// The job was cancelled before the request could be sent
    #[error("cancelled")]
    Cancelled,
}

impl SourceError {
    /// Classify a non-success HTTP status returned by a listing endpoint
    pub fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        let msg = format!("{} returned HTTP {}", url, status.as_u16());
        match status.as_u16() {
            401 | 403 => SourceError::AuthError(msg),
            429 => SourceError::RateLimited(msg),
            _ => SourceError::NetworkError(msg),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::ParseError(e.to_string())
        } else {
            SourceError::NetworkError(e.to_string())
        }
    }
}

/// Item-level failure, scoped to one media item
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    /// The payload does not exist (404/410 or another deterministic 4xx)
    #[error("not found: {0}")]
    NotFound(String),

    /// The host throttled the download
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Transport failure or server-side error
    #[error("network error: {0}")]
    Network(String),

    /// Writing the payload failed
    ///
    /// `truncated` is set when fewer bytes arrived than were declared or the body
    /// stream broke mid-transfer; those failures are worth another attempt.
    #[error("write error: {message}")]
    Write {
        /// What went wrong
        message: String,
        /// Whether the failure came from an incomplete transfer
        truncated: bool,
    },

    /// The descriptor or payload is not acceptable media
    #[error("invalid content: {0}")]
    InvalidContent(String),

    /// The job was cancelled before the item could complete
    #[error("cancelled")]
    Cancelled,
}

impl ItemError {
    /// Build a non-retryable write error from a local I/O failure
    pub fn disk(context: &str, e: std::io::Error) -> Self {
        ItemError::Write {
            message: format!("{}: {}", context, e),
            truncated: false,
        }
    }

    /// Build a retryable write error for an incomplete transfer
    pub fn truncated(message: impl Into<String>) -> Self {
        ItemError::Write {
            message: message.into(),
            truncated: true,
        }
    }

    /// Map a download response status to an item error
    pub fn from_status(status: reqwest::StatusCode) -> Self {
        let msg = format!("HTTP {}", status.as_u16());
        match status.as_u16() {
            429 => ItemError::RateLimited(msg),
            408 => ItemError::Network(msg),
            s if s >= 500 => ItemError::Network(msg),
            _ => ItemError::NotFound(msg),
        }
    }

    /// Terminal reason recorded in a `Failed` outcome
    pub fn reason(&self) -> FailureReason {
        match self {
            ItemError::NotFound(_) => FailureReason::NotFound,
            ItemError::RateLimited(_) => FailureReason::RateLimited,
            ItemError::Network(_) => FailureReason::NetworkError,
            ItemError::Write { .. } => FailureReason::WriteError,
            ItemError::InvalidContent(_) => FailureReason::InvalidContent,
            ItemError::Cancelled => FailureReason::Cancelled,
        }
    }
}

impl From<reqwest::Error> for ItemError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ItemError::from_status(status),
            None => ItemError::Network(e.to_string()),
        }
    }
}

/// Why an item ended up `Failed`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Payload missing upstream
    NotFound,
    /// Throttled on every attempt
    RateLimited,
    /// Transport failure on every attempt
    NetworkError,
    /// Payload could not be written intact
    WriteError,
    /// Payload or descriptor is not acceptable media
    InvalidContent,
    /// Job cancelled before the item completed
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::NotFound => "not_found",
            FailureReason::RateLimited => "rate_limited",
            FailureReason::NetworkError => "network_error",
            FailureReason::WriteError => "write_error",
            FailureReason::InvalidContent => "invalid_content",
            FailureReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn download_status_mapping() {
        assert_eq!(
            ItemError::from_status(StatusCode::NOT_FOUND).reason(),
            FailureReason::NotFound
        );
        assert_eq!(
            ItemError::from_status(StatusCode::GONE).reason(),
            FailureReason::NotFound
        );
        assert_eq!(
            ItemError::from_status(StatusCode::FORBIDDEN).reason(),
            FailureReason::NotFound,
            "other 4xx statuses are deterministic"
        );
        assert_eq!(
            ItemError::from_status(StatusCode::TOO_MANY_REQUESTS).reason(),
            FailureReason::RateLimited
        );
        assert_eq!(
            ItemError::from_status(StatusCode::BAD_GATEWAY).reason(),
            FailureReason::NetworkError
        );
        assert_eq!(
            ItemError::from_status(StatusCode::REQUEST_TIMEOUT).reason(),
            FailureReason::NetworkError
        );
    }

    #[test]
    fn listing_status_mapping() {
        let url = "https://api.example.com/search";
        assert!(matches!(
            SourceError::from_status(StatusCode::UNAUTHORIZED, url),
            SourceError::AuthError(_)
        ));
        assert!(matches!(
            SourceError::from_status(StatusCode::FORBIDDEN, url),
            SourceError::AuthError(_)
        ));
        assert!(matches!(
            SourceError::from_status(StatusCode::TOO_MANY_REQUESTS, url),
            SourceError::RateLimited(_)
        ));
        match SourceError::from_status(StatusCode::SERVICE_UNAVAILABLE, url) {
            SourceError::NetworkError(msg) => {
                assert!(msg.contains("503"), "message should carry the status: {msg}")
            }
            other => panic!("expected NetworkError, got {other:?}"),
        }
    }

    #[test]
    fn write_errors_keep_their_truncation_flag() {
        let disk = ItemError::disk(
            "creating temp file",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(disk, ItemError::Write { truncated: false, .. }));
        assert!(disk.to_string().contains("creating temp file"));

        let short = ItemError::truncated("expected 10 bytes, got 5");
        assert!(matches!(short, ItemError::Write { truncated: true, .. }));
        assert_eq!(short.reason(), FailureReason::WriteError);
    }

    #[test]
    fn source_error_serializes_with_kind_tag() {
        let err = SourceError::AuthError("missing key".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "auth_error");
        assert_eq!(json["message"], "missing key");
    }
}
