//! # media-dl
//!
//! Concurrent acquisition engine for royalty-free images and video clips.
//!
//! One [`FetchRequest`] names a query, how many items to take from each source and
//! where to put them. The engine asks every source for candidates at the same time,
//! turns their answers into a common [`MediaItem`] shape, drops repeats and
//! downloads the rest through a bounded worker pool. It returns a [`JobSummary`]
//! with exactly one [`Outcome`] per collected item.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Library-first** - No CLI or UI; front ends build requests and read summaries
//! - **Pluggable** - Sources are [`SourceAdapter`]s in a [`SourceRegistry`]
//! - **Polite** - Per-source rate limits and concurrency caps, bounded retries
//! - **Safe on disk** - Payloads are staged and verified before they get a visible name
//! - **Event-driven** - Consumers subscribe to progress events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, MediaFetcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Keys come from UNSPLASH_KEY, PEXELS_KEY and PIXABAY_KEY
//!     let fetcher = MediaFetcher::with_default_sources(Config::default())?;
//!
//!     let mut events = fetcher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let request = fetcher.request("lighthouse", 5, ["pexels", "coverr"], "./downloads");
//!     let summary = fetcher.fetch(request).await?;
//!     println!(
//!         "{} downloaded, {} skipped, {} failed",
//!         summary.downloaded, summary.skipped, summary.failed
//!     );
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Duplicate detection by identity and content hash
pub mod dedup;
/// Request, source and item error types
pub mod error;
/// Media format signatures
pub mod magic;
/// Raw descriptor to media item conversion
pub mod normalizer;
/// Job orchestration (collectors, work queue, workers)
pub mod orchestrator;
/// Per-source request rate limiting with token buckets
pub mod rate_limiter;
/// Outcome accumulation and progress events
pub mod reporter;
/// Bounded retries with backoff and cancellation
pub mod retry;
/// Upstream source adapters
pub mod sources;
/// Staged payload writing
pub mod storage;
/// Items, requests, outcomes and events
pub mod types;
/// File name and path helpers
pub mod utils;

pub use config::{Config, RateLimit};
pub use error::{Error, FailureReason, ItemError, RequestError, Result, SourceError};
pub use orchestrator::MediaFetcher;
pub use sources::{
    CredentialLookup, EnvCredentials, RawDescriptor, SourceAdapter, SourceRegistry,
    StaticCredentials,
};
pub use types::{
    Event, FetchRequest, JobId, JobPhase, JobSummary, MediaItem, MediaKind, Outcome,
    OutputLayout, Progress, SkipReason, SourceName,
};

use tokio_util::sync::CancellationToken;

/// Run one job, cancelling it when the process receives a termination signal.
///
/// The job keeps running until it finishes on its own or a signal arrives. After a
/// signal, in-flight downloads complete, queued items are reported as cancelled and
/// the summary comes back with `cancelled` set.
///
/// On Unix both SIGTERM and SIGINT count; elsewhere Ctrl+C does.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaFetcher, run_until_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let fetcher = MediaFetcher::with_default_sources(Config::default())?;
///     let request = fetcher.request("lighthouse", 10, ["pixabay"], "./downloads");
///
///     let summary = run_until_signal(&fetcher, request).await?;
///     summary.write_manifest(std::path::Path::new("./downloads/_meta/manifest.json"))?;
///
///     Ok(())
/// }
/// ```
pub async fn run_until_signal(
    fetcher: &MediaFetcher,
    request: FetchRequest,
) -> Result<JobSummary> {
    let cancel = CancellationToken::new();
    let job = fetcher.fetch_with_cancel(request, cancel.clone());
    tokio::pin!(job);

    tokio::select! {
        summary = &mut job => summary,
        _ = wait_for_signal() => {
            tracing::info!("cancelling job, waiting for in-flight downloads");
            cancel.cancel();
            job.await
        }
    }
}

/// Resolves on the first SIGTERM or SIGINT; never resolves if neither can be watched
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    async fn recv_or_pending(kind: SignalKind, label: &'static str) -> &'static str {
        match signal(kind) {
            Ok(mut stream) => {
                stream.recv().await;
                label
            }
            Err(e) => {
                tracing::warn!(error = %e, signal = label, "signal handler unavailable");
                std::future::pending().await
            }
        }
    }

    let received = tokio::select! {
        label = recv_or_pending(SignalKind::terminate(), "SIGTERM") => label,
        label = recv_or_pending(SignalKind::interrupt(), "SIGINT") => label,
    };
    tracing::info!(signal = received, "termination signal received");
}

/// Resolves on Ctrl+C
#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl+C, job runs to completion");
        std::future::pending::<()>().await;
    }
    tracing::info!(signal = "ctrl-c", "termination signal received");
}
