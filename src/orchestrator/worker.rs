//! Workers: drain the queue, one download-and-write cycle per item

use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::Instrument;

use super::job::JobContext;
use crate::error::{FailureReason, ItemError};
use crate::rate_limiter::RateLimiter;
use crate::retry::download_with_retry;
use crate::storage::{Payload, StagedFile};
use crate::types::{MediaItem, Outcome, SkipReason};

/// Receiving half of the work queue, shared by every worker of a job
pub(crate) type SharedReceiver = Arc<Mutex<mpsc::Receiver<MediaItem>>>;

/// Pull items until the queue is closed and empty
///
/// On cancellation the queue is closed; whatever is still buffered is drained and
/// recorded as cancelled without being started.
pub(crate) async fn run_worker(job: Arc<JobContext>, queue: SharedReceiver, worker_id: usize) {
    loop {
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                _ = job.cancel.cancelled() => {
                    rx.close();
                    rx.recv().await
                }
                item = rx.recv() => item,
            }
        };

        let Some(item) = next else {
            break;
        };

        let outcome = if job.cancel.is_cancelled() {
            cancelled(item, 0, None)
        } else {
            let span = tracing::debug_span!("item", worker_id, item = %item.id);
            process_item(&job, item).instrument(span).await
        };
        job.reporter.record(outcome);
    }

    tracing::debug!(worker_id, "worker finished");
}

fn cancelled(item: MediaItem, attempts: u32, error: Option<String>) -> Outcome {
    Outcome::Failed {
        item,
        reason: FailureReason::Cancelled,
        attempts,
        error,
    }
}

/// Download, verify, dedup and publish one item
async fn process_item(job: &JobContext, item: MediaItem) -> Outcome {
    let Some(slot) = job.slot(&item.source_name) else {
        let error = format!("no adapter for source {}", item.source_name);
        return Outcome::Failed {
            item,
            reason: FailureReason::InvalidContent,
            attempts: 0,
            error: Some(error),
        };
    };

    let _permit = tokio::select! {
        biased;
        _ = job.cancel.cancelled() => return cancelled(item, 0, None),
        permit = Arc::clone(&slot.downloads).acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return cancelled(item, 0, None),
        },
    };

    let dir = job
        .request
        .layout
        .directory_for(&job.request.output_dir, &item.source_name, item.kind);

    let limiter = &slot.limiter;
    let target = &item;
    let dir_ref = dir.as_path();
    let attempted = download_with_retry(&job.config.retry, &job.cancel, move |attempt| {
        attempt_download(job, limiter, target, dir_ref, attempt)
    })
    .await;
    let attempts = attempted.attempts;

    let staged = match attempted.result {
        Ok(staged) => staged,
        // The last attempt never sent its request
        Err(ItemError::Cancelled) => {
            tracing::debug!(attempts, "cancelled while waiting for a request token");
            return cancelled(item, attempts.saturating_sub(1), None);
        }
        Err(e) if attempted.cancelled => {
            tracing::debug!(attempts, "download abandoned after cancellation");
            return cancelled(item, attempts, Some(e.to_string()));
        }
        Err(e) => {
            tracing::warn!(item = %item.id, attempts, error = %e, "download failed");
            return Outcome::Failed {
                reason: e.reason(),
                error: Some(e.to_string()),
                item,
                attempts,
            };
        }
    };

    let hash = staged.content_hash.clone();
    let bytes = staged.bytes;

    if !job.dedup.claim_hash(&hash).await {
        job.storage.discard(staged).await;
        tracing::info!(item = %item.id, hash = %hash, "duplicate content skipped");
        return Outcome::Skipped {
            item: item.with_content_hash(&hash),
            reason: SkipReason::Duplicate,
        };
    }

    match job.storage.commit(staged).await {
        Ok(local_path) => {
            tracing::info!(
                item = %item.id,
                path = %local_path.display(),
                bytes,
                attempts,
                "item downloaded"
            );
            Outcome::Downloaded {
                item: item.with_content_hash(&hash),
                local_path,
                bytes,
            }
        }
        Err(e) => {
            job.dedup.release_hash(&hash).await;
            tracing::warn!(item = %item.id, error = %e, "publishing file failed");
            Outcome::Failed {
                reason: e.reason(),
                error: Some(e.to_string()),
                item,
                attempts,
            }
        }
    }
}

/// One GET of the payload streamed into a staged file
///
/// Fails with [`ItemError::Cancelled`] if the job is cancelled before a rate-limit
/// token is granted.
async fn attempt_download(
    job: &JobContext,
    limiter: &RateLimiter,
    item: &MediaItem,
    dir: &Path,
    attempt: u32,
) -> Result<StagedFile, ItemError> {
    if !limiter.acquire_until_cancelled(&job.cancel).await {
        return Err(ItemError::Cancelled);
    }
    tracing::debug!(attempt, url = %item.download_url, "requesting payload");

    let response = job.http.get(&item.download_url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ItemError::from_status(status));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_length = response.content_length();
    let body = response
        .bytes_stream()
        .map(|chunk| {
            chunk.map_err(|e| ItemError::truncated(format!("body stream interrupted: {}", e)))
        })
        .boxed();

    job.storage
        .stage(
            item,
            Payload {
                content_type,
                content_length,
                body,
            },
            dir,
        )
        .await
}
