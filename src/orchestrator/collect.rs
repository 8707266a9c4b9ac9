//! Collectors: one task per requested source feeding the work queue

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};

use super::job::JobContext;
use crate::error::FailureReason;
use crate::normalizer::normalize;
use crate::sources::{ListingLimits, list_candidates};
use crate::types::{MediaItem, Outcome, RejectedDescriptor, SourceName};

/// List `source`, normalize and dedup its descriptors, and enqueue the survivors
///
/// Holds a `gate` permit for its whole run. A listing error degrades only this
/// source. Once the job is cancelled, the descriptor that could not be enqueued is
/// recorded as a cancelled failure and collection stops.
pub(crate) async fn run_collector(
    job: Arc<JobContext>,
    source: SourceName,
    gate: Arc<Semaphore>,
    tx: mpsc::Sender<MediaItem>,
) {
    let _permit = tokio::select! {
        biased;
        _ = job.cancel.cancelled() => {
            tracing::debug!(source = %source, "cancelled before collecting");
            return;
        }
        permit = gate.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
    };

    let (Some(slot), Some(ctx)) = (job.slot(&source), job.source_context(&source)) else {
        return;
    };

    let limits = ListingLimits {
        max_items: job.request.items_per_source,
        max_pages: job.config.download.max_pages,
        retry: job.config.retry.clone(),
    };
    let mut candidates = list_candidates(
        Arc::clone(&slot.adapter),
        ctx,
        job.request.query.clone(),
        limits,
        job.cancel.clone(),
    );

    tracing::debug!(source = %source, "collector started");

    while let Some(next) = candidates.next().await {
        let raw = match next {
            Ok(raw) => raw,
            Err(e) => {
                job.reporter.source_failed(&source, e);
                return;
            }
        };

        let item = match normalize(&raw, &source) {
            Ok(item) => item,
            Err(e) => {
                job.reporter.rejected(RejectedDescriptor {
                    source: source.clone(),
                    source_id: raw.source_id,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if !job.dedup.check_identity(&source, &item.source_id).await {
            tracing::debug!(source = %source, source_id = %item.source_id, "repeat listing dropped");
            continue;
        }

        job.mark_queuing();
        job.reporter.collected(&source);

        let permit = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => None,
            permit = tx.reserve() => permit.ok(),
        };
        match permit {
            Some(permit) => permit.send(item),
            None => {
                job.reporter.record(Outcome::Failed {
                    item,
                    reason: FailureReason::Cancelled,
                    attempts: 0,
                    error: None,
                });
                break;
            }
        }
    }

    job.reporter.source_completed(&source);
}
