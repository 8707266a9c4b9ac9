//! Outcome accumulation and progress broadcasting for one job

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::broadcast;

use crate::error::SourceError;
use crate::types::{
    Event, JobId, JobPhase, JobSummary, Outcome, Progress, RejectedDescriptor, SourceName,
    SourceNote,
};

#[derive(Debug, Default)]
struct Ledger {
    outcomes: Vec<Outcome>,
    rejected: Vec<RejectedDescriptor>,
    notes: BTreeMap<SourceName, SourceNote>,
}

/// Collects a job's outcomes in arrival order and publishes progress
///
/// Event delivery never blocks: with no subscriber, or a lagging one, events are
/// simply dropped for that receiver.
#[derive(Debug)]
pub struct ResultReporter {
    job_id: JobId,
    events: broadcast::Sender<Event>,
    ledger: Mutex<Ledger>,
    collected: AtomicUsize,
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl ResultReporter {
    /// Reporter for `job_id` with one note slot per requested source
    pub fn new<'a>(
        job_id: JobId,
        sources: impl IntoIterator<Item = &'a SourceName>,
        events: broadcast::Sender<Event>,
    ) -> Self {
        let notes = sources
            .into_iter()
            .map(|s| {
                (
                    s.clone(),
                    SourceNote {
                        source: s.clone(),
                        collected: 0,
                        error: None,
                    },
                )
            })
            .collect();

        Self {
            job_id,
            events,
            ledger: Mutex::new(Ledger {
                notes,
                ..Default::default()
            }),
            collected: AtomicUsize::new(0),
            downloaded: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        // A panic elsewhere while holding the lock leaves the ledger usable
        self.ledger
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn emit(&self, event: Event) {
        // Err only means nobody is listening
        self.events.send(event).ok();
    }

    /// Current counts
    pub fn progress(&self) -> Progress {
        Progress {
            collected: self.collected.load(Ordering::SeqCst),
            downloaded: self.downloaded.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    /// Announce a phase change
    pub fn phase(&self, phase: JobPhase) {
        tracing::info!(job_id = %self.job_id, ?phase, "job phase changed");
        self.emit(Event::PhaseChanged {
            job_id: self.job_id,
            phase,
        });
    }

    /// Count a unique descriptor entering the queue for `source`
    pub fn collected(&self, source: &SourceName) {
        self.collected.fetch_add(1, Ordering::SeqCst);
        if let Some(note) = self.ledger().notes.get_mut(source) {
            note.collected += 1;
        }
    }

    /// Record a descriptor the normalizer refused
    pub fn rejected(&self, rejected: RejectedDescriptor) {
        tracing::debug!(
            source = %rejected.source,
            source_id = %rejected.source_id,
            reason = %rejected.reason,
            "descriptor rejected"
        );
        self.ledger().rejected.push(rejected);
    }

    /// A source finished listing without error
    pub fn source_completed(&self, source: &SourceName) {
        let collected = self
            .ledger()
            .notes
            .get(source)
            .map_or(0, |note| note.collected);
        tracing::info!(job_id = %self.job_id, source = %source, collected, "source completed");
        self.emit(Event::SourceCompleted {
            job_id: self.job_id,
            source: source.clone(),
            collected,
        });
    }

    /// A source degraded; it contributes nothing further
    pub fn source_failed(&self, source: &SourceName, error: SourceError) {
        tracing::warn!(job_id = %self.job_id, source = %source, error = %error, "source failed");
        if let Some(note) = self.ledger().notes.get_mut(source) {
            note.error = Some(error.clone());
        }
        self.emit(Event::SourceFailed {
            job_id: self.job_id,
            source: source.clone(),
            error,
        });
    }

    /// Record an item's terminal outcome
    pub fn record(&self, outcome: Outcome) {
        match &outcome {
            Outcome::Downloaded { .. } => self.downloaded.fetch_add(1, Ordering::SeqCst),
            Outcome::Skipped { .. } => self.skipped.fetch_add(1, Ordering::SeqCst),
            Outcome::Failed { .. } => self.failed.fetch_add(1, Ordering::SeqCst),
        };

        self.ledger().outcomes.push(outcome.clone());
        let progress = self.progress();

        self.emit(Event::ItemFinished {
            job_id: self.job_id,
            outcome: Box::new(outcome),
            progress,
        });
    }

    /// Seal the summary and announce the end of the job
    pub fn finalize(&self, query: &str, requested: usize, cancelled: bool) -> JobSummary {
        let ledger = std::mem::take(&mut *self.ledger());
        let progress = self.progress();

        let summary = JobSummary {
            job_id: self.job_id,
            query: query.to_string(),
            requested,
            downloaded: progress.downloaded,
            skipped: progress.skipped,
            failed: progress.failed,
            outcomes: ledger.outcomes,
            source_notes: ledger.notes.into_values().collect(),
            rejected: ledger.rejected,
            cancelled,
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
        };

        self.phase(JobPhase::Finalized);
        tracing::info!(
            job_id = %self.job_id,
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "job finished"
        );
        self.emit(Event::JobFinished {
            job_id: self.job_id,
            progress,
            cancelled,
        });
        summary
    }
}
