//! Download orchestration split into focused submodules.
//!
//! A job runs as a small pipeline:
//! - [`collect`] - one collector per source: list, normalize, dedup, enqueue
//! - [`worker`] - a fixed pool draining the bounded queue: download, verify, publish
//! - [`job`] - the per-job context both sides share
//!
//! [`MediaFetcher`] owns the long-lived pieces (configuration, registered sources,
//! credentials and the event channel) and runs one job per [`FetchRequest`].

mod collect;
mod job;
mod worker;


use futures::{Stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Config;
use crate::error::{Error, RequestError, Result};
use crate::sources::{CredentialLookup, EnvCredentials, SourceRegistry};
use crate::types::{Event, FetchRequest, JobId, JobPhase, JobSummary, SourceName};

use job::{JobContext, JobContextParams};

/// Buffered events per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Media acquisition engine (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaFetcher {
    /// Configuration shared with every job
    pub(crate) config: Arc<Config>,
    /// Adapters requests may name
    pub(crate) registry: Arc<SourceRegistry>,
    /// API key lookup handed to adapters
    pub(crate) credentials: Arc<dyn CredentialLookup>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    next_job_id: Arc<AtomicU64>,
}

impl MediaFetcher {
    /// Create a fetcher over `registry`, resolving keys through `credentials`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `config` fails validation.
    pub fn new(
        config: Config,
        registry: SourceRegistry,
        credentials: Arc<dyn CredentialLookup>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tracing::info!(sources = ?registry.names(), "media fetcher initialized");

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            credentials,
            event_tx,
            next_job_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Fetcher with the built-in sources and keys from `<SOURCE>_KEY` variables
    pub fn with_default_sources(config: Config) -> Result<Self> {
        let registry = SourceRegistry::with_default_sources(&config);
        Self::new(config, registry, Arc::new(EnvCredentials))
    }

    /// Subscribe to job events
    ///
    /// Each subscriber receives every event independently. Events are never waited
    /// on: a subscriber that falls more than the channel capacity behind gets
    /// `RecvError::Lagged` and misses the overflow.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{Config, Event, MediaFetcher};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let fetcher = MediaFetcher::with_default_sources(Config::default())?;
    /// let mut events = fetcher.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         if let Event::ItemFinished { progress, .. } = event {
    ///             println!("{} finished", progress.finished());
    ///         }
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Events as a stream, skipping over any the consumer was too slow to receive
    pub fn event_stream(&self) -> impl Stream<Item = Event> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|next| async move {
            match next {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                    None
                }
            }
        })
    }

    /// Get the configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Registered sources
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Build a request using the configured default concurrency
    pub fn request<I, S>(
        &self,
        query: impl Into<String>,
        items_per_source: usize,
        sources: I,
        output_dir: impl Into<PathBuf>,
    ) -> FetchRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceName>,
    {
        FetchRequest::new(query, items_per_source, sources, output_dir)
            .with_concurrency(self.config.download.concurrency)
    }

    /// Run a job to completion
    pub async fn fetch(&self, request: FetchRequest) -> Result<JobSummary> {
        self.fetch_with_cancel(request, CancellationToken::new()).await
    }

    /// Run a job that stops early once `cancel` fires
    ///
    /// The request is validated before anything else happens; an invalid request
    /// returns [`Error::Request`] without touching the network. A valid request
    /// always produces a summary, even when every source or item failed.
    ///
    /// After cancellation, downloads already writing are allowed to finish, queued
    /// items are reported as `Failed { reason: Cancelled }` and the summary is
    /// marked `cancelled`.
    pub async fn fetch_with_cancel(
        &self,
        request: FetchRequest,
        cancel: CancellationToken,
    ) -> Result<JobSummary> {
        request.validate(&self.registry)?;
        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|e| {
                Error::Request(RequestError::OutputDir {
                    path: request.output_dir.clone(),
                    reason: e.to_string(),
                })
            })?;

        let job_id = JobId(self.next_job_id.fetch_add(1, Ordering::SeqCst));
        let span = tracing::info_span!("job", job_id = %job_id, query = %request.query);
        self.run_job(job_id, request, cancel).instrument(span).await
    }

    async fn run_job(
        &self,
        job_id: JobId,
        request: FetchRequest,
        cancel: CancellationToken,
    ) -> Result<JobSummary> {
        let job = Arc::new(JobContext::new(JobContextParams {
            job_id,
            request,
            config: Arc::clone(&self.config),
            registry: &self.registry,
            credentials: Arc::clone(&self.credentials),
            event_tx: self.event_tx.clone(),
            cancel,
        })?);

        tracing::info!(
            sources = job.request.sources.len(),
            items_per_source = job.request.items_per_source,
            concurrency = job.request.concurrency,
            output_dir = %job.request.output_dir.display(),
            "job started"
        );

        if self.config.download.seed_existing {
            match job.dedup.seed_from_dir(&job.request.output_dir).await {
                Ok(seeded) if seeded > 0 => {
                    tracing::info!(seeded, "existing files will be skipped");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "could not scan output directory for existing files");
                }
            }
        }

        job.reporter.phase(JobPhase::Collecting);

        let (tx, rx) = mpsc::channel(self.config.download.queue_capacity);
        let queue: worker::SharedReceiver = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..job.request.concurrency {
            let span = tracing::debug_span!("worker", worker_id);
            workers.spawn(
                worker::run_worker(Arc::clone(&job), Arc::clone(&queue), worker_id).instrument(span),
            );
        }

        let gate = Arc::new(Semaphore::new(
            job.request
                .sources
                .len()
                .min(self.config.download.max_collectors),
        ));
        let mut collectors = JoinSet::new();
        for source in job.request.sources.iter().cloned() {
            let span = tracing::debug_span!("collector", source = %source);
            collectors.spawn(
                collect::run_collector(Arc::clone(&job), source, Arc::clone(&gate), tx.clone())
                    .instrument(span),
            );
        }
        // Workers see the queue close once the last collector drops its sender
        drop(tx);

        while let Some(joined) = collectors.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "collector task failed");
            }
        }

        job.reporter.phase(JobPhase::Draining);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker task failed");
            }
        }

        Ok(job.reporter.finalize(
            &job.request.query,
            job.request.requested(),
            job.cancel.is_cancelled(),
        ))
    }
}

impl std::fmt::Debug for MediaFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaFetcher")
            .field("sources", &self.registry.names())
            .field("subscribers", &self.event_tx.receiver_count())
            .finish_non_exhaustive()
    }
}
