//! Job context: everything one job shares between its collectors and workers

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::error::{Error, RequestError, Result};
use crate::rate_limiter::RateLimiter;
use crate::reporter::ResultReporter;
use crate::sources::{CredentialLookup, SourceAdapter, SourceContext, SourceRegistry};
use crate::storage::StorageWriter;
use crate::types::{Event, FetchRequest, JobId, JobPhase, SourceName};

/// Per-source shared state for one job
pub(crate) struct SourceSlot {
    pub(crate) adapter: Arc<dyn SourceAdapter>,
    /// One bucket for listing pages and payload downloads alike
    pub(crate) limiter: RateLimiter,
    /// Caps simultaneous downloads against this source
    pub(crate) downloads: Arc<Semaphore>,
}

/// State owned by a single job and dropped when it returns
pub(crate) struct JobContext {
    pub(crate) job_id: JobId,
    pub(crate) request: FetchRequest,
    pub(crate) config: Arc<Config>,
    pub(crate) http: reqwest::Client,
    pub(crate) credentials: Arc<dyn CredentialLookup>,
    pub(crate) sources: HashMap<SourceName, SourceSlot>,
    pub(crate) dedup: Deduplicator,
    pub(crate) storage: StorageWriter,
    pub(crate) reporter: ResultReporter,
    pub(crate) cancel: CancellationToken,
    queuing: AtomicBool,
}

/// Inputs for [`JobContext::new`]
pub(crate) struct JobContextParams<'a> {
    pub(crate) job_id: JobId,
    pub(crate) request: FetchRequest,
    pub(crate) config: Arc<Config>,
    pub(crate) registry: &'a SourceRegistry,
    pub(crate) credentials: Arc<dyn CredentialLookup>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) cancel: CancellationToken,
}

impl JobContext {
    pub(crate) fn new(params: JobContextParams<'_>) -> Result<Self> {
        let JobContextParams {
            job_id,
            request,
            config,
            registry,
            credentials,
            event_tx,
            cancel,
        } = params;

        let http = reqwest::Client::builder()
            .user_agent(config.http.user_agent.clone())
            .timeout(config.http.request_timeout)
            .connect_timeout(config.http.connect_timeout)
            .build()?;

        let mut sources = HashMap::with_capacity(request.sources.len());
        for name in &request.sources {
            let adapter = registry
                .get(name)
                .ok_or_else(|| Error::Request(RequestError::UnknownSource(name.clone())))?;
            let limit = config
                .rate_limit
                .for_source(name.as_str(), adapter.rate_limit());
            tracing::debug!(
                source = %name,
                requests_per_sec = limit.requests_per_sec(),
                burst = limit.burst,
                "source rate limit"
            );
            sources.insert(
                name.clone(),
                SourceSlot {
                    adapter,
                    limiter: RateLimiter::new(Some(limit)),
                    downloads: Arc::new(Semaphore::new(config.download.max_concurrent_per_source)),
                },
            );
        }

        let reporter = ResultReporter::new(job_id, &request.sources, event_tx);
        let storage = StorageWriter::new(config.download.verify_signature);

        Ok(Self {
            job_id,
            request,
            config,
            http,
            credentials,
            sources,
            dedup: Deduplicator::new(),
            storage,
            reporter,
            cancel,
            queuing: AtomicBool::new(false),
        })
    }

    pub(crate) fn slot(&self, source: &SourceName) -> Option<&SourceSlot> {
        self.sources.get(source)
    }

    /// Adapter-facing view of `source`
    pub(crate) fn source_context(&self, source: &SourceName) -> Option<SourceContext> {
        self.slot(source).map(|slot| SourceContext {
            source: source.clone(),
            http: self.http.clone(),
            limiter: slot.limiter.clone(),
            credentials: Arc::clone(&self.credentials),
            cancel: self.cancel.clone(),
        })
    }

    /// Announce `Queuing` the first time a descriptor enters the queue
    pub(crate) fn mark_queuing(&self) {
        if !self.queuing.swap(true, Ordering::SeqCst) {
            self.reporter.phase(JobPhase::Queuing);
        }
    }
}
