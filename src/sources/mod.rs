//! Pluggable upstream sources.
//!
//! Every upstream is a [`SourceAdapter`]: given a query and a cursor it returns one
//! page of raw descriptors. [`list_candidates`] turns that single capability into a
//! lazy, finite stream that stops once enough unique descriptors were produced, the
//! source runs out of pages, or the source fails.
//!
//! Built-in adapters:
//! - [`unsplash`], [`pexels`], [`pixabay`] - JSON APIs
//! - [`coverr`], [`mixkit`], [`videvo`] - scraped HTML listings

pub mod coverr;
pub mod credentials;
pub(crate) mod html;
pub mod mixkit;
pub mod pexels;
pub mod pixabay;
pub mod unsplash;
pub mod videvo;

pub use credentials::{CredentialLookup, EnvCredentials, StaticCredentials};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, RateLimit, RetryConfig};
use crate::error::SourceError;
use crate::rate_limiter::RateLimiter;
use crate::retry::download_with_retry;
use crate::types::SourceName;

/// Pre-download metadata for one candidate, in the source's own terms
///
/// Only `source_id` and `kind_hint` are mandatory; the normalizer decides whether
/// the rest is enough to make a [`MediaItem`](crate::types::MediaItem).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDescriptor {
    /// Identifier within the source
    pub source_id: String,
    /// Source-specific type indicator ("photo", "video", "film", ...)
    pub kind_hint: String,
    /// Title or alt text
    pub title: Option<String>,
    /// Page describing the item
    pub page_url: Option<String>,
    /// Payload URL (may be relative to `page_url`)
    pub download_url: Option<String>,
    /// Thumbnail URL
    pub preview_url: Option<String>,
    /// Author or photographer
    pub author: Option<String>,
    /// License note
    pub license_hint: Option<String>,
    /// Pixel width
    pub width: Option<u32>,
    /// Pixel height
    pub height: Option<u32>,
    /// Clip duration
    pub duration_seconds: Option<f64>,
}

impl RawDescriptor {
    /// Descriptor with only the mandatory fields set
    pub fn new(source_id: impl Into<String>, kind_hint: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            kind_hint: kind_hint.into(),
            ..Default::default()
        }
    }
}

/// Position within a source's listings
///
/// `section` lets an adapter walk several listings in turn (Pexels lists photos,
/// then videos); `page` is 1-based within the section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    /// Adapter-defined listing index
    pub section: usize,
    /// 1-based page within the section
    pub page: u32,
}

impl Cursor {
    /// First page of the first section
    pub fn start() -> Self {
        Self {
            section: 0,
            page: 1,
        }
    }

    /// Next page in the same section
    pub fn next_page(&self) -> Self {
        Self {
            section: self.section,
            page: self.page + 1,
        }
    }

    /// First page of the following section
    pub fn next_section(&self) -> Self {
        Self {
            section: self.section + 1,
            page: 1,
        }
    }
}

/// One page of results
#[derive(Clone, Debug, Default)]
pub struct Page {
    /// Descriptors on this page
    pub descriptors: Vec<RawDescriptor>,
    /// Where to continue, or `None` when the source is exhausted
    pub next: Option<Cursor>,
}

/// Execution context handed to adapters for the duration of one job
///
/// Holds the job's HTTP client, the source's shared rate limiter and the injected
/// credential lookup. Cloning is cheap.
#[derive(Clone)]
pub struct SourceContext {
    /// Source this context belongs to
    pub source: SourceName,
    /// HTTP client shared by the whole job
    pub http: reqwest::Client,
    /// Token bucket shared with the workers downloading this source's items
    pub limiter: RateLimiter,
    /// Credential lookup
    pub credentials: Arc<dyn CredentialLookup>,
    /// Job cancellation; ends waits for a rate-limit token
    pub cancel: CancellationToken,
}

impl SourceContext {
    /// API key for this source, or `AuthError` when none is configured
    pub fn api_key(&self) -> Result<String, SourceError> {
        self.credentials
            .api_key(&self.source)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                SourceError::AuthError(format!("no API key configured for {}", self.source))
            })
    }

    /// Send a request after taking a rate-limit token; non-2xx becomes a [`SourceError`]
    ///
    /// Returns [`SourceError::Cancelled`] when the job is cancelled while waiting
    /// for the token; nothing is sent then.
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, SourceError> {
        if !self.limiter.acquire_until_cancelled(&self.cancel).await {
            return Err(SourceError::Cancelled);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(status, response.url().as_str()));
        }
        Ok(response)
    }

    /// Fetch and decode a JSON document
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SourceError> {
        let response = self.send(request).await?;
        let url = response.url().to_string();
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| SourceError::ParseError(format!("{}: {}", url, e)))
    }

    /// Fetch an HTML/text document
    pub async fn get_text(&self, request: reqwest::RequestBuilder) -> Result<String, SourceError> {
        let response = self.send(request).await?;
        Ok(response.text().await?)
    }
}

/// One upstream provider
///
/// Implementations only describe how to fetch a page; pagination limits, retries,
/// rate limiting and cancellation are applied by [`list_candidates`].
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Registry name of the source
    fn name(&self) -> SourceName;

    /// Published request budget, if the source declares one
    fn rate_limit(&self) -> Option<RateLimit> {
        None
    }

    /// Fetch one page of candidates
    ///
    /// `want` is how many more descriptors the caller still needs; adapters use it
    /// to size pages and bound detail-page lookups.
    async fn fetch_page(
        &self,
        ctx: &SourceContext,
        query: &str,
        cursor: Cursor,
        want: usize,
    ) -> Result<Page, SourceError>;
}

/// Lazy sequence of candidates produced by one source
pub type CandidateStream = BoxStream<'static, Result<RawDescriptor, SourceError>>;

/// Bounds applied while listing one source
#[derive(Clone, Debug)]
pub struct ListingLimits {
    /// Maximum descriptors to yield
    pub max_items: usize,
    /// Maximum pages to request
    pub max_pages: u32,
    /// Retry policy for transient page failures
    pub retry: RetryConfig,
}

struct ListState {
    adapter: Arc<dyn SourceAdapter>,
    ctx: SourceContext,
    query: String,
    limits: ListingLimits,
    cancel: CancellationToken,
    cursor: Option<Cursor>,
    buffer: VecDeque<RawDescriptor>,
    seen: HashSet<String>,
    yielded: usize,
    pages: u32,
    done: bool,
}

/// Turn an adapter into a lazy, finite candidate stream
///
/// The stream:
/// - yields at most `limits.max_items` descriptors, never the same `source_id` twice
/// - requests no further pages once that many are buffered, the source reports no
///   next page, a page adds nothing new, or `limits.max_pages` is reached
/// - retries transient page failures per `limits.retry`
/// - yields the first hard [`SourceError`] and then ends
/// - ends early when `cancel` fires
///
/// It is not restartable: once exhausted it stays exhausted.
pub fn list_candidates(
    adapter: Arc<dyn SourceAdapter>,
    ctx: SourceContext,
    query: String,
    limits: ListingLimits,
    cancel: CancellationToken,
) -> CandidateStream {
    let state = ListState {
        adapter,
        ctx,
        query,
        limits,
        cancel,
        cursor: Some(Cursor::start()),
        buffer: VecDeque::new(),
        seen: HashSet::new(),
        yielded: 0,
        pages: 0,
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.done || st.yielded >= st.limits.max_items || st.cancel.is_cancelled() {
                return None;
            }

            if let Some(descriptor) = st.buffer.pop_front() {
                st.yielded += 1;
                return Some((Ok(descriptor), st));
            }

            let cursor = st.cursor.take()?;
            if st.pages >= st.limits.max_pages {
                tracing::debug!(
                    source = %st.ctx.source,
                    pages = st.pages,
                    "page cap reached"
                );
                return None;
            }
            st.pages += 1;

            let want = st.limits.max_items - st.yielded;
            let attempted = download_with_retry(&st.limits.retry, &st.cancel, |_| {
                st.adapter.fetch_page(&st.ctx, &st.query, cursor, want)
            })
            .await;

            match attempted.result {
                Ok(page) => {
                    let listed = page.descriptors.len();
                    let mut fresh = 0;
                    for mut descriptor in page.descriptors {
                        // Same key the normalizer derives the item id from
                        descriptor.source_id = descriptor.source_id.trim().to_string();
                        if st.seen.insert(descriptor.source_id.clone()) {
                            st.buffer.push_back(descriptor);
                            fresh += 1;
                        }
                    }
                    tracing::debug!(
                        source = %st.ctx.source,
                        page = cursor.page,
                        section = cursor.section,
                        fresh,
                        "listing page fetched"
                    );
                    // A page that only repeats earlier results means the source is looping
                    st.cursor = if listed > 0 && fresh == 0 {
                        None
                    } else {
                        page.next
                    };
                }
                Err(SourceError::Cancelled) => return None,
                Err(_) if attempted.cancelled => return None,
                Err(e) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
            }
        }
    })
    .boxed()
}

/// Mapping from source name to adapter
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<SourceName, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the six built-in adapters pointed at `config.endpoints`
    pub fn with_default_sources(config: &Config) -> Self {
        let endpoints = &config.endpoints;
        let mut registry = Self::new();
        registry.register(Arc::new(unsplash::Unsplash::new(&endpoints.unsplash)));
        registry.register(Arc::new(pexels::Pexels::new(&endpoints.pexels)));
        registry.register(Arc::new(pixabay::Pixabay::new(&endpoints.pixabay)));
        registry.register(Arc::new(coverr::Coverr::new(&endpoints.coverr)));
        registry.register(Arc::new(mixkit::Mixkit::new(&endpoints.mixkit)));
        registry.register(Arc::new(videvo::Videvo::new(&endpoints.videvo)));
        registry
    }

    /// Add or replace an adapter under its own name
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.name(), adapter);
    }

    /// Look up an adapter
    pub fn get(&self, name: &SourceName) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &SourceName) -> bool {
        self.adapters.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<SourceName> {
        let mut names: Vec<_> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Serves `pages` fixed pages of numbered descriptors, optionally failing on one page
    struct Paged {
        per_page: usize,
        pages: u32,
        fail_on: Option<(u32, SourceError)>,
        calls: AtomicU32,
    }

    impl Paged {
        fn new(per_page: usize, pages: u32) -> Self {
            Self {
                per_page,
                pages,
                fail_on: None,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for Paged {
        fn name(&self) -> SourceName {
            SourceName::new("paged")
        }

        async fn fetch_page(
            &self,
            _ctx: &SourceContext,
            _query: &str,
            cursor: Cursor,
            _want: usize,
        ) -> Result<Page, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((page, err)) = &self.fail_on
                && *page == cursor.page
            {
                return Err(err.clone());
            }
            let start = (cursor.page as usize - 1) * self.per_page;
            let descriptors = (start..start + self.per_page)
                .map(|i| RawDescriptor::new(i.to_string(), "photo"))
                .collect();
            let next = (cursor.page < self.pages).then(|| cursor.next_page());
            Ok(Page { descriptors, next })
        }
    }

    fn ctx() -> SourceContext {
        SourceContext {
            source: SourceName::new("paged"),
            http: reqwest::Client::new(),
            limiter: RateLimiter::new(None),
            credentials: Arc::new(StaticCredentials::default()),
            cancel: CancellationToken::new(),
        }
    }

    fn limits(max_items: usize) -> ListingLimits {
        ListingLimits {
            max_items,
            max_pages: 10,
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_multiplier: 2.0,
                jitter: false,
            },
        }
    }

    async fn collect(stream: CandidateStream) -> Vec<Result<RawDescriptor, SourceError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn stops_at_max_items_without_fetching_more_pages() {
        let adapter = Arc::new(Paged::new(4, 10));
        let items = collect(list_candidates(
            adapter.clone(),
            ctx(),
            "q".into(),
            limits(6),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(items.len(), 6);
        assert!(items.iter().all(|r| r.is_ok()));
        assert_eq!(
            adapter.calls.load(Ordering::SeqCst),
            2,
            "6 items need exactly two pages of 4"
        );
    }

    #[tokio::test]
    async fn ends_when_source_is_exhausted() {
        let adapter = Arc::new(Paged::new(3, 2));
        let items = collect(list_candidates(
            adapter,
            ctx(),
            "q".into(),
            limits(50),
            CancellationToken::new(),
        ))
        .await;
        assert_eq!(items.len(), 6);
    }

    #[tokio::test]
    async fn error_is_yielded_once_then_stream_ends() {
        let mut adapter = Paged::new(2, 5);
        adapter.fail_on = Some((2, SourceError::AuthError("revoked".into())));
        let items = collect(list_candidates(
            Arc::new(adapter),
            ctx(),
            "q".into(),
            limits(50),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(items.len(), 3, "two items from page 1, then the error");
        assert!(matches!(items[2], Err(SourceError::AuthError(_))));
    }

    #[tokio::test]
    async fn transient_page_errors_are_retried() {
        struct Flaky(AtomicU32);

        #[async_trait]
        impl SourceAdapter for Flaky {
            fn name(&self) -> SourceName {
                SourceName::new("flaky")
            }

            async fn fetch_page(
                &self,
                _ctx: &SourceContext,
                _query: &str,
                _cursor: Cursor,
                _want: usize,
            ) -> Result<Page, SourceError> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(SourceError::NetworkError("reset".into()));
                }
                Ok(Page {
                    descriptors: vec![RawDescriptor::new("a", "photo")],
                    next: None,
                })
            }
        }

        let items = collect(list_candidates(
            Arc::new(Flaky(AtomicU32::new(0))),
            ctx(),
            "q".into(),
            limits(5),
            CancellationToken::new(),
        ))
        .await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }

    #[tokio::test]
    async fn repeated_pages_do_not_loop_forever() {
        struct Stuck;

        #[async_trait]
        impl SourceAdapter for Stuck {
            fn name(&self) -> SourceName {
                SourceName::new("stuck")
            }

            async fn fetch_page(
                &self,
                _ctx: &SourceContext,
                _query: &str,
                cursor: Cursor,
                _want: usize,
            ) -> Result<Page, SourceError> {
                Ok(Page {
                    descriptors: vec![
                        RawDescriptor::new("same-1", "video"),
                        RawDescriptor::new("same-2", "video"),
                    ],
                    next: Some(cursor.next_page()),
                })
            }
        }

        let items = collect(list_candidates(
            Arc::new(Stuck),
            ctx(),
            "q".into(),
            limits(10),
            CancellationToken::new(),
        ))
        .await;
        assert_eq!(items.len(), 2, "duplicates across pages are yielded once");
    }

    #[tokio::test]
    async fn cancelled_stream_yields_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let items = collect(list_candidates(
            Arc::new(Paged::new(3, 3)),
            ctx(),
            "q".into(),
            limits(9),
            cancel,
        ))
        .await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn padded_ids_match_their_trimmed_twins() {
        struct Padded;

        #[async_trait]
        impl SourceAdapter for Padded {
            fn name(&self) -> SourceName {
                SourceName::new("padded")
            }

            async fn fetch_page(
                &self,
                _ctx: &SourceContext,
                _query: &str,
                cursor: Cursor,
                _want: usize,
            ) -> Result<Page, SourceError> {
                let id = if cursor.page == 1 { "1" } else { " 1 " };
                Ok(Page {
                    descriptors: vec![RawDescriptor::new(id, "photo")],
                    next: Some(cursor.next_page()),
                })
            }
        }

        let items = collect(list_candidates(
            Arc::new(Padded),
            ctx(),
            "q".into(),
            limits(10),
            CancellationToken::new(),
        ))
        .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().source_id, "1");
    }

    #[tokio::test]
    async fn cancel_ends_wait_for_listing_token() {
        struct Remote;

        #[async_trait]
        impl SourceAdapter for Remote {
            fn name(&self) -> SourceName {
                SourceName::new("remote")
            }

            async fn fetch_page(
                &self,
                ctx: &SourceContext,
                _query: &str,
                _cursor: Cursor,
                _want: usize,
            ) -> Result<Page, SourceError> {
                ctx.send(ctx.http.get("http://127.0.0.1:9/search")).await?;
                Ok(Page::default())
            }
        }

        let cancel = CancellationToken::new();
        let mut context = ctx();
        context.limiter = RateLimiter::new(Some(RateLimit {
            requests: 1,
            per: Duration::from_secs(60),
            burst: 1,
        }));
        assert!(context.limiter.try_acquire());
        context.cancel = cancel.clone();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let items = tokio::time::timeout(
            Duration::from_secs(5),
            collect(list_candidates(
                Arc::new(Remote),
                context,
                "q".into(),
                limits(3),
                cancel,
            )),
        )
        .await
        .expect("cancel must end the token wait");
        assert!(items.is_empty(), "a cancelled listing is not a source error");
    }

    #[test]
    fn default_registry_knows_builtin_sources() {
        let registry = SourceRegistry::with_default_sources(&Config::default());
        let names: Vec<String> = registry.names().iter().map(|n| n.to_string()).collect();
        assert_eq!(
            names,
            vec!["coverr", "mixkit", "pexels", "pixabay", "unsplash", "videvo"]
        );
        assert!(registry.contains(&SourceName::new("Pexels")));
        assert!(!registry.contains(&SourceName::new("flickr")));
    }
}
