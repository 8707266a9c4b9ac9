//! Fetcher setups for integration tests

use media_dl::config::{Config, RateLimit};
use media_dl::sources::{SourceAdapter, SourceRegistry, StaticCredentials};
use media_dl::MediaFetcher;
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

/// Defaults with millisecond backoff and effectively unlimited request rates
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.retry.initial_delay = Duration::from_millis(5);
    config.retry.max_delay = Duration::from_millis(25);
    config.retry.jitter = false;
    config.rate_limit.default = RateLimit::per_second(1000);
    for scraped in ["coverr", "mixkit", "videvo"] {
        config
            .rate_limit
            .per_source
            .insert(scraped.to_string(), RateLimit::per_second(1000));
    }
    config
}

/// Fetcher over the given adapters only
pub fn fetcher_with(config: Config, adapters: Vec<Arc<dyn SourceAdapter>>) -> MediaFetcher {
    let mut registry = SourceRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    MediaFetcher::new(config, registry, Arc::new(StaticCredentials::new()))
        .expect("test config must validate")
}

/// Fetcher with the built-in sources all pointed at `server`
pub fn builtin_fetcher(server: &MockServer, credentials: StaticCredentials) -> MediaFetcher {
    let mut config = fast_config();
    let uri = server.uri();
    config.endpoints.unsplash = uri.clone();
    config.endpoints.pexels = uri.clone();
    config.endpoints.pixabay = format!("{uri}/api");
    config.endpoints.coverr = uri.clone();
    config.endpoints.mixkit = uri.clone();
    config.endpoints.videvo = uri;

    let registry = SourceRegistry::with_default_sources(&config);
    MediaFetcher::new(config, registry, Arc::new(credentials)).expect("test config must validate")
}
