//! API key lookup for sources that require one

use std::collections::HashMap;

use crate::types::SourceName;

/// Resolves the API key for a source
///
/// Injected into [`MediaFetcher`](crate::MediaFetcher) so keys never need to live
/// in configuration files.
pub trait CredentialLookup: Send + Sync {
    /// Key for `source`, or `None` when none is configured
    fn api_key(&self, source: &SourceName) -> Option<String>;
}

/// Reads `<SOURCE>_KEY` from the process environment (`UNSPLASH_KEY`, `PEXELS_KEY`, ...)
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvCredentials;

impl EnvCredentials {
    /// Environment variable consulted for `source`
    pub fn var_name(source: &SourceName) -> String {
        format!("{}_KEY", source.as_str().to_uppercase().replace('-', "_"))
    }
}

impl CredentialLookup for EnvCredentials {
    fn api_key(&self, source: &SourceName) -> Option<String> {
        std::env::var(Self::var_name(source)).ok()
    }
}

/// Fixed in-memory keys
#[derive(Clone, Debug, Default)]
pub struct StaticCredentials {
    keys: HashMap<SourceName, String>,
}

impl StaticCredentials {
    /// No keys
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key for `source`
    pub fn with(mut self, source: impl Into<SourceName>, key: impl Into<String>) -> Self {
        self.keys.insert(source.into(), key.into());
        self
    }
}

impl CredentialLookup for StaticCredentials {
    fn api_key(&self, source: &SourceName) -> Option<String> {
        self.keys.get(source).cloned()
    }
}
