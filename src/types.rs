//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FailureReason, RequestError, Result, SourceError};
use crate::sources::SourceRegistry;

/// Unique identifier for a job within one [`MediaFetcher`](crate::MediaFetcher)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of an upstream source, as registered in the [`SourceRegistry`]
///
/// Names are case-insensitive; they are stored lowercased.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceName(String);

impl SourceName {
    /// Create a source name (trimmed, lowercased)
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    /// Borrow the name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SourceName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Kind of media an item holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image
    Image,
    /// Video clip
    Video,
}

impl MediaKind {
    /// Folder name used by kind-based output layouts
    pub fn folder(&self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Image => f.write_str("image"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// One candidate media item in the common shape
///
/// Created by the normalizer and never mutated afterwards; the `Downloaded`
/// outcome carries a copy with `content_hash` filled in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Source-qualified identifier (`"{source}:{source_id}"`)
    pub id: String,
    /// Source the item was listed by
    pub source_name: SourceName,
    /// Identifier within the source
    pub source_id: String,
    /// Image or video
    pub kind: MediaKind,
    /// Human-readable title
    pub title: String,
    /// Page on the source site describing the item
    pub source_url: Option<String>,
    /// Resolved payload URL
    pub download_url: String,
    /// Thumbnail URL, if the source offers one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// Author or photographer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// License note shown to users (license terms vary per source)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_hint: Option<String>,
    /// Pixel width
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Clip duration for videos
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// SHA-256 of the downloaded bytes (hex), known only after download
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl MediaItem {
    /// Pre-download identity key
    pub fn identity(&self) -> (SourceName, String) {
        (self.source_name.clone(), self.source_id.clone())
    }

    /// Copy of this item with the content hash recorded
    pub fn with_content_hash(&self, hash: &str) -> Self {
        Self {
            content_hash: Some(hash.to_string()),
            ..self.clone()
        }
    }
}

/// How downloaded files are arranged under the output directory
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// Everything directly in the output directory
    #[default]
    Flat,
    /// `{output}/{source}/`
    BySource,
    /// `{output}/images/` and `{output}/videos/`
    ByKind,
    /// `{output}/{source}/images/` and `{output}/{source}/videos/`
    BySourceAndKind,
}

impl OutputLayout {
    /// Directory an item of `kind` from `source` lands in
    pub fn directory_for(&self, root: &Path, source: &SourceName, kind: MediaKind) -> PathBuf {
        match self {
            OutputLayout::Flat => root.to_path_buf(),
            OutputLayout::BySource => root.join(source.as_str()),
            OutputLayout::ByKind => root.join(kind.folder()),
            OutputLayout::BySourceAndKind => root.join(source.as_str()).join(kind.folder()),
        }
    }
}

/// One job's worth of work, as submitted by a front end
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Search text passed to every source
    pub query: String,
    /// Upper bound on descriptors requested from each source
    pub items_per_source: usize,
    /// Sources to query (all must be registered)
    pub sources: BTreeSet<SourceName>,
    /// Root directory for downloaded files
    pub output_dir: PathBuf,
    /// Worker pool size
    #[serde(default = "default_request_concurrency")]
    pub concurrency: usize,
    /// File arrangement under `output_dir`
    #[serde(default)]
    pub layout: OutputLayout,
}

fn default_request_concurrency() -> usize {
    8
}

impl FetchRequest {
    /// Build a request with default concurrency and a flat layout
    pub fn new<I, S>(
        query: impl Into<String>,
        items_per_source: usize,
        sources: I,
        output_dir: impl Into<PathBuf>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceName>,
    {
        Self {
            query: query.into(),
            items_per_source,
            sources: sources.into_iter().map(Into::into).collect(),
            output_dir: output_dir.into(),
            concurrency: default_request_concurrency(),
            layout: OutputLayout::default(),
        }
    }

    /// Override the worker pool size
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Override the output layout
    #[must_use]
    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Number of items the caller asked for in total
    pub fn requested(&self) -> usize {
        self.items_per_source.saturating_mul(self.sources.len())
    }

    /// Check the request against the registered adapters
    ///
    /// Performs no I/O; an invalid request is rejected before anything runs.
    pub fn validate(&self, registry: &SourceRegistry) -> std::result::Result<(), RequestError> {
        if self.query.trim().is_empty() {
            return Err(RequestError::EmptyQuery);
        }
        if self.items_per_source == 0 {
            return Err(RequestError::ZeroItems);
        }
        if self.concurrency == 0 {
            return Err(RequestError::ZeroConcurrency);
        }
        if self.sources.is_empty() {
            return Err(RequestError::NoSources);
        }
        if let Some(unknown) = self.sources.iter().find(|s| !registry.contains(s)) {
            return Err(RequestError::UnknownSource(unknown.clone()));
        }
        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(RequestError::OutputDir {
                path: self.output_dir.clone(),
                reason: "path exists and is not a directory".to_string(),
            });
        }
        Ok(())
    }
}

/// Why an item was skipped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Same bytes were already written in this job or exist in the output directory
    Duplicate,
}

/// Terminal result for one item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Payload written under `local_path`
    Downloaded {
        /// Item with `content_hash` set
        item: MediaItem,
        /// Final path of the file
        local_path: PathBuf,
        /// Bytes written
        bytes: u64,
    },
    /// Payload not kept
    Skipped {
        /// Item with `content_hash` set when the duplicate was found after download
        item: MediaItem,
        /// Why it was skipped
        reason: SkipReason,
    },
    /// Item could not be downloaded
    Failed {
        /// The item as listed
        item: MediaItem,
        /// Last failure reason
        reason: FailureReason,
        /// Attempts made (0 when cancelled before starting)
        attempts: u32,
        /// Last error message
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Outcome {
    /// The item this outcome is about
    pub fn item(&self) -> &MediaItem {
        match self {
            Outcome::Downloaded { item, .. }
            | Outcome::Skipped { item, .. }
            | Outcome::Failed { item, .. } => item,
        }
    }

    /// True for `Downloaded`
    pub fn is_downloaded(&self) -> bool {
        matches!(self, Outcome::Downloaded { .. })
    }
}

/// Per-source collection note
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceNote {
    /// Source name
    pub source: SourceName,
    /// Unique descriptors the source contributed to the queue
    pub collected: usize,
    /// Set when the source degraded before producing everything asked of it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SourceError>,
}

/// A descriptor the normalizer refused; no item exists for it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RejectedDescriptor {
    /// Source that listed it
    pub source: SourceName,
    /// Identifier within the source
    pub source_id: String,
    /// Why it was refused
    pub reason: String,
}

/// Final report of one job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Job identifier
    pub job_id: JobId,
    /// Query the job ran
    pub query: String,
    /// `items_per_source × |sources|`
    pub requested: usize,
    /// Count of `Downloaded` outcomes
    pub downloaded: usize,
    /// Count of `Skipped` outcomes
    pub skipped: usize,
    /// Count of `Failed` outcomes
    pub failed: usize,
    /// Outcomes in completion order
    pub outcomes: Vec<Outcome>,
    /// One note per requested source
    pub source_notes: Vec<SourceNote>,
    /// Descriptors dropped by the normalizer
    pub rejected: Vec<RejectedDescriptor>,
    /// Whether the job was cancelled
    pub cancelled: bool,
    /// When the job started
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl JobSummary {
    /// Sources that degraded, with their errors
    pub fn failed_sources(&self) -> impl Iterator<Item = (&SourceName, &SourceError)> {
        self.source_notes
            .iter()
            .filter_map(|note| note.error.as_ref().map(|e| (&note.source, e)))
    }

    /// Failed outcomes only
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::Failed { .. }))
    }

    /// Write the summary as pretty JSON (the manifest a front end keeps next to the files)
    pub fn write_manifest(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "manifest written");
        Ok(())
    }
}

/// Job lifecycle phases
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Adapters are listing candidates
    Collecting,
    /// First descriptors are flowing into the work queue
    Queuing,
    /// All collectors finished; workers are draining what is left
    Draining,
    /// Queue empty, workers joined, summary sealed
    Finalized,
}

/// Running counts for progress displays
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Unique descriptors queued so far
    pub collected: usize,
    /// Downloaded so far
    pub downloaded: usize,
    /// Skipped so far
    pub skipped: usize,
    /// Failed so far
    pub failed: usize,
}

impl Progress {
    /// Items with a terminal outcome
    pub fn finished(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }
}

/// Progress events pushed to subscribers
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job moved to a new phase
    PhaseChanged {
        /// Job
        job_id: JobId,
        /// New phase
        phase: JobPhase,
    },

    /// A source finished listing
    SourceCompleted {
        /// Job
        job_id: JobId,
        /// Source
        source: SourceName,
        /// Unique descriptors it contributed
        collected: usize,
    },

    /// A source degraded
    SourceFailed {
        /// Job
        job_id: JobId,
        /// Source
        source: SourceName,
        /// Why
        error: SourceError,
    },

    /// An item reached its terminal outcome
    ItemFinished {
        /// Job
        job_id: JobId,
        /// The outcome
        outcome: Box<Outcome>,
        /// Counts including this outcome
        progress: Progress,
    },

    /// Job sealed
    JobFinished {
        /// Job
        job_id: JobId,
        /// Final counts
        progress: Progress,
        /// Whether the job was cancelled
        cancelled: bool,
    },
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
