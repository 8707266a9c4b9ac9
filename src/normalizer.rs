//! Conversion of raw source descriptors into [`MediaItem`]s
//!
//! Pure: no network or disk access. Anything that cannot become a downloadable
//! item is rejected with [`ItemError::InvalidContent`].

use url::Url;

use crate::error::ItemError;
use crate::sources::RawDescriptor;
use crate::types::{MediaItem, MediaKind, SourceName};

/// Map a source-specific type indicator to a [`MediaKind`]
pub fn kind_from_hint(hint: &str) -> Option<MediaKind> {
    let hint = hint.trim().to_ascii_lowercase();
    // Pixabay reports vectors as "vector/svg" or "vector/ai"
    let head = hint.split('/').next().unwrap_or_default();
    match head {
        "photo" | "image" | "picture" | "illustration" | "vector" => Some(MediaKind::Image),
        "video" | "film" | "animation" | "clip" | "footage" => Some(MediaKind::Video),
        _ => None,
    }
}

/// Resolve a download URL to an absolute http(s) URL
///
/// Relative URLs are resolved against `page_url` when there is one.
fn resolve_download_url(raw: &str, page_url: Option<&str>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(page_url?).ok()?;
            base.join(raw).ok()?
        }
        Err(_) => return None,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn non_empty(s: Option<&String>) -> Option<String> {
    s.map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Normalize one raw descriptor from `source`
///
/// # Errors
///
/// [`ItemError::InvalidContent`] when the id is empty, the kind hint is unknown, or
/// no resolvable download URL exists.
pub fn normalize(raw: &RawDescriptor, source: &SourceName) -> Result<MediaItem, ItemError> {
    let source_id = raw.source_id.trim();
    if source_id.is_empty() {
        return Err(ItemError::InvalidContent("descriptor has no source id".into()));
    }

    let kind = kind_from_hint(&raw.kind_hint).ok_or_else(|| {
        ItemError::InvalidContent(format!("unknown media type '{}'", raw.kind_hint))
    })?;

    let download_url = raw
        .download_url
        .as_deref()
        .and_then(|u| resolve_download_url(u, raw.page_url.as_deref()))
        .ok_or_else(|| ItemError::InvalidContent("no resolvable download URL".into()))?;

    let title =
        non_empty(raw.title.as_ref()).unwrap_or_else(|| format!("{}-{}", source, source_id));

    Ok(MediaItem {
        id: format!("{}:{}", source, source_id),
        source_name: source.clone(),
        source_id: source_id.to_string(),
        kind,
        title,
        source_url: non_empty(raw.page_url.as_ref()),
        download_url,
        preview_url: non_empty(raw.preview_url.as_ref()),
        author: non_empty(raw.author.as_ref()),
        license_hint: non_empty(raw.license_hint.as_ref()),
        width: raw.width.filter(|w| *w > 0),
        height: raw.height.filter(|h| *h > 0),
        duration_seconds: raw.duration_seconds.filter(|d| *d > 0.0),
        content_hash: None,
    })
}
