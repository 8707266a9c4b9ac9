//! Pixabay image and video search
//!
//! Images are listed first (`/api/`), then videos (`/api/videos/`). The key travels
//! as a query parameter.

use async_trait::async_trait;
use serde::Deserialize;

use super::{Cursor, Page, RawDescriptor, SourceAdapter, SourceContext};
use crate::error::SourceError;
use crate::types::SourceName;

const LICENSE: &str = "Pixabay Content License (free; see site)";
// The API rejects per_page outside 3..=200
const MIN_PER_PAGE: usize = 3;
const MAX_PER_PAGE: usize = 200;

const IMAGES: usize = 0;
const VIDEOS: usize = 1;

/// Pixabay API adapter
#[derive(Clone, Debug)]
pub struct Pixabay {
    base: String,
}

impl Pixabay {
    /// Adapter talking to `base` (normally `https://pixabay.com/api`)
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse<T> {
    #[serde(default)]
    total_hits: u64,
    #[serde(default = "Vec::new")]
    hits: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageHit {
    id: u64,
    #[serde(rename = "pageURL")]
    page_url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    tags: Option<String>,
    #[serde(rename = "previewURL")]
    preview_url: Option<String>,
    #[serde(rename = "webformatURL")]
    webformat_url: Option<String>,
    #[serde(rename = "largeImageURL")]
    large_image_url: Option<String>,
    image_width: Option<u32>,
    image_height: Option<u32>,
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoHit {
    id: u64,
    #[serde(rename = "pageURL")]
    page_url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    tags: Option<String>,
    duration: Option<f64>,
    picture_id: Option<String>,
    #[serde(default)]
    videos: VideoVariants,
    user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoVariants {
    large: Option<VideoVariant>,
    medium: Option<VideoVariant>,
    small: Option<VideoVariant>,
    tiny: Option<VideoVariant>,
}

#[derive(Debug, Clone, Deserialize)]
struct VideoVariant {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    thumbnail: Option<String>,
}

fn title_from_tags(tags: Option<String>) -> Option<String> {
    tags.map(|t| t.split(',').map(str::trim).collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
}

impl From<ImageHit> for RawDescriptor {
    fn from(h: ImageHit) -> Self {
        RawDescriptor {
            source_id: h.id.to_string(),
            kind_hint: h.kind.unwrap_or_else(|| "photo".into()),
            title: title_from_tags(h.tags),
            page_url: h.page_url,
            download_url: h.large_image_url.or(h.webformat_url),
            preview_url: h.preview_url,
            author: h.user,
            license_hint: Some(LICENSE.into()),
            width: h.image_width,
            height: h.image_height,
            duration_seconds: None,
        }
    }
}

impl From<VideoHit> for RawDescriptor {
    fn from(h: VideoHit) -> Self {
        let v = h.videos;
        let best = [v.large, v.medium, v.small, v.tiny]
            .into_iter()
            .flatten()
            .find(|variant| variant.url.as_deref().is_some_and(|u| !u.is_empty()));
        let preview = best
            .as_ref()
            .and_then(|b| b.thumbnail.clone())
            .or_else(|| {
                h.picture_id
                    .map(|id| format!("https://i.vimeocdn.com/video/{}_295x166.jpg", id))
            });

        RawDescriptor {
            source_id: format!("video-{}", h.id),
            kind_hint: h.kind.unwrap_or_else(|| "film".into()),
            title: title_from_tags(h.tags),
            page_url: h.page_url,
            download_url: best.as_ref().and_then(|b| b.url.clone()),
            preview_url: preview,
            author: h.user,
            license_hint: Some(LICENSE.into()),
            width: best.as_ref().and_then(|b| b.width),
            height: best.as_ref().and_then(|b| b.height),
            duration_seconds: h.duration,
        }
    }
}

#[async_trait]
impl SourceAdapter for Pixabay {
    fn name(&self) -> SourceName {
        SourceName::new("pixabay")
    }

    async fn fetch_page(
        &self,
        ctx: &SourceContext,
        query: &str,
        cursor: Cursor,
        want: usize,
    ) -> Result<Page, SourceError> {
        let key = ctx.api_key()?;
        let per_page = want.clamp(MIN_PER_PAGE, MAX_PER_PAGE);
        let url = match cursor.section {
            IMAGES => format!("{}/", self.base),
            VIDEOS => format!("{}/videos/", self.base),
            _ => return Ok(Page::default()),
        };
        let request = ctx.http.get(url).query(&[
            ("key", key),
            ("q", query.to_string()),
            ("page", cursor.page.to_string()),
            ("per_page", per_page.to_string()),
        ]);

        let (descriptors, total_hits): (Vec<RawDescriptor>, u64) = if cursor.section == IMAGES {
            let response: SearchResponse<ImageHit> = ctx.get_json(request).await?;
            let hits = response.hits.into_iter().map(Into::into).collect();
            (hits, response.total_hits)
        } else {
            let response: SearchResponse<VideoHit> = ctx.get_json(request).await?;
            let hits = response.hits.into_iter().map(Into::into).collect();
            (hits, response.total_hits)
        };

        let seen_so_far = u64::from(cursor.page) * per_page as u64;
        let next = if !descriptors.is_empty() && seen_so_far < total_hits {
            Some(cursor.next_page())
        } else if cursor.section == IMAGES {
            Some(cursor.next_section())
        } else {
            None
        };

        Ok(Page { descriptors, next })
    }
}
