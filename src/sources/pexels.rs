//! Pexels photo and video search
//!
//! Photos are listed first (`/v1/search`), then videos (`/videos/search`).

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

use super::{Cursor, Page, RawDescriptor, SourceAdapter, SourceContext};
use crate::error::SourceError;
use crate::types::SourceName;

const LICENSE: &str = "Pexels License (free; attribution not required)";
const MAX_PER_PAGE: usize = 80;

const PHOTOS: usize = 0;
const VIDEOS: usize = 1;

/// Pexels API adapter; the key is sent verbatim in `Authorization`
#[derive(Clone, Debug)]
pub struct Pexels {
    base: String,
}

impl Pexels {
    /// Adapter talking to `base` (normally `https://api.pexels.com`)
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PhotoPage {
    #[serde(default)]
    photos: Vec<Photo>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: u64,
    width: Option<u32>,
    height: Option<u32>,
    url: Option<String>,
    alt: Option<String>,
    photographer: Option<String>,
    #[serde(default)]
    src: PhotoSrc,
}

#[derive(Debug, Default, Deserialize)]
struct PhotoSrc {
    original: Option<String>,
    large2x: Option<String>,
    large: Option<String>,
    medium: Option<String>,
    small: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoPage {
    #[serde(default)]
    videos: Vec<Video>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Video {
    id: u64,
    width: Option<u32>,
    height: Option<u32>,
    url: Option<String>,
    image: Option<String>,
    duration: Option<f64>,
    user: Option<VideoUser>,
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoUser {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    link: Option<String>,
    quality: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

impl From<Photo> for RawDescriptor {
    fn from(p: Photo) -> Self {
        let src = p.src;
        RawDescriptor {
            source_id: p.id.to_string(),
            kind_hint: "photo".into(),
            title: p.alt,
            page_url: p.url,
            download_url: src.original.or(src.large2x).or(src.large),
            preview_url: src.small.or(src.medium),
            author: p.photographer,
            license_hint: Some(LICENSE.into()),
            width: p.width,
            height: p.height,
            duration_seconds: None,
        }
    }
}

impl From<Video> for RawDescriptor {
    fn from(v: Video) -> Self {
        // HD renditions first, widest first within a quality
        let best = v
            .video_files
            .iter()
            .filter(|f| f.link.is_some())
            .max_by_key(|f| (f.quality.as_deref() == Some("hd"), f.width.unwrap_or(0)));

        RawDescriptor {
            // Photo and video ids share one number space
            source_id: format!("video-{}", v.id),
            kind_hint: "video".into(),
            title: None,
            page_url: v.url,
            download_url: best.and_then(|f| f.link.clone()),
            preview_url: v.image,
            author: v.user.and_then(|u| u.name),
            license_hint: Some(LICENSE.into()),
            width: best.and_then(|f| f.width).or(v.width),
            height: best.and_then(|f| f.height).or(v.height),
            duration_seconds: v.duration,
        }
    }
}

#[async_trait]
impl SourceAdapter for Pexels {
    fn name(&self) -> SourceName {
        SourceName::new("pexels")
    }

    async fn fetch_page(
        &self,
        ctx: &SourceContext,
        query: &str,
        cursor: Cursor,
        want: usize,
    ) -> Result<Page, SourceError> {
        let key = ctx.api_key()?;
        let per_page = want.clamp(1, MAX_PER_PAGE);
        let path = match cursor.section {
            PHOTOS => "v1/search",
            VIDEOS => "videos/search",
            _ => return Ok(Page::default()),
        };
        let request = ctx
            .http
            .get(format!("{}/{}", self.base, path))
            .query(&[
                ("query", query.to_string()),
                ("page", cursor.page.to_string()),
                ("per_page", per_page.to_string()),
            ])
            .header(AUTHORIZATION, key);

        let (descriptors, has_next): (Vec<RawDescriptor>, bool) = if cursor.section == PHOTOS {
            let page: PhotoPage = ctx.get_json(request).await?;
            let has_next = page.next_page.is_some() && !page.photos.is_empty();
            (page.photos.into_iter().map(Into::into).collect(), has_next)
        } else {
            let page: VideoPage = ctx.get_json(request).await?;
            let has_next = page.next_page.is_some() && !page.videos.is_empty();
            (page.videos.into_iter().map(Into::into).collect(), has_next)
        };

        let next = if has_next {
            Some(cursor.next_page())
        } else if cursor.section == PHOTOS {
            Some(cursor.next_section())
        } else {
            None
        };

        Ok(Page { descriptors, next })
    }
}
