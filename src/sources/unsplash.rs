//! Unsplash photo search (`/search/photos`)

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

use super::{Cursor, Page, RawDescriptor, SourceAdapter, SourceContext};
use crate::error::SourceError;
use crate::types::SourceName;

const LICENSE: &str = "Unsplash License (free for commercial use; see site)";
const MAX_PER_PAGE: usize = 30;

/// Unsplash API adapter; requires an access key sent as `Client-ID`
#[derive(Clone, Debug)]
pub struct Unsplash {
    base: String,
}

impl Unsplash {
    /// Adapter talking to `base` (normally `https://api.unsplash.com`)
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_pages: u32,
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: String,
    description: Option<String>,
    alt_description: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    urls: Urls,
    #[serde(default)]
    links: Links,
    user: Option<User>,
}

#[derive(Debug, Default, Deserialize)]
struct Urls {
    full: Option<String>,
    regular: Option<String>,
    small: Option<String>,
    thumb: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    html: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    name: Option<String>,
}

impl From<Photo> for RawDescriptor {
    fn from(p: Photo) -> Self {
        RawDescriptor {
            source_id: p.id,
            kind_hint: "photo".into(),
            title: p.alt_description.or(p.description),
            page_url: p.links.html,
            download_url: p.urls.full.or(p.urls.regular),
            preview_url: p.urls.small.or(p.urls.thumb),
            author: p.user.and_then(|u| u.name),
            license_hint: Some(LICENSE.into()),
            width: p.width,
            height: p.height,
            duration_seconds: None,
        }
    }
}

#[async_trait]
impl SourceAdapter for Unsplash {
    fn name(&self) -> SourceName {
        SourceName::new("unsplash")
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
        let request = ctx
            .http
            .get(format!("{}/search/photos", self.base))
            .query(&[
                ("query", query.to_string()),
                ("page", cursor.page.to_string()),
                ("per_page", per_page.to_string()),
            ])
            .header(AUTHORIZATION, format!("Client-ID {}", key));

        let response: SearchResponse = ctx.get_json(request).await?;
        let more = cursor.page < response.total_pages && !response.results.is_empty();

        Ok(Page {
            descriptors: response.results.into_iter().map(Into::into).collect(),
            next: more.then(|| cursor.next_page()),
        })
    }
}
