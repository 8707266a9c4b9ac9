//! Coverr search listing
//!
//! Result cards embed `<video>`/`<source>` elements directly, so one listing page
//! yields complete descriptors without visiting detail pages.

use async_trait::async_trait;
use std::collections::HashSet;

use super::html;
use super::{Cursor, Page, RawDescriptor, SourceAdapter, SourceContext};
use crate::config::RateLimit;
use crate::error::SourceError;
use crate::types::SourceName;

const LICENSE: &str = "Coverr Free License (see site)";

/// Scraping adapter for coverr.co
#[derive(Clone, Debug)]
pub struct Coverr {
    base: String,
}

impl Coverr {
    /// Adapter scraping `base` (normally `https://coverr.co`)
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

/// Videos embedded in a listing page, deduplicated by resolved URL
fn parse_listing(body: &str, listing_url: &str, want: usize) -> Vec<RawDescriptor> {
    let Ok(base) = url::Url::parse(listing_url) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut poster: Option<String> = None;
    let mut descriptors = Vec::new();

    for tag in html::find_tags(body, &["video", "source"]) {
        if tag.name == "video" {
            poster = tag
                .first_attr(&["poster", "data-poster"])
                .and_then(|p| html::resolve(&base, p));
        }
        let Some(src) = tag
            .first_attr(&["src", "data-src"])
            .and_then(|s| html::resolve(&base, s))
        else {
            continue;
        };
        if !seen.insert(src.clone()) {
            continue;
        }

        descriptors.push(RawDescriptor {
            source_id: html::slug(&src).unwrap_or_else(|| src.clone()),
            kind_hint: "video".into(),
            title: tag.first_attr(&["title", "aria-label"]).map(str::to_string),
            page_url: Some(listing_url.to_string()),
            download_url: Some(src),
            preview_url: poster.clone(),
            license_hint: Some(LICENSE.into()),
            ..Default::default()
        });
        if descriptors.len() >= want {
            break;
        }
    }
    descriptors
}

#[async_trait]
impl SourceAdapter for Coverr {
    fn name(&self) -> SourceName {
        SourceName::new("coverr")
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        Some(RateLimit::per_second(3))
    }

    async fn fetch_page(
        &self,
        ctx: &SourceContext,
        query: &str,
        cursor: Cursor,
        want: usize,
    ) -> Result<Page, SourceError> {
        let request = ctx
            .http
            .get(format!("{}/search", self.base))
            .query(&[("q", query.to_string()), ("page", cursor.page.to_string())]);
        let response = ctx.send(request).await?;
        let listing_url = response.url().to_string();
        let body = response.text().await?;

        let descriptors = parse_listing(&body, &listing_url, want);
        html::ensure_parsed(&body, descriptors.len(), "videos", cursor.page == 1)?;

        let next = (!descriptors.is_empty()).then(|| cursor.next_page());
        Ok(Page { descriptors, next })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <div class="card">
          <video poster="/posters/waves.jpg" muted>
            <source src="https://cdn.coverr.co/videos/waves-at-dusk.mp4" type="video/mp4">
            <source src="https://cdn.coverr.co/videos/waves-at-dusk.mp4" type="video/mp4">
          </video>
        </div>
        <div class="card">
          <video data-src="/videos/lighthouse-beam.mp4" title="Lighthouse beam"></video>
        </div>
    "#;

    #[test]
    fn listing_yields_unique_resolved_videos() {
        let found = parse_listing(LISTING, "https://coverr.co/search?q=sea", 10);
        assert_eq!(found.len(), 2, "repeated sources collapse into one descriptor");

        assert_eq!(found[0].source_id, "waves-at-dusk");
        assert_eq!(
            found[0].preview_url.as_deref(),
            Some("https://coverr.co/posters/waves.jpg")
        );
        assert_eq!(
            found[1].download_url.as_deref(),
            Some("https://coverr.co/videos/lighthouse-beam.mp4")
        );
        assert_eq!(found[1].title.as_deref(), Some("Lighthouse beam"));
        assert_eq!(found[1].preview_url, None, "poster does not leak across cards");
    }

    #[test]
    fn listing_respects_want() {
        let found = parse_listing(LISTING, "https://coverr.co/search?q=sea", 1);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn redesigned_page_is_a_parse_error() {
        let body = "<html><body><div class='grid'></div></body></html>";
        let found = parse_listing(body, "https://coverr.co/search?q=sea", 10);
        let err = html::ensure_parsed(body, found.len(), "videos", true).unwrap_err();
        assert!(matches!(err, SourceError::ParseError(_)));
    }
}
