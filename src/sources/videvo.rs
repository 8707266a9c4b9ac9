//! Videvo search listing plus per-clip detail pages
//!
//! Licensing on Videvo varies per clip, which the license hint says.

use async_trait::async_trait;
use url::Url;

use super::html;
use super::{Cursor, Page, RawDescriptor, SourceAdapter, SourceContext};
use crate::config::RateLimit;
use crate::error::SourceError;
use crate::types::SourceName;

const LICENSE: &str = "Videvo (license varies; check the clip page)";
const CLIP_PATH: &str = "/video/";

/// Scraping adapter for videvo.net
#[derive(Clone, Debug)]
pub struct Videvo {
    base: String,
}

impl Videvo {
    /// Adapter scraping `base` (normally `https://www.videvo.net`)
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

fn clip_links(body: &str, base: &Url, want: usize) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for anchor in html::anchors(body) {
        if !anchor.href.starts_with(CLIP_PATH) {
            continue;
        }
        if let Some(link) = html::resolve(base, &anchor.href)
            && !links.contains(&link)
        {
            links.push(link);
            if links.len() >= want {
                break;
            }
        }
    }
    links
}

fn parse_detail(body: &str, page_url: &str) -> RawDescriptor {
    let base = Url::parse(page_url).ok();
    let resolve = |href: &str| base.as_ref().and_then(|b| html::resolve(b, href));

    RawDescriptor {
        source_id: html::slug(page_url).unwrap_or_else(|| page_url.to_string()),
        kind_hint: "video".into(),
        title: html::meta_content(body, "og:title").or_else(|| html::page_title(body)),
        page_url: Some(page_url.to_string()),
        download_url: html::first_video_source(body).and_then(|s| resolve(&s)),
        preview_url: html::meta_content(body, "og:image").and_then(|p| resolve(&p)),
        license_hint: Some(LICENSE.into()),
        ..Default::default()
    }
}

#[async_trait]
impl SourceAdapter for Videvo {
    fn name(&self) -> SourceName {
        SourceName::new("videvo")
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
        let base = html::base_url(&self.base)?;
        let request = ctx
            .http
            .get(format!("{}/search/", self.base))
            .query(&[("q", query.to_string()), ("page", cursor.page.to_string())]);
        let body = ctx.get_text(request).await?;

        let links = clip_links(&body, &base, want);
        html::ensure_parsed(&body, links.len(), "clip links", cursor.page == 1)?;

        let mut descriptors = Vec::with_capacity(links.len());
        for link in &links {
            if let Some(detail) = html::fetch_detail(ctx, link).await? {
                descriptors.push(parse_detail(&detail, link));
            }
        }

        let next = (!links.is_empty()).then(|| cursor.next_page());
        Ok(Page { descriptors, next })
    }
}
