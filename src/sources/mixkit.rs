//! Mixkit search listing plus per-clip detail pages

use async_trait::async_trait;
use url::Url;

use super::html;
use super::{Cursor, Page, RawDescriptor, SourceAdapter, SourceContext};
use crate::config::RateLimit;
use crate::error::SourceError;
use crate::types::SourceName;

const LICENSE: &str = "Mixkit License (free; see site)";
const CLIP_PATH: &str = "/free-stock-video/";

/// Scraping adapter for mixkit.co
#[derive(Clone, Debug)]
pub struct Mixkit {
    base: String,
}

impl Mixkit {
    /// Adapter scraping `base` (normally `https://mixkit.co`)
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

/// Unique clip page links on a listing page, in order, at most `want`
fn clip_links(body: &str, base: &Url, want: usize) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for anchor in html::anchors(body) {
        let Some(link) = html::resolve(base, &anchor.href) else {
            continue;
        };
        let is_clip = Url::parse(&link).is_ok_and(|u| {
            u.path()
                .strip_prefix(CLIP_PATH)
                .is_some_and(|rest| !rest.trim_matches('/').is_empty())
        });
        if is_clip && !links.contains(&link) {
            links.push(link);
            if links.len() >= want {
                break;
            }
        }
    }
    links
}

/// Descriptor for one clip page; the download link may be missing
fn parse_detail(body: &str, page_url: &str) -> RawDescriptor {
    let base = Url::parse(page_url).ok();
    let resolve = |href: &str| base.as_ref().and_then(|b| html::resolve(b, href));

    let download = html::anchors(body)
        .into_iter()
        .find(|a| a.text.to_lowercase().contains("download"))
        .and_then(|a| resolve(&a.href))
        .or_else(|| html::first_video_source(body).and_then(|s| resolve(&s)));

    RawDescriptor {
        source_id: html::slug(page_url).unwrap_or_else(|| page_url.to_string()),
        kind_hint: "video".into(),
        title: html::meta_content(body, "og:title").or_else(|| html::page_title(body)),
        page_url: Some(page_url.to_string()),
        download_url: download,
        preview_url: html::meta_content(body, "og:image").and_then(|p| resolve(&p)),
        license_hint: Some(LICENSE.into()),
        ..Default::default()
    }
}

#[async_trait]
impl SourceAdapter for Mixkit {
    fn name(&self) -> SourceName {
        SourceName::new("mixkit")
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
        let mut request = ctx.http.get(format!(
            "{}/search/{}/",
            self.base,
            urlencoding::encode(query)
        ));
        if cursor.page > 1 {
            request = request.query(&[("page", cursor.page.to_string())]);
        }
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

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_links_are_unique_and_scoped() {
        let body = r#"
            <a href="/free-stock-video/lighthouse-at-night-4410/">Lighthouse</a>
            <a href="/free-stock-video/lighthouse-at-night-4410/"><img src="t.jpg"></a>
            <a href="/free-stock-video/">All videos</a>
            <a href="/free-sound-effects/waves/">Waves</a>
            <a href="https://mixkit.co/free-stock-video/foggy-coast-991/">Fog</a>
        "#;
        let base = html::base_url("https://mixkit.co").unwrap();
        let links = clip_links(body, &base, 10);
        assert_eq!(
            links,
            vec![
                "https://mixkit.co/free-stock-video/lighthouse-at-night-4410/",
                "https://mixkit.co/free-stock-video/foggy-coast-991/",
            ]
        );
        assert_eq!(clip_links(body, &base, 1).len(), 1);
    }

    #[test]
    fn detail_prefers_download_anchor() {
        let body = r#"
            <meta property="og:title" content="Lighthouse at night">
            <meta property="og:image" content="/thumbs/4410.jpg">
            <video><source src="/preview/4410-360.mp4"></video>
            <a class="btn" href="/videos/4410-1080.mp4">Free Download</a>
        "#;
        let page = "https://mixkit.co/free-stock-video/lighthouse-at-night-4410/";
        let d = parse_detail(body, page);
        assert_eq!(d.source_id, "lighthouse-at-night-4410");
        assert_eq!(
            d.download_url.as_deref(),
            Some("https://mixkit.co/videos/4410-1080.mp4")
        );
        assert_eq!(
            d.preview_url.as_deref(),
            Some("https://mixkit.co/thumbs/4410.jpg")
        );
        assert_eq!(d.title.as_deref(), Some("Lighthouse at night"));
    }

    #[test]
    fn detail_falls_back_to_video_source() {
        let body = r#"<title>Fog</title><video><source src="/preview/991.mp4"></video>"#;
        let d = parse_detail(body, "https://mixkit.co/free-stock-video/foggy-coast-991/");
        assert_eq!(
            d.download_url.as_deref(),
            Some("https://mixkit.co/preview/991.mp4")
        );
        assert_eq!(d.title.as_deref(), Some("Fog"));
    }
}
