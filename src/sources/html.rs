//! HTML extraction for the scraped sources
//!
//! Pages go through a real HTML parser, so attribute order, quoting and
//! character references are handled the way a browser would.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use url::Url;

use super::SourceContext;
use crate::error::SourceError;

#[allow(clippy::expect_used)]
fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

/// An element's name and attributes (names lowercased, entities decoded)
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Tag {
    pub name: String,
    pub attrs: HashMap<String, String>,
}

impl Tag {
    fn from_element(element: ElementRef<'_>) -> Self {
        let value = element.value();
        Self {
            name: value.name().to_string(),
            attrs: value
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Non-empty attribute value
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// First non-empty value among `names`
    pub fn first_attr(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|n| self.attr(n))
    }
}

/// An anchor with its href and visible text
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Anchor {
    pub href: String,
    pub text: String,
}

/// Elements named in `names`, in document order
pub(crate) fn find_tags(html: &str, names: &[&str]) -> Vec<Tag> {
    let document = Html::parse_document(html);
    let any = selector("*");
    document
        .select(&any)
        .filter(|el| names.contains(&el.value().name()))
        .map(Tag::from_element)
        .collect()
}

/// All anchors carrying an href
pub(crate) fn anchors(html: &str) -> Vec<Anchor> {
    let document = Html::parse_document(html);
    let links = selector("a[href]");
    document
        .select(&links)
        .filter_map(|el| {
            let href = el.value().attr("href")?.trim();
            if href.is_empty() {
                return None;
            }
            Some(Anchor {
                href: href.to_string(),
                text: visible_text(el),
            })
        })
        .collect()
}

/// `<meta property|name="..." content="...">`
pub(crate) fn meta_content(html: &str, property: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let metas = selector("meta[content]");
    document.select(&metas).find_map(|el| {
        let tag = Tag::from_element(el);
        let key = tag.first_attr(&["property", "name"])?;
        if key.eq_ignore_ascii_case(property) {
            tag.attr("content").map(str::to_string)
        } else {
            None
        }
    })
}

/// Document `<title>` text
pub(crate) fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title = selector("title");
    let text = visible_text(document.select(&title).next()?);
    (!text.is_empty()).then_some(text)
}

/// `src` of the first `<source>` (or the `<video>` itself) inside the first `<video>`
pub(crate) fn first_video_source(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let video = document.select(&selector("video")).next()?;
    let sources = selector("source");
    video
        .select(&sources)
        .chain(std::iter::once(video))
        .map(Tag::from_element)
        .find_map(|t| t.first_attr(&["src", "data-src"]).map(str::to_string))
}

fn visible_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve `href` against `base`; only http(s) results are kept
pub(crate) fn resolve(base: &Url, href: &str) -> Option<String> {
    let url = base.join(href.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// Last non-empty path segment, without extension
pub(crate) fn slug(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()?;
    let stem = segment.split('.').next().unwrap_or(segment);
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Parse a base URL from configuration
pub(crate) fn base_url(raw: &str) -> Result<Url, SourceError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized)
        .map_err(|e| SourceError::NetworkError(format!("invalid base URL {}: {}", raw, e)))
}

/// Fetch a detail page
///
/// Throttling and credential failures abort the listing; any other failure only
/// loses this one page (`None`).
pub(crate) async fn fetch_detail(
    ctx: &SourceContext,
    url: &str,
) -> Result<Option<String>, SourceError> {
    match ctx.get_text(ctx.http.get(url)).await {
        Ok(body) => Ok(Some(body)),
        Err(
            e @ (SourceError::RateLimited(_) | SourceError::AuthError(_) | SourceError::Cancelled),
        ) => Err(e),
        Err(e) => {
            tracing::warn!(source = %ctx.source, url, error = %e, "skipping detail page");
            Ok(None)
        }
    }
}

/// A non-empty page that produced nothing means the markup changed under us
pub(crate) fn ensure_parsed(
    body: &str,
    found: usize,
    what: &str,
    first_page: bool,
) -> Result<(), SourceError> {
    if found == 0 && first_page && !body.trim().is_empty() {
        return Err(SourceError::ParseError(format!(
            "no {} found in a non-empty listing page",
            what
        )));
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_attributes_in_any_order_and_quote_style() {
        let html = r#"<video poster='/p.jpg' class="x" SRC="/clip.mp4?a=1&amp;b=2"></video>"#;
        let tags = find_tags(html, &["video"]);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].attr("src"), Some("/clip.mp4?a=1&b=2"));
        assert_eq!(tags[0].attr("poster"), Some("/p.jpg"));
    }

    #[test]
    fn anchors_keep_text_without_markup() {
        let html = r#"<a href="/dl/1.mp4" class="btn"><span>Free</span> Download</a><a>no href</a>"#;
        let found = anchors(html);
        assert_eq!(
            found,
            vec![Anchor {
                href: "/dl/1.mp4".into(),
                text: "Free Download".into()
            }]
        );
    }

    #[test]
    fn meta_content_matches_property_or_name() {
        let html = r#"<meta content="https://x/og.jpg" property="og:image"><meta name="og:title" content="Sea">"#;
        assert_eq!(
            meta_content(html, "og:image").as_deref(),
            Some("https://x/og.jpg")
        );
        assert_eq!(meta_content(html, "og:title").as_deref(), Some("Sea"));
        assert_eq!(meta_content(html, "og:video"), None);
    }

    #[test]
    fn first_video_source_prefers_source_child() {
        let html = r#"<div><video poster="/p.jpg"><source src="/v/clip.mp4" type="video/mp4"></video></div>"#;
        assert_eq!(first_video_source(html).as_deref(), Some("/v/clip.mp4"));

        let bare = r#"<video src="/v/bare.webm"></video>"#;
        assert_eq!(first_video_source(bare).as_deref(), Some("/v/bare.webm"));
    }

    #[test]
    fn quoted_angle_bracket_does_not_end_the_tag() {
        let html = r#"<video data-meta="w>h" src="/clip.mp4"></video>"#;
        assert_eq!(first_video_source(html).as_deref(), Some("/clip.mp4"));
        let tags = find_tags(html, &["video"]);
        assert_eq!(tags[0].attr("data-meta"), Some("w>h"));
    }

    #[test]
    fn character_references_decode_once() {
        let html = r#"<a href="/dl?a=1&#038;b=2">Tom &amp;lt;3&#x27;s</a>"#;
        let found = anchors(html);
        assert_eq!(found[0].href, "/dl?a=1&b=2");
        assert_eq!(found[0].text, "Tom &lt;3's");
    }

    #[test]
    fn page_title_collapses_whitespace() {
        let html = "<html><head><title>\n  Ocean   waves &amp; sand </title></head></html>";
        assert_eq!(page_title(html).as_deref(), Some("Ocean waves & sand"));
        assert_eq!(page_title("<p>no title</p>"), None);
    }

    #[test]
    fn resolve_and_slug() {
        let base = base_url("https://mixkit.co").unwrap();
        assert_eq!(
            resolve(&base, "/free-stock-video/sea-42/").as_deref(),
            Some("https://mixkit.co/free-stock-video/sea-42/")
        );
        assert_eq!(resolve(&base, "javascript:void(0)"), None);
        assert_eq!(
            slug("https://mixkit.co/free-stock-video/sea-42/").as_deref(),
            Some("sea-42")
        );
        assert_eq!(
            slug("https://cdn.example/v/clip.mp4").as_deref(),
            Some("clip")
        );
    }

    #[test]
    fn empty_parse_of_non_empty_first_page_is_an_error() {
        assert!(ensure_parsed("<html>redesigned</html>", 0, "videos", true).is_err());
        assert!(ensure_parsed("<html>end of results</html>", 0, "videos", false).is_ok());
        assert!(ensure_parsed("   ", 0, "videos", true).is_ok());
        assert!(ensure_parsed("<html/>", 3, "videos", true).is_ok());
    }
}
