//! Scripted sources and media payloads served through wiremock

use async_trait::async_trait;
use media_dl::error::SourceError;
use media_dl::sources::{Cursor, Page, RawDescriptor, SourceAdapter, SourceContext};
use media_dl::types::SourceName;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Smallest byte run the signature check accepts as JPEG, padded with `seed`
pub fn jpeg_bytes(seed: u8) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    bytes.extend(std::iter::repeat_n(seed, 512));
    bytes
}

/// ISO BMFF header with an `isom` brand, padded with `seed`
pub fn mp4_bytes(seed: u8) -> Vec<u8> {
    let mut bytes = vec![0x00, 0x00, 0x00, 0x20];
    bytes.extend_from_slice(b"ftypisom");
    bytes.extend_from_slice(&[0x00, 0x00, 0x02, 0x00]);
    bytes.extend_from_slice(b"isomiso2avc1mp41");
    bytes.extend(std::iter::repeat_n(seed, 512));
    bytes
}

/// Serve `body` as `mime` at `path`
pub async fn serve_payload(server: &MockServer, at: &str, body: Vec<u8>, mime: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, mime))
        .mount(server)
        .await;
}

/// Descriptor for a photo whose payload lives at `{server}/{source}/{id}.jpg`
pub fn photo(server: &MockServer, source: &str, id: &str) -> RawDescriptor {
    RawDescriptor {
        title: Some(format!("lighthouse {id}")),
        page_url: Some(format!("https://{source}.example/photos/{id}")),
        download_url: Some(format!("{}/{source}/{id}.jpg", server.uri())),
        author: Some("Ana".into()),
        ..RawDescriptor::new(id, "photo")
    }
}

/// A source that lists a fixed set of descriptors, `per_page` at a time
pub struct ListingSource {
    name: String,
    descriptors: Vec<RawDescriptor>,
    per_page: usize,
    pages_served: AtomicU32,
}

impl ListingSource {
    pub fn new(name: &str, descriptors: Vec<RawDescriptor>) -> Self {
        Self {
            name: name.to_string(),
            descriptors,
            per_page: 3,
            pages_served: AtomicU32::new(0),
        }
    }

    pub fn pages_served(&self) -> u32 {
        self.pages_served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for ListingSource {
    fn name(&self) -> SourceName {
        SourceName::new(&self.name)
    }

    async fn fetch_page(
        &self,
        _ctx: &SourceContext,
        _query: &str,
        cursor: Cursor,
        _want: usize,
    ) -> Result<Page, SourceError> {
        self.pages_served.fetch_add(1, Ordering::SeqCst);
        let start = (cursor.page as usize - 1) * self.per_page;
        let descriptors: Vec<_> = self
            .descriptors
            .iter()
            .skip(start)
            .take(self.per_page)
            .cloned()
            .collect();
        let more = start + self.per_page < self.descriptors.len();
        Ok(Page {
            descriptors,
            next: more.then(|| cursor.next_page()),
        })
    }
}

/// A source that fails every page with the same error
pub struct BrokenSource {
    name: String,
    error: SourceError,
    calls: Arc<AtomicU32>,
}

impl BrokenSource {
    pub fn new(name: &str, error: SourceError) -> Self {
        Self {
            name: name.to_string(),
            error,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl SourceAdapter for BrokenSource {
    fn name(&self) -> SourceName {
        SourceName::new(&self.name)
    }

    async fn fetch_page(
        &self,
        _ctx: &SourceContext,
        _query: &str,
        _cursor: Cursor,
        _want: usize,
    ) -> Result<Page, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// A source that fetches one listing page through the source's request budget,
/// then returns every descriptor at once
pub struct RemoteListingSource {
    name: String,
    listing_url: String,
    descriptors: Vec<RawDescriptor>,
}

impl RemoteListingSource {
    pub fn new(name: &str, listing_url: String, descriptors: Vec<RawDescriptor>) -> Self {
        Self {
            name: name.to_string(),
            listing_url,
            descriptors,
        }
    }
}

#[async_trait]
impl SourceAdapter for RemoteListingSource {
    fn name(&self) -> SourceName {
        SourceName::new(&self.name)
    }

    async fn fetch_page(
        &self,
        ctx: &SourceContext,
        _query: &str,
        _cursor: Cursor,
        _want: usize,
    ) -> Result<Page, SourceError> {
        ctx.get_text(ctx.http.get(&self.listing_url)).await?;
        Ok(Page {
            descriptors: self.descriptors.clone(),
            next: None,
        })
    }
}
