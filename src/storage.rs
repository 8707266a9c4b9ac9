//! Staged, verified, atomically published payload files
//!
//! A payload is first streamed into a hidden `.{name}.{random}.part` file next to
//! its destination while the SHA-256 and byte count are computed. Only after the
//! transfer is complete and verified is it renamed to its visible name. Every
//! failure path removes the temporary file, so a truncated payload never appears
//! under a final name.

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::ItemError;
use crate::magic::{self, SNIFF_LEN, Signature};
use crate::types::{MediaItem, MediaKind};
use crate::utils::{get_unique_path, sanitize_component};

/// Characters of the content hash used in file names
pub const HASH_PREFIX_LEN: usize = 10;

const MAX_SOURCE_LEN: usize = 24;
const MAX_TITLE_LEN: usize = 60;

/// An HTTP payload about to be written
pub struct Payload {
    /// Declared `Content-Type`, parameters included
    pub content_type: Option<String>,
    /// Declared `Content-Length`
    pub content_length: Option<u64>,
    /// Body chunks; a mid-stream error aborts the write
    pub body: BoxStream<'static, Result<Bytes, ItemError>>,
}

impl Payload {
    /// Payload from in-memory bytes
    pub fn from_bytes(content_type: Option<&str>, data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        Self {
            content_type: content_type.map(str::to_string),
            content_length: Some(data.len() as u64),
            body: futures::stream::iter([Ok(data)]).boxed(),
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// A fully received payload waiting to be committed or discarded
///
/// Dropping it without calling [`StorageWriter::commit`] or
/// [`StorageWriter::discard`] still removes the temporary file.
#[derive(Debug)]
pub struct StagedFile {
    temp_path: Option<PathBuf>,
    dir: PathBuf,
    file_name: String,
    /// SHA-256 of the payload, lowercase hex
    pub content_hash: String,
    /// Bytes received
    pub bytes: u64,
    /// Sniffed format, if recognised
    pub signature: Option<Signature>,
}

impl StagedFile {
    /// Final name the file will be published under (before collision suffixes)
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Temporary location while staged
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp_path.as_deref()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(path) = self.temp_path.take()
            && let Err(e) = std::fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove staged file");
        }
    }
}

/// Writes payloads under an output directory
#[derive(Clone, Debug)]
pub struct StorageWriter {
    verify_signature: bool,
}

impl StorageWriter {
    /// Writer; `verify_signature` enables magic-byte checks against the item kind
    pub fn new(verify_signature: bool) -> Self {
        Self { verify_signature }
    }

    /// Stream `payload` into a temporary file in `dir` and verify it
    ///
    /// # Errors
    ///
    /// - [`ItemError::InvalidContent`] for a text/JSON content type, an empty body, or
    ///   (with signature checks on) bytes that are not media of the item's kind
    /// - a truncated [`ItemError::Write`] when fewer or more bytes than declared arrive
    /// - a non-truncated [`ItemError::Write`] for local disk failures
    /// - any error yielded by the body stream
    pub async fn stage(
        &self,
        item: &MediaItem,
        payload: Payload,
        dir: &Path,
    ) -> Result<StagedFile, ItemError> {
        let content_type = payload
            .content_type
            .as_deref()
            .map(essence)
            .filter(|ct| !ct.is_empty());
        if let Some(ct) = &content_type
            && is_textual(ct)
        {
            return Err(ItemError::InvalidContent(format!(
                "server returned {} instead of media",
                ct
            )));
        }

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ItemError::disk("create output directory", e))?;

        let temp_name = format!(
            ".{}_{}.{}.part",
            sanitize_component(item.source_name.as_str(), MAX_SOURCE_LEN),
            sanitize_component(&item.source_id, MAX_TITLE_LEN),
            random_suffix()
        );
        let temp_path = dir.join(temp_name);

        let mut staged = StagedFile {
            temp_path: Some(temp_path.clone()),
            dir: dir.to_path_buf(),
            file_name: String::new(),
            content_hash: String::new(),
            bytes: 0,
            signature: None,
        };

        let (hash, bytes, head) = stream_to_file(&temp_path, payload.body).await?;

        if let Some(expected) = payload.content_length
            && expected != bytes
        {
            return Err(ItemError::truncated(format!(
                "received {} of {} declared bytes",
                bytes, expected
            )));
        }
        if bytes == 0 {
            return Err(ItemError::InvalidContent("empty payload".into()));
        }

        let signature = magic::sniff(&head);
        if self.verify_signature {
            match signature {
                Some(sig) if sig.kind() == item.kind => {}
                Some(sig) => {
                    return Err(ItemError::InvalidContent(format!(
                        "expected {} but payload is {:?}",
                        item.kind, sig
                    )));
                }
                None => {
                    return Err(ItemError::InvalidContent(format!(
                        "payload is not a recognised {} format",
                        item.kind
                    )));
                }
            }
        }

        let extension = content_type
            .as_deref()
            .and_then(extension_for_content_type)
            .or_else(|| signature.map(|s| s.extension()))
            .unwrap_or_else(|| default_extension(item.kind));

        staged.file_name = final_file_name(item, &hash, extension);
        staged.content_hash = hash;
        staged.bytes = bytes;
        staged.signature = signature;

        tracing::debug!(
            item = %item.id,
            bytes,
            hash = %staged.content_hash,
            "payload staged"
        );
        Ok(staged)
    }

    /// Publish a staged file under its final name; returns the final path
    ///
    /// A ` (n)` suffix is added when another file already holds the name.
    pub async fn commit(&self, mut staged: StagedFile) -> Result<PathBuf, ItemError> {
        let Some(temp_path) = staged.temp_path.clone() else {
            return Err(ItemError::disk(
                "commit",
                std::io::Error::new(std::io::ErrorKind::NotFound, "staged file already consumed"),
            ));
        };

        let target = get_unique_path(&staged.dir.join(&staged.file_name))
            .map_err(|e| ItemError::disk("choose final name", e))?;

        tokio::fs::rename(&temp_path, &target)
            .await
            .map_err(|e| ItemError::disk("publish file", e))?;
        staged.temp_path = None;

        tracing::debug!(path = %target.display(), "payload committed");
        Ok(target)
    }

    /// Remove a staged file without publishing it
    pub async fn discard(&self, mut staged: StagedFile) {
        if let Some(path) = staged.temp_path.take()
            && let Err(e) = tokio::fs::remove_file(&path).await
        {
            tracing::warn!(path = %path.display(), error = %e, "failed to discard staged file");
        }
    }

    /// Stage and commit in one step
    pub async fn write(
        &self,
        item: &MediaItem,
        payload: Payload,
        dir: &Path,
    ) -> Result<(PathBuf, String, u64), ItemError> {
        let staged = self.stage(item, payload, dir).await?;
        let hash = staged.content_hash.clone();
        let bytes = staged.bytes;
        let path = self.commit(staged).await?;
        Ok((path, hash, bytes))
    }
}

/// Copy the body into `path`, returning (hex SHA-256, byte count, leading bytes)
async fn stream_to_file(
    path: &Path,
    mut body: BoxStream<'static, Result<Bytes, ItemError>>,
) -> Result<(String, u64, Vec<u8>), ItemError> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| ItemError::disk("create temporary file", e))?;

    let mut hasher = Sha256::new();
    let mut bytes: u64 = 0;
    let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if head.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
        }
        hasher.update(&chunk);
        bytes += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .map_err(|e| ItemError::disk("write temporary file", e))?;
    }

    file.flush()
        .await
        .map_err(|e| ItemError::disk("flush temporary file", e))?;
    file.sync_all()
        .await
        .map_err(|e| ItemError::disk("sync temporary file", e))?;

    Ok((format!("{:x}", hasher.finalize()), bytes, head))
}

/// `{source}_{title}-{hash[..10]}.{ext}`
pub fn final_file_name(item: &MediaItem, content_hash: &str, extension: &str) -> String {
    let prefix: String = content_hash.chars().take(HASH_PREFIX_LEN).collect();
    format!(
        "{}_{}-{}.{}",
        sanitize_component(item.source_name.as_str(), MAX_SOURCE_LEN),
        sanitize_component(&item.title, MAX_TITLE_LEN),
        prefix,
        extension
    )
}

/// Media type without parameters, lowercased
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_textual(essence: &str) -> bool {
    essence.starts_with("text/")
        || essence == "application/json"
        || essence.ends_with("+json")
        || essence == "application/xhtml+xml"
}

/// File extension for a declared media type; `None` for generic or unknown types
pub fn extension_for_content_type(essence: &str) -> Option<&'static str> {
    Some(match essence {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/heic" | "image/heif" => "heic",
        "image/bmp" | "image/x-ms-bmp" => "bmp",
        "image/tiff" => "tif",
        "image/svg+xml" => "svg",
        "video/mp4" | "video/x-m4v" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/x-matroska" => "mkv",
        "video/ogg" => "ogv",
        "video/x-msvideo" | "video/avi" => "avi",
        "video/mpeg" => "mpg",
        "video/3gpp" => "3gp",
        _ => return None,
    })
}

fn default_extension(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "jpg",
        MediaKind::Video => "mp4",
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}
