//! Per-job duplicate detection
//!
//! Two independent key spaces:
//! - identities `(source, source_id)`, checked before an item is queued
//! - content hashes, claimed after a payload is staged and before it is published
//!
//! Both checks are a single check-and-insert under a lock, so two workers racing on
//! the same key can never both win.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

use crate::types::SourceName;
use crate::utils::is_partial_file;

/// Seen-sets for one job
#[derive(Debug, Default)]
pub struct Deduplicator {
    identities: Mutex<HashSet<(SourceName, String)>>,
    hashes: Mutex<HashSet<String>>,
}

impl Deduplicator {
    /// Empty sets
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an identity; `false` when it was already seen
    pub async fn check_identity(&self, source: &SourceName, source_id: &str) -> bool {
        self.identities
            .lock()
            .await
            .insert((source.clone(), source_id.to_string()))
    }

    /// Claim a content hash; `false` when another item already holds it
    pub async fn claim_hash(&self, content_hash: &str) -> bool {
        self.hashes.lock().await.insert(content_hash.to_string())
    }

    /// Give a claim back after its payload failed to publish
    pub async fn release_hash(&self, content_hash: &str) {
        self.hashes.lock().await.remove(content_hash);
    }

    /// Number of claimed hashes
    pub async fn known_hashes(&self) -> usize {
        self.hashes.lock().await.len()
    }

    /// Claim the hash of every finished file under `root`
    ///
    /// Staged `.part` files are ignored. A missing directory seeds nothing.
    /// Returns how many distinct hashes were added.
    pub async fn seed_from_dir(&self, root: &Path) -> std::io::Result<usize> {
        if !tokio::fs::try_exists(root).await? {
            return Ok(0);
        }

        let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
        let mut seeded = 0;

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() || is_partial_file(&path) {
                    continue;
                }
                match hash_file(&path).await {
                    Ok(hash) => {
                        if self.claim_hash(&hash).await {
                            seeded += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "cannot hash existing file");
                    }
                }
            }
        }

        tracing::debug!(root = %root.display(), seeded, "seeded content hashes");
        Ok(seeded)
    }
}

/// SHA-256 of a file, lowercase hex
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn identity_is_checked_once() {
        let dedup = Deduplicator::new();
        let a = SourceName::new("pexels");
        let b = SourceName::new("pixabay");

        assert!(dedup.check_identity(&a, "1").await);
        assert!(!dedup.check_identity(&a, "1").await, "repeat listing");
        assert!(dedup.check_identity(&b, "1").await, "same id, other source");
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let dedup = Arc::new(Deduplicator::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let d = dedup.clone();
            handles.push(tokio::spawn(async move { d.claim_hash("abc").await }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn released_claim_can_be_taken_again() {
        let dedup = Deduplicator::new();
        assert!(dedup.claim_hash("h").await);
        dedup.release_hash("h").await;
        assert!(dedup.claim_hash("h").await);
    }

    #[tokio::test]
    async fn seeding_hashes_finished_files_recursively() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"alpha").unwrap();
        std::fs::create_dir(dir.path().join("pexels")).unwrap();
        std::fs::write(dir.path().join("pexels").join("b.jpg"), b"beta").unwrap();
        std::fs::write(dir.path().join("pexels").join("b-copy.jpg"), b"beta").unwrap();
        std::fs::write(dir.path().join(".c.jpg.x1y2.part"), b"partial").unwrap();

        let dedup = Deduplicator::new();
        let seeded = dedup.seed_from_dir(dir.path()).await.unwrap();

        assert_eq!(seeded, 2, "two distinct finished payloads");
        let alpha = format!("{:x}", Sha256::digest(b"alpha"));
        let partial = format!("{:x}", Sha256::digest(b"partial"));
        assert!(!dedup.claim_hash(&alpha).await, "existing file is claimed");
        assert!(dedup.claim_hash(&partial).await, "part files are not seeded");
    }

    #[tokio::test]
    async fn seeding_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let dedup = Deduplicator::new();
        assert_eq!(
            dedup.seed_from_dir(&dir.path().join("nope")).await.unwrap(),
            0
        );
        assert_eq!(dedup.known_hashes().await, 0);
    }
}
