//! File fingerprinting and change detection.
//!
//! A [`Fingerprint`] captures three independent signals about a file: its
//! size, its modification time, and a streaming blake3 hash of its content.
//! Any single differing signal is enough to trigger re-indexing; requiring
//! all three to agree before skipping keeps false negatives (a changed file
//! silently skipped) out even under clock skew or truncated metadata.
//!
//! The decision function [`needs_reindex`] is deliberately conservative: if
//! fingerprinting itself fails, the file is treated as changed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::UNIX_EPOCH;
use tokio::io::AsyncReadExt;

/// Block size for streaming content hashing.
const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Identity of a file's content and stat metadata at a point in time.
///
/// Compared field-by-field; two fingerprints are equal only when size,
/// modification time, and content hash all agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// File size in bytes
    pub size: u64,
    /// Modification time as seconds since the Unix epoch
    pub modified_at: f64,
    /// Hex-encoded blake3 hash of the file content
    pub content_hash: String,
}

impl Fingerprint {
    /// Compute the fingerprint of the file at `path`: a filesystem stat for
    /// size and mtime, and a streaming hash over fixed-size block reads.
    pub async fn compute(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("failed to stat {}", path.display()))?;

        let modified_at = metadata
            .modified()
            .with_context(|| format!("no modification time for {}", path.display()))?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let mut file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;

        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; HASH_BLOCK_SIZE];
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(Self {
            size: metadata.len(),
            modified_at,
            content_hash: hasher.finalize().to_hex().to_string(),
        })
    }
}

/// Decide whether a document must be re-indexed.
///
/// `stored` is the fingerprint recorded at the last successful indexing (if
/// any); `current` is the freshly computed one, or `None` when
/// fingerprinting failed. Returns `true` if `force` is set, if there is no
/// stored fingerprint, if the current fingerprint could not be computed, or
/// if any fingerprint field differs.
pub fn needs_reindex(
    stored: Option<&Fingerprint>,
    current: Option<&Fingerprint>,
    force: bool,
) -> bool {
    if force {
        return true;
    }
    match (stored, current) {
        (Some(stored), Some(current)) => stored != current,
        // Never indexed, or fingerprinting failed: never silently skip.
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Fingerprint {
        Fingerprint {
            size: 1024,
            modified_at: 1_700_000_000.5,
            content_hash: "abc123".to_string(),
        }
    }

    #[tokio::test]
    async fn compute_reads_size_and_hash() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("doc.txt");
        tokio::fs::write(&path, b"hello fingerprinting").await?;

        let fp = Fingerprint::compute(&path).await?;
        assert_eq!(fp.size, 20);
        assert_eq!(fp.content_hash.len(), 64);
        assert!(fp.modified_at > 0.0);

        Ok(())
    }

    #[tokio::test]
    async fn content_change_changes_hash() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("doc.txt");

        tokio::fs::write(&path, b"original content").await?;
        let before = Fingerprint::compute(&path).await?;

        tokio::fs::write(&path, b"modified content").await?;
        let after = Fingerprint::compute(&path).await?;

        assert_ne!(before.content_hash, after.content_hash);
        Ok(())
    }

    #[tokio::test]
    async fn compute_fails_on_missing_file() {
        let dir = tempdir().unwrap();
        let result = Fingerprint::compute(&dir.path().join("missing.txt")).await;
        assert!(result.is_err());
    }

    #[test]
    fn identical_fingerprints_skip() {
        let fp = sample();
        assert!(!needs_reindex(Some(&fp), Some(&fp.clone()), false));
    }

    #[test]
    fn any_single_field_difference_triggers_reindex() {
        let stored = sample();

        let mut size_differs = stored.clone();
        size_differs.size += 1;
        assert!(needs_reindex(Some(&stored), Some(&size_differs), false));

        let mut mtime_differs = stored.clone();
        mtime_differs.modified_at += 1.0;
        assert!(needs_reindex(Some(&stored), Some(&mtime_differs), false));

        let mut hash_differs = stored.clone();
        hash_differs.content_hash = "def456".to_string();
        assert!(needs_reindex(Some(&stored), Some(&hash_differs), false));
    }

    #[test]
    fn force_always_reindexes() {
        let fp = sample();
        assert!(needs_reindex(Some(&fp), Some(&fp.clone()), true));
    }

    #[test]
    fn missing_fingerprints_are_conservative() {
        let fp = sample();
        // Never indexed before
        assert!(needs_reindex(None, Some(&fp), false));
        // Fingerprinting failed
        assert!(needs_reindex(Some(&fp), None, false));
        assert!(needs_reindex(None, None, false));
    }
}
