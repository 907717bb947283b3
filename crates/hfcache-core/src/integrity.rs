//! Integrity Verifier (C1): streaming SHA-256 and size checks.
//!
//! Grounded in the verification service's `verify_shard`: hash in a blocking
//! task using a ≥1 MiB read buffer so the file is never loaded whole.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{HubError, HubResult};

/// Chunk size used while streaming a file through the hasher.
const HASH_CHUNK_BYTES: usize = 1024 * 1024;

/// Outcome of verifying a file against its declared size/hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// File matches all known expectations.
    Ok,
    /// File does not exist.
    Missing,
    /// File size did not match `expected_size`.
    SizeMismatch {
        /// Actual size on disk.
        actual: u64,
        /// Declared size.
        expected: u64,
    },
    /// File hash did not match `expected_sha256`.
    HashMismatch {
        /// Actual computed hash.
        actual: String,
        /// Declared hash.
        expected: String,
    },
    /// Neither size nor hash was known, so nothing could be checked.
    Unverifiable,
}

impl Verdict {
    /// Whether this verdict represents a healthy file.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Stream `path` in ≥1 MiB chunks through a SHA-256 accumulator and return
/// the lower-case hex digest. Never loads the file whole.
pub fn hash_file(path: &Path) -> HubResult<String> {
    let mut file = File::open(path).map_err(|e| HubError::disk(path.display().to_string(), &e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_BYTES];

    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| HubError::disk(path.display().to_string(), &e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify a file's presence, size, and hash against declared expectations.
///
/// Read-only, idempotent, and never allocates proportional to file size
/// beyond the fixed hashing chunk buffer.
pub fn verify_file(
    path: &Path,
    expected_size: Option<u64>,
    expected_sha256: Option<&str>,
) -> HubResult<Verdict> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Verdict::Missing),
        Err(e) => return Err(HubError::disk(path.display().to_string(), &e)),
    };

    if let Some(expected) = expected_size {
        let actual = metadata.len();
        if actual != expected {
            return Ok(Verdict::SizeMismatch { actual, expected });
        }
        if expected_sha256.is_none() {
            return Ok(Verdict::Ok);
        }
    }

    let Some(expected_hash) = expected_sha256 else {
        return Ok(if expected_size.is_some() {
            Verdict::Ok
        } else {
            Verdict::Unverifiable
        });
    };

    let actual_hash = hash_file(path)?;
    if actual_hash == expected_hash {
        Ok(Verdict::Ok)
    } else {
        Ok(Verdict::HashMismatch {
            actual: actual_hash,
            expected: expected_hash.to_string(),
        })
    }
}

/// Same as [`verify_file`] but runs the potentially-blocking hash computation
/// on a `tokio::task::spawn_blocking` worker, for use from async contexts.
pub async fn verify_file_async(
    path: PathBuf,
    expected_size: Option<u64>,
    expected_sha256: Option<String>,
) -> HubResult<Verdict> {
    tokio::task::spawn_blocking(move || {
        verify_file(&path, expected_size, expected_sha256.as_deref())
    })
    .await
    .map_err(|e| HubError::NetworkError {
        message: format!("verification task panicked: {e}"),
    })?
}

/// Same as [`hash_file`], off the async executor.
pub async fn hash_file_async(path: PathBuf) -> HubResult<String> {
    tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(|e| HubError::NetworkError {
            message: format!("hashing task panicked: {e}"),
        })?
}

/// A resumable streaming SHA-256 accumulator.
///
/// Used by the Download Coordinator (C6) to hash bytes as they arrive over
/// the wire, and, on a resumed partial download, to first re-hash the bytes
/// already on disk so the accumulator's state matches what the remote file
/// resumes from (§4.6d: "resuming hash state from the partial file").
pub struct StreamingHasher(Sha256);

impl StreamingHasher {
    /// A fresh accumulator with no bytes hashed yet.
    #[must_use]
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    /// Feed the next chunk of bytes, in wire order.
    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    /// Consume the accumulator and return the lower-case hex digest.
    #[must_use]
    pub fn finalize_hex(self) -> String {
        format!("{:x}", self.0.finalize())
    }
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash the first `prefix_len` bytes of `path`, for resuming a
/// [`StreamingHasher`] across a partial download.
pub fn hash_prefix(path: &Path, prefix_len: u64) -> HubResult<StreamingHasher> {
    let mut file = File::open(path).map_err(|e| HubError::disk(path.display().to_string(), &e))?;
    let mut hasher = StreamingHasher::new();
    let mut buffer = vec![0u8; HASH_CHUNK_BYTES];
    let mut remaining = prefix_len;

    while remaining > 0 {
        let want = remaining.min(HASH_CHUNK_BYTES as u64) as usize;
        let n = file
            .read(&mut buffer[..want])
            .map_err(|e| HubError::disk(path.display().to_string(), &e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        remaining -= n as u64;
    }

    Ok(hasher)
}

/// Same as [`hash_prefix`], off the async executor.
pub async fn hash_prefix_async(path: PathBuf, prefix_len: u64) -> HubResult<StreamingHasher> {
    tokio::task::spawn_blocking(move || hash_prefix(&path, prefix_len))
        .await
        .map_err(|e| HubError::NetworkError {
            message: format!("hashing task panicked: {e}"),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        (dir, path)
    }

    #[test]
    fn hash_file_matches_known_vector() {
        let (_dir, path) = write_temp(b"abc");
        let digest = hash_file(&path).unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn verify_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        let verdict = verify_file(&path, Some(3), None).unwrap();
        assert_eq!(verdict, Verdict::Missing);
    }

    #[test]
    fn verify_file_size_mismatch() {
        let (_dir, path) = write_temp(b"abc");
        let verdict = verify_file(&path, Some(10), None).unwrap();
        assert_eq!(
            verdict,
            Verdict::SizeMismatch {
                actual: 3,
                expected: 10
            }
        );
    }

    #[test]
    fn verify_file_size_only_match_is_ok() {
        let (_dir, path) = write_temp(b"abc");
        let verdict = verify_file(&path, Some(3), None).unwrap();
        assert_eq!(verdict, Verdict::Ok);
    }

    #[test]
    fn verify_file_hash_match() {
        let (_dir, path) = write_temp(b"abc");
        let expected = hash_file(&path).unwrap();
        let verdict = verify_file(&path, None, Some(&expected)).unwrap();
        assert_eq!(verdict, Verdict::Ok);
    }

    #[test]
    fn verify_file_hash_mismatch() {
        let (_dir, path) = write_temp(b"abc");
        let verdict = verify_file(&path, None, Some(&"0".repeat(64))).unwrap();
        assert!(matches!(verdict, Verdict::HashMismatch { .. }));
    }

    #[test]
    fn verify_file_unverifiable_with_no_expectations() {
        let (_dir, path) = write_temp(b"abc");
        let verdict = verify_file(&path, None, None).unwrap();
        assert_eq!(verdict, Verdict::Unverifiable);
    }

    #[tokio::test]
    async fn verify_file_async_matches_sync() {
        let (_dir, path) = write_temp(b"hello world");
        let hash = hash_file(&path).unwrap();
        let verdict = verify_file_async(path, Some(11), Some(hash)).await.unwrap();
        assert_eq!(verdict, Verdict::Ok);
    }

    #[test]
    fn hash_prefix_then_update_matches_whole_file_hash() {
        let (_dir, path) = write_temp(b"hello world, this is resumed");
        let whole = hash_file(&path).unwrap();

        let mut hasher = hash_prefix(&path, 11).unwrap();
        hasher.update(b", this is resumed");
        assert_eq!(hasher.finalize_hex(), whole);
    }

    #[test]
    fn hash_prefix_of_zero_equals_fresh_hasher() {
        let (_dir, path) = write_temp(b"abc");
        let mut hasher = hash_prefix(&path, 0).unwrap();
        hasher.update(b"abc");
        assert_eq!(
            hasher.finalize_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn hash_file_async_matches_sync() {
        let (_dir, path) = write_temp(b"abc");
        let hash = hash_file_async(path).await.unwrap();
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
