//! Hub Client port (C4): the stateless HTTP surface the engine depends on.
//!
//! Kept separate from [`crate::ports::metadata_cache`] and
//! [`crate::ports::download_trigger`] because it is the one port with a real
//! alternate backend in this workspace (`hfcache-hf`'s `ReqwestBackend` vs. a
//! test double), mirroring the `HttpBackend` boundary it was grounded on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HubResult;
use crate::manifest::RepoId;

/// One hit from a repo search (§4.4 `search`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    /// The matched repo.
    pub repo_id: RepoId,
    /// Download count as reported by the hub.
    pub downloads: u64,
    /// Like count as reported by the hub.
    pub likes: u64,
    /// Pipeline tag, when present.
    pub pipeline_tag: Option<String>,
}

/// Repo-level metadata returned by `get_repo_info` (§4.4, §3 `CachedMetadata`
/// minus the manifest, which comes from `list_files_detailed`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoInfo {
    /// The repo this info describes.
    pub repo_id: RepoId,
    /// Latest commit id for "main", when reported.
    pub sha: Option<String>,
    /// Download count.
    pub downloads: u64,
    /// Like count.
    pub likes: u64,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Pipeline tag, when present.
    pub pipeline_tag: Option<String>,
    /// Repo creation timestamp, when reported.
    pub created_at: Option<DateTime<Utc>>,
    /// Library name (e.g. `transformers`), when reported.
    pub library_name: Option<String>,
}

/// A single file as reported by `list_files_detailed` (§4.4): LFS pointer
/// fields take precedence over inline `size`/`sha` when both are present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteFileInfo {
    /// Relative path within the repo.
    pub rfilename: String,
    /// Size in bytes, when known.
    pub size: Option<u64>,
    /// SHA-256, when known.
    pub sha256: Option<String>,
}

/// A chunk of bytes streamed from `download_file`, paired with its offset
/// within the target file so a caller can verify ordering.
#[derive(Debug, Clone)]
pub struct DownloadChunk {
    /// Byte offset of `data[0]` within the full file.
    pub offset: u64,
    /// The chunk's bytes.
    pub data: Vec<u8>,
}

/// The stateless HTTP surface the engine depends on (§4.4, §6). Implemented
/// in `hfcache-hf` against the real hub API; test doubles implement it
/// directly for unit tests that must not touch the network.
#[async_trait]
pub trait HubClientPort: Send + Sync {
    /// Search for repos matching `query`, returning up to `limit` hits.
    async fn search(&self, query: &str, limit: usize) -> HubResult<Vec<SearchHit>>;

    /// Fetch repo-level metadata (downloads, likes, tags, ...).
    async fn get_repo_info(&self, repo_id: &RepoId) -> HubResult<RepoInfo>;

    /// List files in the "main" revision, with LFS-aware size/hash
    /// resolution.
    async fn list_files_detailed(&self, repo_id: &RepoId) -> HubResult<Vec<RemoteFileInfo>>;

    /// `HEAD` a single file to learn its size without downloading it.
    async fn file_size(&self, repo_id: &RepoId, file_path: &str) -> HubResult<Option<u64>>;

    /// Stream a file's bytes starting at `offset`, invoking `on_chunk` for
    /// each chunk as it arrives (§4.4: 64 KiB buffer, `Range` resume).
    ///
    /// `on_chunk` returning an error aborts the stream and that error is
    /// propagated; this is how callers implement cancellation at a buffer
    /// boundary (§5).
    async fn download_file(
        &self,
        repo_id: &RepoId,
        file_path: &str,
        offset: u64,
        on_chunk: &mut (dyn FnMut(DownloadChunk) -> HubResult<()> + Send),
    ) -> HubResult<()>;

    /// Validate the configured token against `whoami-v2`.
    async fn validate_token(&self) -> HubResult<bool>;
}
