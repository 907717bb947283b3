//! Download trigger port: how the Verification Service (C7) asks the
//! Download Coordinator (C6) to fetch a single file, without `hfcache-core`
//! depending on `hfcache-download` (which itself depends on `hfcache-core`).
//!
//! Grounded directly on the verification service's `DownloadTriggerPort`,
//! generalized from a quantization-queue request to a single repo-relative
//! file path.

use async_trait::async_trait;

use crate::error::HubResult;
use crate::manifest::RepoId;

/// Narrow interface C7 needs from C6: redownload exactly one file and wait
/// for it to land, verified, on disk.
#[async_trait]
pub trait DownloadTriggerPort: Send + Sync {
    /// Redownload `file_path` within `repo_id`, overwriting whatever is
    /// currently on disk for it, and block until it completes or fails.
    async fn redownload_file(&self, repo_id: &RepoId, file_path: &str) -> HubResult<()>;
}
