//! Metadata Cache port (C3): persistence for manifests, repo metadata, and
//! missing-repo suppression records (§4.3).

use async_trait::async_trait;

use crate::error::HubResult;
use crate::manifest::{CachedMetadata, RepoId};

/// Emitted after every successful mutation of the metadata store (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataChanged {
    /// The repo whose record changed.
    pub repo_id: RepoId,
}

/// Persistence for repo manifests and hub metadata, plus the missing-repo
/// suppression list. Implemented in `hfcache-store` as a JSON-file-backed,
/// single-writer actor; disk failures degrade to in-memory-only operation
/// rather than propagating to callers (§4.3).
#[async_trait]
pub trait MetadataCachePort: Send + Sync {
    /// Look up a cached record without triggering a hub fetch.
    ///
    /// Returns `None` for both "never seen" and "suppressed missing repo" —
    /// callers that care about the distinction use [`Self::is_missing_suppressed`].
    async fn get(&self, repo_id: &RepoId) -> HubResult<Option<CachedMetadata>>;

    /// Look up a cached, fresh record, or fetch and store a new one via
    /// `fetch` when absent or stale. `fetch` is not called while the repo is
    /// under missing-repo suppression.
    async fn get_or_fetch(
        &self,
        repo_id: &RepoId,
        fetch: Box<dyn FnOnce() -> BoxFetchFuture + Send>,
    ) -> HubResult<CachedMetadata>;

    /// Store a freshly fetched record, or (on a 404 from the caller) record
    /// a missing-repo suppression instead. Emits [`MetadataChanged`].
    async fn update(&self, repo_id: &RepoId, result: UpdateResult) -> HubResult<()>;

    /// Apply several updates with ≥100ms pacing between writes (§4.3).
    async fn batch_update(&self, updates: Vec<(RepoId, UpdateResult)>) -> HubResult<()>;

    /// Whether `repo_id` is currently suppressed as a known-missing repo.
    async fn is_missing_suppressed(&self, repo_id: &RepoId) -> HubResult<bool>;

    /// Drop all records older than the configured TTL.
    async fn clear_expired(&self) -> HubResult<usize>;

    /// Drop every record, unconditionally.
    async fn clear_all(&self) -> HubResult<()>;
}

/// Outcome of a hub fetch, as reported to [`MetadataCachePort::update`].
pub enum UpdateResult {
    /// The repo was found; store this metadata.
    Found(CachedMetadata),
    /// The repo returned 404; record a missing-repo suppression.
    Missing,
}

/// Boxed future returned by the `fetch` closure passed to `get_or_fetch`.
/// Declared as a type alias since `async fn` in trait parameters cannot
/// itself be generic over an async closure without boxing.
pub type BoxFetchFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = HubResult<CachedMetadata>> + Send>>;
