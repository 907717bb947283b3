//! Download Coordinator (C6): plans a repo's files, streams each one from
//! the hub client with resume-on-retry, hands finished bytes to the
//! directory manager, and fans progress out through the state hub (§4.6).

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{oneshot, Mutex as AsyncMutex, Semaphore};
use tokio_util::sync::CancellationToken;

use hfcache_core::{
    hash_prefix_async, CachedMetadata, DirectoryManager, DownloadChunk, DownloadTriggerPort,
    FileEntry, HubClientPort, HubError, HubResult, MetadataCachePort, NetworkFailureManager,
    RepoId, RepoManifest, StateHub, StreamingHasher, CACHE_VERSION, MAIN_REVISION,
};

/// Bytes of existing partial data required before a retry resumes via
/// `Range` instead of restarting the file from zero (§4.6d).
const MIN_RESUME_BYTES: u64 = 1024 * 1024;

/// Backoff between per-file transport-error retries (§4.6d: "1 s, 2 s, 4 s").
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Tunables for a [`DownloadCoordinator`], drawn from §6's configuration
/// table.
#[derive(Debug, Clone, Copy)]
pub struct DownloadCoordinatorConfig {
    /// Global cap on concurrently active repo downloads (§5: default 4).
    pub max_concurrent_downloads: usize,
    /// Per-file transport-error retries before giving up (§4.6d: 3).
    pub max_file_retries: u8,
    /// Minimum interval between progress publishes while streaming a file
    /// (§6 `progress_throttle.bytes_ms`, default 150ms).
    pub progress_tick: Duration,
}

impl Default for DownloadCoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 4,
            max_file_retries: 3,
            progress_tick: Duration::from_millis(150),
        }
    }
}

/// Drives downloads for one or more repos against a [`HubClientPort`] and
/// [`MetadataCachePort`], serialising per-repo and bounding total
/// concurrency globally (§5).
///
/// Generic over the two port traits so this crate never depends on
/// `hfcache-hf`'s concrete client or `hfcache-store`'s concrete cache —
/// only the composition root wires real types in, mirroring how
/// `VerificationService` stays generic over `MetadataCachePort` and
/// `DownloadTriggerPort`.
pub struct DownloadCoordinator<C, M> {
    hub: Arc<C>,
    metadata: Arc<M>,
    directories: DirectoryManager,
    backoff: NetworkFailureManager,
    state: StateHub,
    temp_root: PathBuf,
    config: DownloadCoordinatorConfig,
    semaphore: Arc<Semaphore>,
    repo_locks: AsyncMutex<HashMap<RepoId, Arc<AsyncMutex<()>>>>,
    cancellations: AsyncMutex<HashMap<RepoId, CancellationToken>>,
}

impl<C, M> DownloadCoordinator<C, M>
where
    C: HubClientPort,
    M: MetadataCachePort,
{
    /// Build a coordinator rooted at `temp_root`.
    ///
    /// `temp_root` is wiped and recreated empty: temp files are scoped under
    /// a per-process directory and deleted on startup rather than by
    /// scanning for stale `.tmp` files by age (§9 open question).
    pub fn new(
        hub: Arc<C>,
        metadata: Arc<M>,
        directories: DirectoryManager,
        backoff: NetworkFailureManager,
        state: StateHub,
        temp_root: PathBuf,
        config: DownloadCoordinatorConfig,
    ) -> HubResult<Self> {
        if temp_root.exists() {
            std::fs::remove_dir_all(&temp_root)
                .map_err(|e| HubError::disk(temp_root.display().to_string(), &e))?;
        }
        std::fs::create_dir_all(&temp_root)
            .map_err(|e| HubError::disk(temp_root.display().to_string(), &e))?;

        Ok(Self {
            hub,
            metadata,
            directories,
            backoff,
            state,
            temp_root,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1))),
            config,
            repo_locks: AsyncMutex::new(HashMap::new()),
            cancellations: AsyncMutex::new(HashMap::new()),
        })
    }

    /// Run the full download algorithm for `repo_id` (§4.6 steps 1-6).
    pub async fn start_download(&self, repo_id: &RepoId) -> HubResult<()> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");
        let repo_lock = self.repo_lock(repo_id).await;
        let _repo_guard = repo_lock.lock().await;

        let cancel_token = self.register_cancellation(repo_id).await;

        self.state
            .mutate(repo_id, |s| {
                s.is_downloading = true;
                s.download_error = None;
            })
            .await;

        let result = self.run_download(repo_id, &cancel_token).await;
        self.unregister_cancellation(repo_id).await;

        match &result {
            Ok(()) => {
                self.backoff.record_success(repo_id).await;
            }
            Err(HubError::Cancelled) => {
                self.cleanup_temp_dir(repo_id).await;
                self.state
                    .mutate(repo_id, |s| {
                        s.is_downloading = false;
                        s.active_file_status = None;
                    })
                    .await;
            }
            Err(e) => {
                if e.is_backoff_eligible() {
                    let retry_after = if let HubError::RateLimited {
                        retry_after_secs: Some(s),
                    } = e
                    {
                        Some(Duration::from_secs(*s))
                    } else {
                        None
                    };
                    self.backoff
                        .record_failure(repo_id, e.kind(), retry_after)
                        .await;
                }
                self.state
                    .mutate(repo_id, |s| {
                        s.is_downloading = false;
                        s.download_error =
                            Some(hfcache_core::DownloadErrorRecord::from_error(e));
                    })
                    .await;
            }
        }

        result
    }

    /// Cancel an in-flight download for `repo_id`, if any.
    pub async fn cancel(&self, repo_id: &RepoId) {
        if let Some(token) = self.cancellations.lock().await.get(repo_id) {
            token.cancel();
        }
    }

    async fn register_cancellation(&self, repo_id: &RepoId) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancellations
            .lock()
            .await
            .insert(repo_id.clone(), token.clone());
        token
    }

    async fn unregister_cancellation(&self, repo_id: &RepoId) {
        self.cancellations.lock().await.remove(repo_id);
    }

    async fn repo_lock(&self, repo_id: &RepoId) -> Arc<AsyncMutex<()>> {
        self.repo_locks
            .lock()
            .await
            .entry(repo_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn run_download(&self, repo_id: &RepoId, cancel_token: &CancellationToken) -> HubResult<()> {
        if let Some(wait) = self.backoff.pending_backoff(repo_id).await {
            return Err(HubError::NetworkBackoff {
                wait_secs: wait.as_secs(),
            });
        }

        let hub = Arc::clone(&self.hub);
        let fetch_repo_id = repo_id.clone();
        let cached = self
            .metadata
            .get_or_fetch(
                repo_id,
                Box::new(move || Box::pin(async move { fetch_manifest(&hub, &fetch_repo_id).await })),
            )
            .await?;

        let manifest = cached.manifest;
        if let Some(sha) = &manifest.sha {
            self.directories.write_refs_main(repo_id, sha)?;
        }
        let plan = manifest.download_plan();
        let total_files = plan.len();
        let repo_total_bytes = total_bytes_if_all_known(&plan);

        self.state
            .mutate(repo_id, |s| {
                s.total_bytes = repo_total_bytes;
                s.downloaded_bytes = 0;
                s.download_progress = 0.0;
            })
            .await;

        let repo_base_bytes = Arc::new(AtomicU64::new(0));

        for (idx, entry) in plan.iter().enumerate() {
            if cancel_token.is_cancelled() {
                return Err(HubError::Cancelled);
            }

            let flat_path = self.directories.flat_path(repo_id, &entry.name);
            let verdict = hfcache_core::verify_file_async(
                flat_path,
                entry.expected_size,
                entry.expected_sha256.clone(),
            )
            .await?;

            if verdict.is_ok() {
                let size = entry.expected_size.unwrap_or(0);
                let base = repo_base_bytes.fetch_add(size, Ordering::Relaxed) + size;
                self.publish_repo_progress(repo_id, base, repo_total_bytes)
                    .await;
                continue;
            }

            self.download_file_entry(
                repo_id,
                entry,
                idx,
                total_files,
                Arc::clone(&repo_base_bytes),
                repo_total_bytes,
                cancel_token,
            )
            .await?;

            let size = entry.expected_size.unwrap_or(0);
            let base = repo_base_bytes.fetch_add(size, Ordering::Relaxed) + size;
            self.publish_repo_progress(repo_id, base, repo_total_bytes)
                .await;
        }

        self.state
            .mutate(repo_id, |s| {
                s.is_downloading = false;
                s.download_progress = 1.0;
                s.is_downloaded = true;
                s.active_file_status = None;
            })
            .await;

        Ok(())
    }

    async fn publish_repo_progress(&self, repo_id: &RepoId, bytes: u64, total: Option<u64>) {
        let progress = total.map_or(0.0, |t| {
            if t == 0 {
                1.0
            } else {
                (bytes as f64 / t as f64).min(1.0)
            }
        });
        self.state
            .mutate(repo_id, |s| {
                s.downloaded_bytes = bytes;
                s.download_progress = progress;
            })
            .await;
    }

    /// Download a single file entry end to end: stream with retries, verify,
    /// restart once on corruption, then promote and materialise (§4.6 4b-f).
    #[allow(clippy::too_many_arguments)]
    async fn download_file_entry(
        &self,
        repo_id: &RepoId,
        entry: &FileEntry,
        idx: usize,
        total: usize,
        repo_base_bytes: Arc<AtomicU64>,
        repo_total_bytes: Option<u64>,
        cancel_token: &CancellationToken,
    ) -> HubResult<()> {
        let temp_path = self.temp_path(repo_id, &entry.name);

        let mut corruption_attempts = 0u8;
        loop {
            let (size, hash) = self
                .stream_with_retries(
                    repo_id,
                    entry,
                    &temp_path,
                    idx,
                    total,
                    Arc::clone(&repo_base_bytes),
                    repo_total_bytes,
                    cancel_token,
                )
                .await?;

            if let Some(err) = check_download(entry, size, &hash) {
                corruption_attempts += 1;
                let _ = tokio::fs::remove_file(&temp_path).await;
                if corruption_attempts >= 2 {
                    return Err(err);
                }
                tracing::warn!(
                    repo_id = %repo_id,
                    file = %entry.name,
                    "download corrupted, restarting file from zero"
                );
                continue;
            }

            let blob_sha = entry.expected_sha256.clone().unwrap_or(hash);
            self.directories
                .promote_temp_to_blob(repo_id, &temp_path, &blob_sha)?;
            self.directories
                .materialise(repo_id, MAIN_REVISION, entry, &blob_sha)?;
            return Ok(());
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_with_retries(
        &self,
        repo_id: &RepoId,
        entry: &FileEntry,
        temp_path: &std::path::Path,
        idx: usize,
        total: usize,
        repo_base_bytes: Arc<AtomicU64>,
        repo_total_bytes: Option<u64>,
        cancel_token: &CancellationToken,
    ) -> HubResult<(u64, String)> {
        let mut attempt = 0u8;
        loop {
            match self
                .stream_once(
                    repo_id,
                    entry,
                    temp_path,
                    idx,
                    total,
                    Arc::clone(&repo_base_bytes),
                    repo_total_bytes,
                    cancel_token,
                )
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(HubError::Cancelled) => return Err(HubError::Cancelled),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.config.max_file_retries {
                        return Err(e);
                    }
                    let delay = RETRY_DELAYS
                        .get(attempt as usize - 1)
                        .copied()
                        .unwrap_or(*RETRY_DELAYS.last().unwrap());
                    tracing::warn!(
                        repo_id = %repo_id,
                        file = %entry.name,
                        attempt,
                        error = %e,
                        delay_secs = delay.as_secs(),
                        "retrying file download after transport error"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_once(
        &self,
        repo_id: &RepoId,
        entry: &FileEntry,
        temp_path: &std::path::Path,
        idx: usize,
        total: usize,
        repo_base_bytes: Arc<AtomicU64>,
        repo_total_bytes: Option<u64>,
        cancel_token: &CancellationToken,
    ) -> HubResult<(u64, String)> {
        let existing_size = tokio::fs::metadata(temp_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        let resumable = existing_size >= MIN_RESUME_BYTES;
        if !resumable && existing_size > 0 {
            let _ = tokio::fs::remove_file(temp_path).await;
        }
        let offset = if resumable { existing_size } else { 0 };

        let hasher = if offset > 0 {
            hash_prefix_async(temp_path.to_path_buf(), offset).await?
        } else {
            StreamingHasher::new()
        };

        let file_downloaded = Arc::new(AtomicU64::new(offset));
        let (stop_tx, stop_rx) = oneshot::channel();
        let ticker = self.spawn_progress_ticker(
            repo_id.clone(),
            entry.name.clone(),
            idx,
            total,
            entry.expected_size,
            Arc::clone(&file_downloaded),
            repo_base_bytes,
            repo_total_bytes,
            stop_rx,
        );

        let result = self
            .write_stream(
                repo_id,
                entry,
                temp_path,
                offset,
                hasher,
                Arc::clone(&file_downloaded),
                cancel_token,
            )
            .await;

        let _ = stop_tx.send(());
        let _ = ticker.await;

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_stream(
        &self,
        repo_id: &RepoId,
        entry: &FileEntry,
        temp_path: &std::path::Path,
        offset: u64,
        hasher: StreamingHasher,
        downloaded: Arc<AtomicU64>,
        cancel_token: &CancellationToken,
    ) -> HubResult<(u64, String)> {
        if let Some(parent) = temp_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HubError::disk(parent.display().to_string(), &e))?;
        }

        let temp_path_owned = temp_path.to_path_buf();
        let mut file = if offset > 0 {
            OpenOptions::new().append(true).open(&temp_path_owned)
        } else {
            std::fs::File::create(&temp_path_owned)
        }
        .map_err(|e| HubError::disk(temp_path_owned.display().to_string(), &e))?;

        let hasher_cell = std::sync::Mutex::new(hasher);
        let cancel = cancel_token.clone();
        let write_path = temp_path_owned.clone();

        self.hub
            .download_file(
                repo_id,
                &entry.name,
                offset,
                &mut |chunk: DownloadChunk| -> HubResult<()> {
                    if cancel.is_cancelled() {
                        return Err(HubError::Cancelled);
                    }
                    file.write_all(&chunk.data)
                        .map_err(|e| HubError::disk(write_path.display().to_string(), &e))?;
                    hasher_cell
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .update(&chunk.data);
                    downloaded.fetch_add(chunk.data.len() as u64, Ordering::Relaxed);
                    Ok(())
                },
            )
            .await?;

        let final_size = downloaded.load(Ordering::Relaxed);
        let hasher = hasher_cell
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok((final_size, hasher.finalize_hex()))
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_progress_ticker(
        &self,
        repo_id: RepoId,
        file_name: String,
        idx: usize,
        total: usize,
        file_total: Option<u64>,
        file_downloaded: Arc<AtomicU64>,
        repo_base_bytes: Arc<AtomicU64>,
        repo_total_bytes: Option<u64>,
        mut stop_rx: oneshot::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let state = self.state.clone();
        let period = self.config.progress_tick;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let file_bytes = file_downloaded.load(Ordering::Relaxed);
                        let repo_bytes = repo_base_bytes.load(Ordering::Relaxed) + file_bytes;
                        let file_progress = file_total.map_or(0.0, |t| {
                            if t == 0 { 1.0 } else { (file_bytes as f64 / t as f64).min(1.0) }
                        });
                        let repo_progress = repo_total_bytes.map_or(0.0, |t| {
                            if t == 0 { 1.0 } else { (repo_bytes as f64 / t as f64).min(1.0) }
                        });

                        state
                            .mutate(&repo_id, |s| {
                                s.downloaded_bytes = repo_bytes;
                                s.download_progress = repo_progress;
                                s.active_file_status = Some(hfcache_core::ActiveFileStatus {
                                    index: idx,
                                    total,
                                    name: file_name.clone(),
                                    downloaded_bytes: file_bytes,
                                    total_bytes: file_total,
                                    progress: file_progress,
                                });
                            })
                            .await;
                    }
                    _ = &mut stop_rx => break,
                }
            }
        })
    }

    fn repo_temp_dir(&self, repo_id: &RepoId) -> PathBuf {
        self.temp_root.join(repo_id.cache_dirname())
    }

    fn temp_path(&self, repo_id: &RepoId, file_name: &str) -> PathBuf {
        let flattened = file_name.replace(['/', '\\'], "__");
        self.repo_temp_dir(repo_id).join(format!("{flattened}.part"))
    }

    async fn cleanup_temp_dir(&self, repo_id: &RepoId) {
        let dir = self.repo_temp_dir(repo_id);
        if dir.exists() {
            let _ = tokio::fs::remove_dir_all(&dir).await;
        }
    }
}

#[async_trait]
impl<C, M> DownloadTriggerPort for DownloadCoordinator<C, M>
where
    C: HubClientPort,
    M: MetadataCachePort,
{
    /// Redownload exactly one file, the narrow trigger the Verification
    /// Service (C7) uses for repair (§4.7 step 3).
    async fn redownload_file(&self, repo_id: &RepoId, file_path: &str) -> HubResult<()> {
        if let Some(wait) = self.backoff.pending_backoff(repo_id).await {
            return Err(HubError::NetworkBackoff {
                wait_secs: wait.as_secs(),
            });
        }

        let cached = self
            .metadata
            .get(repo_id)
            .await?
            .ok_or_else(|| HubError::NotFound {
                message: format!("no cached manifest for {repo_id}"),
            })?;
        let entry = cached
            .manifest
            .files
            .iter()
            .find(|f| f.name == file_path)
            .cloned()
            .ok_or_else(|| HubError::InvalidRequest {
                message: format!("{file_path} not present in manifest for {repo_id}"),
            })?;

        let cancel_token = CancellationToken::new();
        let repo_base_bytes = Arc::new(AtomicU64::new(0));
        let result = self
            .download_file_entry(repo_id, &entry, 0, 1, repo_base_bytes, None, &cancel_token)
            .await;

        match &result {
            Ok(()) => self.backoff.record_success(repo_id).await,
            Err(e) if e.is_backoff_eligible() => {
                let retry_after = if let HubError::RateLimited {
                    retry_after_secs: Some(s),
                } = e
                {
                    Some(Duration::from_secs(*s))
                } else {
                    None
                };
                self.backoff
                    .record_failure(repo_id, e.kind(), retry_after)
                    .await;
            }
            _ => {}
        }

        result
    }
}

/// Fetch a fresh manifest and wrap it as a [`CachedMetadata`] record,
/// for use as the `fetch` closure passed to `MetadataCachePort::get_or_fetch`.
async fn fetch_manifest<C: HubClientPort>(hub: &C, repo_id: &RepoId) -> HubResult<CachedMetadata> {
    let info = match hub.get_repo_info(repo_id).await {
        Ok(info) => info,
        Err(HubError::NotFound { message }) => {
            // An optional second attempt via search, for diagnostics only — a
            // search hit never overrides the canonical 404 (§9 open question).
            if let Ok(hits) = hub.search(&repo_id.as_str(), 5).await {
                if hits.iter().any(|h| &h.repo_id == repo_id) {
                    tracing::debug!(
                        repo_id = %repo_id,
                        "repo found via search despite direct 404; canonical 404 still stands"
                    );
                }
            }
            return Err(HubError::NotFound { message });
        }
        Err(e) => return Err(e),
    };

    let files = hub.list_files_detailed(repo_id).await?;
    let manifest = RepoManifest {
        repo_id: repo_id.clone(),
        files: files
            .into_iter()
            .map(|f| FileEntry {
                name: f.rfilename,
                expected_size: f.size,
                expected_sha256: f.sha256,
            })
            .collect(),
        sha: info.sha,
        fetched_at: Utc::now(),
    };

    Ok(CachedMetadata {
        manifest,
        downloads: info.downloads,
        likes: info.likes,
        tags: info.tags,
        pipeline_tag: info.pipeline_tag,
        created_at: info.created_at,
        library_name: info.library_name,
        cached_at: Utc::now(),
        cache_version: CACHE_VERSION,
    })
}

fn total_bytes_if_all_known(plan: &[FileEntry]) -> Option<u64> {
    plan.iter()
        .map(|f| f.expected_size)
        .collect::<Option<Vec<_>>>()
        .map(|sizes| sizes.into_iter().sum())
}

/// Compare a just-completed download's observed size/hash against the
/// manifest's declared expectations (§4.6e).
fn check_download(entry: &FileEntry, actual_size: u64, actual_hash: &str) -> Option<HubError> {
    if let Some(expected) = entry.expected_size {
        if actual_size != expected {
            return Some(HubError::Corrupted {
                file: entry.name.clone(),
                reason: format!("size mismatch: got {actual_size}, expected {expected}"),
            });
        }
    }

    if let Some(expected_hash) = &entry.expected_sha256 {
        if actual_hash != expected_hash {
            return Some(HubError::Corrupted {
                file: entry.name.clone(),
                reason: format!("hash mismatch: got {actual_hash}, expected {expected_hash}"),
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdMutex;

    use hfcache_core::{
        BackoffConfig, BoxFetchFuture, RemoteFileInfo, RepoInfo, SearchHit, UpdateResult,
    };

    /// Canned chunk sequence for a file, plus optional injected failures.
    #[derive(Clone)]
    struct ScriptedFile {
        bytes: Vec<u8>,
    }

    struct FakeHub {
        files: StdMutex<StdHashMap<(String, String), ScriptedFile>>,
        repo_infos: StdHashMap<String, RepoInfo>,
        file_lists: StdHashMap<String, Vec<RemoteFileInfo>>,
        /// Number of times `download_file` should fail with a transport error
        /// before succeeding, keyed by `(repo, file)`.
        fail_before_success: StdMutex<StdHashMap<(String, String), u8>>,
    }

    #[async_trait]
    impl HubClientPort for FakeHub {
        async fn search(&self, _query: &str, _limit: usize) -> HubResult<Vec<SearchHit>> {
            Ok(Vec::new())
        }

        async fn get_repo_info(&self, repo_id: &RepoId) -> HubResult<RepoInfo> {
            self.repo_infos
                .get(&repo_id.as_str())
                .cloned()
                .ok_or_else(|| HubError::NotFound {
                    message: "no such repo".into(),
                })
        }

        async fn list_files_detailed(&self, repo_id: &RepoId) -> HubResult<Vec<RemoteFileInfo>> {
            Ok(self
                .file_lists
                .get(&repo_id.as_str())
                .cloned()
                .unwrap_or_default())
        }

        async fn file_size(&self, _repo_id: &RepoId, _file_path: &str) -> HubResult<Option<u64>> {
            Ok(None)
        }

        async fn download_file(
            &self,
            repo_id: &RepoId,
            file_path: &str,
            offset: u64,
            on_chunk: &mut (dyn FnMut(DownloadChunk) -> HubResult<()> + Send),
        ) -> HubResult<()> {
            let key = (repo_id.as_str(), file_path.to_string());

            {
                let mut fails = self.fail_before_success.lock().unwrap();
                if let Some(remaining) = fails.get_mut(&key) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(HubError::NetworkError {
                            message: "simulated transport failure".into(),
                        });
                    }
                }
            }

            let files = self.files.lock().unwrap();
            let file = files.get(&key).expect("scripted file must exist");
            let data = &file.bytes[offset as usize..];
            for chunk in data.chunks(7) {
                on_chunk(DownloadChunk {
                    offset,
                    data: chunk.to_vec(),
                })?;
            }
            Ok(())
        }

        async fn validate_token(&self) -> HubResult<bool> {
            Ok(true)
        }
    }

    struct InMemoryMetadataCache {
        records: StdMutex<StdHashMap<String, CachedMetadata>>,
    }

    impl InMemoryMetadataCache {
        fn new() -> Self {
            Self {
                records: StdMutex::new(StdHashMap::new()),
            }
        }

        fn seed(&self, repo_id: &RepoId, manifest: RepoManifest) {
            self.records.lock().unwrap().insert(
                repo_id.as_str(),
                CachedMetadata {
                    manifest,
                    downloads: 0,
                    likes: 0,
                    tags: Vec::new(),
                    pipeline_tag: None,
                    created_at: None,
                    library_name: None,
                    cached_at: Utc::now(),
                    cache_version: CACHE_VERSION,
                },
            );
        }
    }

    #[async_trait]
    impl MetadataCachePort for InMemoryMetadataCache {
        async fn get(&self, repo_id: &RepoId) -> HubResult<Option<CachedMetadata>> {
            Ok(self.records.lock().unwrap().get(&repo_id.as_str()).cloned())
        }

        async fn get_or_fetch(
            &self,
            repo_id: &RepoId,
            fetch: Box<dyn FnOnce() -> BoxFetchFuture + Send>,
        ) -> HubResult<CachedMetadata> {
            if let Some(existing) = self.records.lock().unwrap().get(&repo_id.as_str()).cloned() {
                return Ok(existing);
            }
            let fetched = fetch().await?;
            self.records
                .lock()
                .unwrap()
                .insert(repo_id.as_str(), fetched.clone());
            Ok(fetched)
        }

        async fn update(&self, _repo_id: &RepoId, _result: UpdateResult) -> HubResult<()> {
            Ok(())
        }

        async fn batch_update(&self, _updates: Vec<(RepoId, UpdateResult)>) -> HubResult<()> {
            Ok(())
        }

        async fn is_missing_suppressed(&self, _repo_id: &RepoId) -> HubResult<bool> {
            Ok(false)
        }

        async fn clear_expired(&self) -> HubResult<usize> {
            Ok(0)
        }

        async fn clear_all(&self) -> HubResult<()> {
            Ok(())
        }
    }

    fn repo() -> RepoId {
        RepoId::parse("owner/repo").unwrap()
    }

    fn coordinator_with(
        hub: FakeHub,
        cache: InMemoryMetadataCache,
    ) -> (tempfile::TempDir, tempfile::TempDir, DownloadCoordinator<FakeHub, InMemoryMetadataCache>) {
        let cache_dir = tempfile::tempdir().unwrap();
        let temp_dir = tempfile::tempdir().unwrap();
        let directories = DirectoryManager::new(cache_dir.path().to_path_buf());
        let coordinator = DownloadCoordinator::new(
            Arc::new(hub),
            Arc::new(cache),
            directories,
            NetworkFailureManager::new(BackoffConfig::default()),
            StateHub::new(),
            temp_dir.path().join("tmp"),
            DownloadCoordinatorConfig {
                progress_tick: Duration::from_millis(5),
                ..DownloadCoordinatorConfig::default()
            },
        )
        .unwrap();
        (cache_dir, temp_dir, coordinator)
    }

    #[tokio::test]
    async fn fresh_happy_path_materialises_every_file() {
        let repo_id = repo();
        let config_bytes = b"{\"a\":1}".to_vec();
        let tok_bytes = b"tok-contents".to_vec();

        let mut files = StdHashMap::new();
        files.insert(
            (repo_id.as_str(), "config.json".to_string()),
            ScriptedFile {
                bytes: config_bytes.clone(),
            },
        );
        files.insert(
            (repo_id.as_str(), "tokenizer.json".to_string()),
            ScriptedFile {
                bytes: tok_bytes.clone(),
            },
        );

        let mut repo_infos = StdHashMap::new();
        repo_infos.insert(
            repo_id.as_str(),
            RepoInfo {
                repo_id: repo_id.clone(),
                sha: Some("deadbeef".into()),
                downloads: 10,
                likes: 2,
                tags: Vec::new(),
                pipeline_tag: None,
                created_at: None,
                library_name: None,
            },
        );

        let mut file_lists = StdHashMap::new();
        file_lists.insert(
            repo_id.as_str(),
            vec![
                RemoteFileInfo {
                    rfilename: "config.json".into(),
                    size: Some(config_bytes.len() as u64),
                    sha256: None,
                },
                RemoteFileInfo {
                    rfilename: "tokenizer.json".into(),
                    size: Some(tok_bytes.len() as u64),
                    sha256: None,
                },
            ],
        );

        let hub = FakeHub {
            files: StdMutex::new(files),
            repo_infos,
            file_lists,
            fail_before_success: StdMutex::new(StdHashMap::new()),
        };
        let cache = InMemoryMetadataCache::new();
        let (_cache_dir, _temp_dir, coordinator) = coordinator_with(hub, cache);

        coordinator.start_download(&repo_id).await.unwrap();

        let state = coordinator.state.get(&repo_id).await;
        assert!(state.is_downloaded);
        assert_eq!(
            state.downloaded_bytes,
            (config_bytes.len() + tok_bytes.len()) as u64
        );

        let flat_config = coordinator.directories.flat_path(&repo_id, "config.json");
        assert_eq!(std::fs::read(flat_config).unwrap(), config_bytes);
    }

    #[tokio::test]
    async fn transport_failure_retries_then_succeeds() {
        let repo_id = repo();
        let bytes = b"0123456789abcdef".to_vec();

        let mut files = StdHashMap::new();
        files.insert(
            (repo_id.as_str(), "weights.bin".to_string()),
            ScriptedFile {
                bytes: bytes.clone(),
            },
        );

        let mut repo_infos = StdHashMap::new();
        repo_infos.insert(
            repo_id.as_str(),
            RepoInfo {
                repo_id: repo_id.clone(),
                sha: None,
                downloads: 0,
                likes: 0,
                tags: Vec::new(),
                pipeline_tag: None,
                created_at: None,
                library_name: None,
            },
        );

        let mut file_lists = StdHashMap::new();
        file_lists.insert(
            repo_id.as_str(),
            vec![RemoteFileInfo {
                rfilename: "weights.bin".into(),
                size: Some(bytes.len() as u64),
                sha256: None,
            }],
        );

        let mut fail_before_success = StdHashMap::new();
        fail_before_success.insert((repo_id.as_str(), "weights.bin".to_string()), 2);

        let hub = FakeHub {
            files: StdMutex::new(files),
            repo_infos,
            file_lists,
            fail_before_success: StdMutex::new(fail_before_success),
        };
        let cache = InMemoryMetadataCache::new();
        let (_cache_dir, _temp_dir, coordinator) = coordinator_with(hub, cache);

        coordinator.start_download(&repo_id).await.unwrap();

        let flat = coordinator.directories.flat_path(&repo_id, "weights.bin");
        assert_eq!(std::fs::read(flat).unwrap(), bytes);
    }

    #[tokio::test]
    async fn backoff_short_circuits_without_touching_hub() {
        let repo_id = repo();
        let hub = FakeHub {
            files: StdMutex::new(StdHashMap::new()),
            repo_infos: StdHashMap::new(),
            file_lists: StdHashMap::new(),
            fail_before_success: StdMutex::new(StdHashMap::new()),
        };
        let cache = InMemoryMetadataCache::new();
        let (_cache_dir, _temp_dir, coordinator) = coordinator_with(hub, cache);

        coordinator
            .backoff
            .record_failure(&repo_id, "network_error", None)
            .await;

        let result = coordinator.start_download(&repo_id).await;
        assert!(matches!(result, Err(HubError::NetworkBackoff { .. })));
    }

    #[tokio::test]
    async fn redownload_file_repairs_a_single_entry() {
        let repo_id = repo();
        let good = b"good-bytes".to_vec();

        let mut files = StdHashMap::new();
        files.insert(
            (repo_id.as_str(), "tokenizer.json".to_string()),
            ScriptedFile {
                bytes: good.clone(),
            },
        );
        let hub = FakeHub {
            files: StdMutex::new(files),
            repo_infos: StdHashMap::new(),
            file_lists: StdHashMap::new(),
            fail_before_success: StdMutex::new(StdHashMap::new()),
        };

        let cache = InMemoryMetadataCache::new();
        let manifest = RepoManifest {
            repo_id: repo_id.clone(),
            files: vec![FileEntry {
                name: "tokenizer.json".into(),
                expected_size: Some(good.len() as u64),
                expected_sha256: None,
            }],
            sha: None,
            fetched_at: Utc::now(),
        };
        cache.seed(&repo_id, manifest);

        let (_cache_dir, _temp_dir, coordinator) = coordinator_with(hub, cache);
        coordinator
            .redownload_file(&repo_id, "tokenizer.json")
            .await
            .unwrap();

        let flat = coordinator.directories.flat_path(&repo_id, "tokenizer.json");
        assert_eq!(std::fs::read(flat).unwrap(), good);
    }

    #[tokio::test]
    async fn cancellation_mid_download_surfaces_cancelled_and_cleans_temp() {
        let repo_id = repo();
        let bytes = vec![0u8; 4096];

        let mut files = StdHashMap::new();
        files.insert(
            (repo_id.as_str(), "big.bin".to_string()),
            ScriptedFile {
                bytes: bytes.clone(),
            },
        );
        let mut repo_infos = StdHashMap::new();
        repo_infos.insert(
            repo_id.as_str(),
            RepoInfo {
                repo_id: repo_id.clone(),
                sha: None,
                downloads: 0,
                likes: 0,
                tags: Vec::new(),
                pipeline_tag: None,
                created_at: None,
                library_name: None,
            },
        );
        let mut file_lists = StdHashMap::new();
        file_lists.insert(
            repo_id.as_str(),
            vec![RemoteFileInfo {
                rfilename: "big.bin".into(),
                size: Some(bytes.len() as u64),
                sha256: None,
            }],
        );

        let hub = FakeHub {
            files: StdMutex::new(files),
            repo_infos,
            file_lists,
            fail_before_success: StdMutex::new(StdHashMap::new()),
        };
        let cache = InMemoryMetadataCache::new();
        let (_cache_dir, _temp_dir, coordinator) = coordinator_with(hub, cache);

        // A token cancelled before the plan loop starts is observed at the
        // first per-file boundary, short-circuiting without any network call.
        let token = CancellationToken::new();
        token.cancel();
        let result = coordinator.run_download(&repo_id, &token).await;
        assert!(matches!(result, Err(HubError::Cancelled)));
    }
}
