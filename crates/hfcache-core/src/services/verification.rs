//! Verification Service (C7): scan a repo's files against its cached
//! manifest, repair mismatches through the download coordinator, and publish
//! scan/repair progress through the state hub (§4.7).
//!
//! Generic over [`MetadataCachePort`] and [`DownloadTriggerPort`] so this
//! crate never depends on the download coordinator crate that implements the
//! latter.

use std::sync::Arc;

use crate::error::{HubError, HubResult};
use crate::integrity::{verify_file, Verdict};
use crate::manifest::RepoId;
use crate::paths::DirectoryManager;
use crate::ports::{DownloadTriggerPort, MetadataCachePort};
use crate::state::{StateHub, VerifyCounters};

/// Terminal outcome of a verify+repair pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Every declared file matched its expected size/hash.
    Healthy,
    /// One or more files were bad, and redownloading each fixed it.
    Repaired,
    /// One or more files are still bad after one repair attempt.
    Unrecoverable(Vec<String>),
}

/// A file found bad during the scan phase, carried forward into repair.
struct BadFile {
    name: String,
    expected_size: Option<u64>,
    expected_sha256: Option<String>,
}

/// Verifies a repo's files against its manifest and repairs mismatches via a
/// [`DownloadTriggerPort`].
///
/// Expects the manifest to already be cached: callers that want a
/// force-refresh should populate the metadata cache (e.g. via
/// `MetadataCachePort::get_or_fetch` against the hub client) before calling
/// [`Self::verify_and_repair`].
pub struct VerificationService<M, D> {
    metadata_cache: Arc<M>,
    download_trigger: Arc<D>,
    directories: DirectoryManager,
    state: StateHub,
}

impl<M, D> VerificationService<M, D>
where
    M: MetadataCachePort,
    D: DownloadTriggerPort,
{
    /// Build a verification service over a metadata cache, download trigger,
    /// directory manager, and state hub.
    #[must_use]
    pub fn new(
        metadata_cache: Arc<M>,
        download_trigger: Arc<D>,
        directories: DirectoryManager,
        state: StateHub,
    ) -> Self {
        Self {
            metadata_cache,
            download_trigger,
            directories,
            state,
        }
    }

    /// Scan every file in `repo_id`'s manifest, redownloading (once) any that
    /// are missing or mismatched, and report the terminal outcome.
    pub async fn verify_and_repair(&self, repo_id: &RepoId) -> HubResult<VerificationOutcome> {
        let manifest = self.load_manifest(repo_id).await?;
        let total = manifest.files.len();

        self.state
            .mutate(repo_id, |s| {
                s.is_verifying = true;
                s.verification_progress = 0.0;
                s.verify_counters = VerifyCounters {
                    scan_total: total,
                    ..VerifyCounters::default()
                };
            })
            .await;

        let mut bad = Vec::new();
        let mut missing = 0usize;
        let mut corrupt = 0usize;

        for (i, entry) in manifest.files.iter().enumerate() {
            let path = self.directories.flat_path(repo_id, &entry.name);
            let verdict = verify_file(&path, entry.expected_size, entry.expected_sha256.as_deref())?;

            match verdict {
                Verdict::Ok | Verdict::Unverifiable => {}
                Verdict::Missing => {
                    missing += 1;
                    bad.push(BadFile {
                        name: entry.name.clone(),
                        expected_size: entry.expected_size,
                        expected_sha256: entry.expected_sha256.clone(),
                    });
                }
                Verdict::SizeMismatch { .. } | Verdict::HashMismatch { .. } => {
                    corrupt += 1;
                    bad.push(BadFile {
                        name: entry.name.clone(),
                        expected_size: entry.expected_size,
                        expected_sha256: entry.expected_sha256.clone(),
                    });
                }
            }

            let scan_index = i + 1;
            self.state
                .mutate(repo_id, |s| {
                    s.verify_counters.scan_index = scan_index;
                    s.verify_counters.missing = missing;
                    s.verify_counters.corrupt = corrupt;
                    s.verification_progress = scan_index as f64 / total.max(1) as f64;
                })
                .await;
        }

        if bad.is_empty() {
            self.state
                .mutate(repo_id, |s| {
                    s.is_verifying = false;
                    s.verification_progress = 1.0;
                })
                .await;
            return Ok(VerificationOutcome::Healthy);
        }

        self.state
            .mutate(repo_id, |s| {
                s.verify_counters.total_to_repair = bad.len();
            })
            .await;

        let mut unrecoverable = Vec::new();
        let mut repaired = 0usize;

        for file in &bad {
            // A redownload failure (network, auth, backoff...) makes this one
            // file unrecoverable for this pass; it must not abort the repair
            // of the other bad files in the batch (§4.7 step 3).
            if self.download_trigger.redownload_file(repo_id, &file.name).await.is_err() {
                unrecoverable.push(file.name.clone());
                continue;
            }

            let path = self.directories.flat_path(repo_id, &file.name);
            let verdict = verify_file(&path, file.expected_size, file.expected_sha256.as_deref())?;
            if verdict.is_ok() {
                repaired += 1;
                self.state
                    .mutate(repo_id, |s| {
                        s.verify_counters.repaired = repaired;
                    })
                    .await;
            } else {
                unrecoverable.push(file.name.clone());
            }
        }

        self.state.mutate(repo_id, |s| s.is_verifying = false).await;

        if unrecoverable.is_empty() {
            tracing::info!(repo_id = %repo_id, repaired, "verification repaired all bad files");
            Ok(VerificationOutcome::Repaired)
        } else {
            tracing::warn!(
                repo_id = %repo_id,
                unrecoverable = unrecoverable.len(),
                "verification could not repair every file"
            );
            Ok(VerificationOutcome::Unrecoverable(unrecoverable))
        }
    }

    /// Delete everything on disk for `repo_id`, redownload every file in its
    /// manifest, then verify the result.
    pub async fn force_redownload_and_repair(&self, repo_id: &RepoId) -> HubResult<VerificationOutcome> {
        self.directories.delete(repo_id)?;

        let manifest = self.load_manifest(repo_id).await?;
        for entry in &manifest.files {
            // Ignore per-file errors here: the `verify_and_repair` pass below
            // re-scans every file and re-attempts anything still missing or
            // mismatched, converging on the correct terminal outcome instead
            // of this convenience method erroring out on the first bad file.
            let _ = self.download_trigger.redownload_file(repo_id, &entry.name).await;
        }

        self.verify_and_repair(repo_id).await
    }

    async fn load_manifest(&self, repo_id: &RepoId) -> HubResult<crate::manifest::RepoManifest> {
        self.metadata_cache
            .get(repo_id)
            .await?
            .map(|cached| cached.manifest)
            .ok_or_else(|| HubError::NotFound {
                message: format!("no cached manifest for {repo_id}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::manifest::{CachedMetadata, FileEntry, RepoManifest};
    use crate::ports::{BoxFetchFuture, MetadataChanged, UpdateResult};

    struct FakeMetadataCache {
        record: Mutex<Option<CachedMetadata>>,
    }

    impl FakeMetadataCache {
        fn with_manifest(manifest: RepoManifest) -> Self {
            Self {
                record: Mutex::new(Some(CachedMetadata {
                    manifest,
                    downloads: 0,
                    likes: 0,
                    tags: Vec::new(),
                    pipeline_tag: None,
                    created_at: None,
                    library_name: None,
                    cached_at: Utc::now(),
                    cache_version: crate::manifest::CACHE_VERSION,
                })),
            }
        }
    }

    #[async_trait]
    impl MetadataCachePort for FakeMetadataCache {
        async fn get(&self, _repo_id: &RepoId) -> HubResult<Option<CachedMetadata>> {
            Ok(self.record.lock().unwrap().clone())
        }

        async fn get_or_fetch(
            &self,
            _repo_id: &RepoId,
            _fetch: Box<dyn FnOnce() -> BoxFetchFuture + Send>,
        ) -> HubResult<CachedMetadata> {
            unimplemented!("not exercised by these tests")
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

    /// Writes a canned file into place whenever `redownload_file` is called,
    /// recording how many times each name was requested.
    struct ScriptedDownloader {
        contents: HashMap<String, Vec<u8>>,
        directories: DirectoryManager,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DownloadTriggerPort for ScriptedDownloader {
        async fn redownload_file(&self, repo_id: &RepoId, file_path: &str) -> HubResult<()> {
            self.calls.lock().unwrap().push(file_path.to_string());
            if let Some(bytes) = self.contents.get(file_path) {
                let path = self.directories.flat_path(repo_id, file_path);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(path, bytes).unwrap();
            }
            Ok(())
        }
    }

    fn repo() -> RepoId {
        RepoId::parse("owner/repo").unwrap()
    }

    fn service_for(
        manifest: RepoManifest,
        contents: HashMap<String, Vec<u8>>,
    ) -> (
        tempfile::TempDir,
        VerificationService<FakeMetadataCache, ScriptedDownloader>,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let directories = DirectoryManager::new(dir.path().to_path_buf());
        let cache = Arc::new(FakeMetadataCache::with_manifest(manifest));
        let downloader = Arc::new(ScriptedDownloader {
            contents,
            directories: directories.clone(),
            calls: Mutex::new(Vec::new()),
        });
        let service = VerificationService::new(cache, downloader, directories, StateHub::new());
        (dir, service)
    }

    #[tokio::test]
    async fn healthy_when_every_file_matches() {
        let path_entry = FileEntry {
            name: "config.json".into(),
            expected_size: Some(5),
            expected_sha256: None,
        };
        let manifest = RepoManifest {
            repo_id: repo(),
            files: vec![path_entry.clone()],
            sha: None,
            fetched_at: Utc::now(),
        };
        let (_dir, service) = service_for(manifest, HashMap::new());

        let flat = service.directories.flat_path(&repo(), &path_entry.name);
        std::fs::create_dir_all(flat.parent().unwrap()).unwrap();
        std::fs::write(&flat, b"hello").unwrap();

        let outcome = service.verify_and_repair(&repo()).await.unwrap();
        assert_eq!(outcome, VerificationOutcome::Healthy);
        assert_eq!(
            service.state.get(&repo()).await.verify_counters.scan_total,
            1
        );
    }

    #[tokio::test]
    async fn missing_file_gets_repaired_via_trigger() {
        let entry = FileEntry {
            name: "tokenizer.json".into(),
            expected_size: Some(2),
            expected_sha256: None,
        };
        let manifest = RepoManifest {
            repo_id: repo(),
            files: vec![entry],
            sha: None,
            fetched_at: Utc::now(),
        };
        let mut contents = HashMap::new();
        contents.insert("tokenizer.json".to_string(), vec![1, 2]);
        let (_dir, service) = service_for(manifest, contents);

        let outcome = service.verify_and_repair(&repo()).await.unwrap();
        assert_eq!(outcome, VerificationOutcome::Repaired);

        let state = service.state.get(&repo()).await;
        assert_eq!(state.verify_counters.missing, 1);
        assert_eq!(state.verify_counters.repaired, 1);
        assert!(!state.is_verifying);
    }

    #[tokio::test]
    async fn still_bad_after_repair_is_unrecoverable() {
        let entry = FileEntry {
            name: "model.bin".into(),
            expected_size: Some(100),
            expected_sha256: None,
        };
        let manifest = RepoManifest {
            repo_id: repo(),
            files: vec![entry],
            sha: None,
            fetched_at: Utc::now(),
        };
        // Downloader writes the wrong number of bytes, so the re-verify fails.
        let mut contents = HashMap::new();
        contents.insert("model.bin".to_string(), vec![0u8; 10]);
        let (_dir, service) = service_for(manifest, contents);

        let outcome = service.verify_and_repair(&repo()).await.unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::Unrecoverable(vec!["model.bin".to_string()])
        );
    }

    #[tokio::test]
    async fn missing_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let directories = DirectoryManager::new(dir.path().to_path_buf());
        let cache = Arc::new(FakeMetadataCache { record: Mutex::new(None) });
        let downloader = Arc::new(ScriptedDownloader {
            contents: HashMap::new(),
            directories: directories.clone(),
            calls: Mutex::new(Vec::new()),
        });
        let service = VerificationService::new(cache, downloader, directories, StateHub::new());

        let result = service.verify_and_repair(&repo()).await;
        assert!(matches!(result, Err(HubError::NotFound { .. })));
    }

    /// A downloader that always fails for a given set of file names, used to
    /// prove one file's redownload error doesn't abort repair of the rest.
    struct PartlyFailingDownloader {
        fails: Vec<String>,
        inner: ScriptedDownloader,
    }

    #[async_trait]
    impl DownloadTriggerPort for PartlyFailingDownloader {
        async fn redownload_file(&self, repo_id: &RepoId, file_path: &str) -> HubResult<()> {
            if self.fails.iter().any(|f| f == file_path) {
                return Err(HubError::NetworkError {
                    message: "simulated transport failure".into(),
                });
            }
            self.inner.redownload_file(repo_id, file_path).await
        }
    }

    #[tokio::test]
    async fn one_files_redownload_error_does_not_abort_repair_of_the_rest() {
        let bad_entry = FileEntry {
            name: "config.json".into(),
            expected_size: Some(2),
            expected_sha256: None,
        };
        let good_entry = FileEntry {
            name: "tokenizer.json".into(),
            expected_size: Some(2),
            expected_sha256: None,
        };
        let manifest = RepoManifest {
            repo_id: repo(),
            files: vec![bad_entry, good_entry],
            sha: None,
            fetched_at: Utc::now(),
        };

        let dir = tempfile::tempdir().unwrap();
        let directories = DirectoryManager::new(dir.path().to_path_buf());
        let cache = Arc::new(FakeMetadataCache::with_manifest(manifest));
        let mut contents = HashMap::new();
        contents.insert("tokenizer.json".to_string(), vec![9, 9]);
        let downloader = Arc::new(PartlyFailingDownloader {
            fails: vec!["config.json".to_string()],
            inner: ScriptedDownloader {
                contents,
                directories: directories.clone(),
                calls: Mutex::new(Vec::new()),
            },
        });
        let service = VerificationService::new(cache, downloader, directories, StateHub::new());

        let outcome = service.verify_and_repair(&repo()).await.unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::Unrecoverable(vec!["config.json".to_string()])
        );
    }
}
