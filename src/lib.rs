//! Composition root for the model acquisition, verification and repair
//! engine: wires the eight components (C1-C8) from `hfcache-core`,
//! `hfcache-store`, `hfcache-hf`, and `hfcache-download` into a single
//! [`Engine`] and exposes the external interface consumers (a CLI, a GUI
//! runtime, a web adapter) call into (§6).
//!
//! Library crates only emit `tracing` spans/events; installing a subscriber
//! is this crate's job, via [`init_tracing`].

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hfcache_core::{
    BackoffConfig, CacheDirSource, DirectoryManager, HubResult, NetworkFailureManager, RepoId,
    RepoState, StateHub, VerificationOutcome, VerificationService,
};
use hfcache_download::{DownloadCoordinator, DownloadCoordinatorConfig};
use hfcache_hf::{DefaultHfClient, HfClientConfig};
use hfcache_store::JsonMetadataStore;

/// Concrete download coordinator type the engine assembles: a
/// [`DownloadCoordinator`] over the production hub client and metadata
/// store, also serving as the [`hfcache_core::DownloadTriggerPort`] the
/// verification service repairs through.
type Coordinator = DownloadCoordinator<DefaultHfClient, JsonMetadataStore>;

/// Builder-pattern configuration for [`Engine::new`], covering every option
/// in §6's configuration table.
///
/// Mirrors [`HfClientConfig`]'s shape: `#[must_use]` methods, `const fn`
/// setters for `Copy` values, and a `Default` impl holding the concrete
/// numeric defaults below.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Explicit override for the cache base directory. Falls back to the
    /// `HFCACHE_CACHE_DIR` environment variable, then the platform default,
    /// via the same precedence [`hfcache_core::resolve_cache_dir`] applies.
    cache_base: Option<String>,
    /// Explicit override for the metadata cache store's file path. Falls
    /// back to [`hfcache_store::default_store_path`].
    metadata_store_path: Option<PathBuf>,
    /// Explicit hub token, bypassing keychain/env resolution.
    token: Option<String>,
    /// Global cap on concurrently active repo downloads (default 4).
    max_concurrent_downloads: usize,
    /// Per-file transport-error retries before giving up (default 3).
    max_file_retries: u8,
    /// Minimum interval between progress publishes while streaming a file
    /// (`progress_throttle.bytes_ms`, default 150ms).
    progress_tick: Duration,
    /// Exponential backoff schedule for the network failure manager.
    backoff: BackoffConfig,
}

impl EngineConfig {
    /// Start from the documented defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the cache base directory.
    #[must_use]
    pub fn with_cache_base(mut self, cache_base: impl Into<String>) -> Self {
        self.cache_base = Some(cache_base.into());
        self
    }

    /// Override where the metadata cache JSON file lives.
    #[must_use]
    pub fn with_metadata_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_store_path = Some(path.into());
        self
    }

    /// Supply an explicit hub token, bypassing keychain/env resolution.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the global concurrent-download cap.
    #[must_use]
    pub const fn with_max_concurrent_downloads(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = max;
        self
    }

    /// Set the per-file transport-error retry count.
    #[must_use]
    pub const fn with_max_file_retries(mut self, retries: u8) -> Self {
        self.max_file_retries = retries;
        self
    }

    /// Set the minimum interval between in-flight progress publishes.
    #[must_use]
    pub const fn with_progress_tick(mut self, tick: Duration) -> Self {
        self.progress_tick = tick;
        self
    }

    /// Set the exponential backoff schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_base: None,
            metadata_store_path: None,
            token: None,
            max_concurrent_downloads: 4,
            max_file_retries: 3,
            progress_tick: Duration::from_millis(150),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Install a `tracing-subscriber` reading `RUST_LOG` (or `info` by default)
/// at the process boundary. Call once, before constructing an [`Engine`].
/// Library crates never do this themselves (§10.1).
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// The assembled engine: every external operation in §6 as a method.
///
/// Construct one per process; it owns the process-wide collaborators (the
/// metadata store's single writer, the state hub, the backoff gate) as
/// explicit fields rather than hidden statics.
pub struct Engine {
    directories: DirectoryManager,
    metadata: Arc<JsonMetadataStore>,
    state: StateHub,
    downloader: Arc<Coordinator>,
    verification: VerificationService<JsonMetadataStore, Coordinator>,
}

impl Engine {
    /// Assemble the engine: resolve the cache directory, open the metadata
    /// store, build the hub client, and wire C1-C8 together.
    pub async fn new(config: EngineConfig) -> HubResult<Self> {
        let resolution = hfcache_core::resolve_cache_dir(config.cache_base.as_deref())
            .map_err(|e| hfcache_core::HubError::InvalidRequest {
                message: e.to_string(),
            })?;
        tracing::info!(
            cache_base = %resolution.path.display(),
            source = ?resolution.source,
            "resolved cache base directory"
        );
        if matches!(resolution.source, CacheDirSource::Default) {
            tracing::debug!("no explicit cache_base or HFCACHE_CACHE_DIR set, using platform default");
        }

        let directories = DirectoryManager::new(resolution.path);
        directories.ensure_base()?;

        let store_path = config
            .metadata_store_path
            .or_else(hfcache_store::default_store_path)
            .ok_or_else(|| hfcache_core::HubError::InvalidRequest {
                message: "could not resolve a metadata store path".to_string(),
            })?;
        let metadata = Arc::new(JsonMetadataStore::open(store_path).await);

        let hub_config = HfClientConfig::new().with_optional_token(config.token);
        let hub = Arc::new(DefaultHfClient::new(&hub_config));

        let backoff = NetworkFailureManager::new(config.backoff);
        let state = StateHub::new();

        let temp_root = directories.base().join(".tmp-downloads");
        let downloader = Arc::new(DownloadCoordinator::new(
            Arc::clone(&hub),
            Arc::clone(&metadata),
            directories.clone(),
            backoff.clone(),
            state.clone(),
            temp_root,
            DownloadCoordinatorConfig {
                max_concurrent_downloads: config.max_concurrent_downloads,
                max_file_retries: config.max_file_retries,
                progress_tick: config.progress_tick,
            },
        )?);

        let verification = VerificationService::new(
            Arc::clone(&metadata),
            Arc::clone(&downloader),
            directories.clone(),
            state.clone(),
        );

        Ok(Self {
            directories,
            metadata,
            state,
            downloader,
            verification,
        })
    }

    /// Begin (or resume) downloading `repo_id`. Progress streams through
    /// [`Self::subscribe`]; this call resolves once the repo is fully
    /// downloaded, backed off, or failed.
    pub async fn start_download(&self, repo_id: &RepoId) -> HubResult<()> {
        self.downloader.start_download(repo_id).await
    }

    /// Cancel an in-flight download for `repo_id`, if any. Partial temp
    /// files are deleted within the suspension-point boundary (§5).
    pub async fn cancel_download(&self, repo_id: &RepoId) {
        self.downloader.cancel(repo_id).await;
    }

    /// Remove every file for `repo_id` from both on-disk layouts and drop
    /// its observable state.
    pub async fn delete(&self, repo_id: &RepoId) -> HubResult<()> {
        self.directories.delete(repo_id)?;
        self.state.remove(repo_id).await;
        Ok(())
    }

    /// Run a full verify+repair pass against `repo_id`'s cached manifest.
    pub async fn verify_and_repair(&self, repo_id: &RepoId) -> HubResult<VerificationOutcome> {
        self.verification.verify_and_repair(repo_id).await
    }

    /// Delete `repo_id` entirely, redownload every file, then verify.
    pub async fn force_redownload_and_repair(&self, repo_id: &RepoId) -> HubResult<VerificationOutcome> {
        self.verification.force_redownload_and_repair(repo_id).await
    }

    /// List every repo that looks fully downloaded under the flat layout
    /// (§8's enumerator soundness property): a tokenizer artifact and a
    /// weight artifact present, and, when a manifest for the repo is
    /// already cached, every declared file of either kind also passes a
    /// size check against it. Repos with no cached manifest yet (e.g.
    /// populated by another tool) are reported on presence alone, since
    /// there is nothing to validate sizes against.
    pub async fn enumerate_downloaded(&self) -> HubResult<Vec<RepoId>> {
        let candidates = self.directories.enumerate_downloaded()?;
        let mut sound = Vec::with_capacity(candidates.len());
        for repo_id in candidates {
            if self.passes_size_check(&repo_id).await {
                sound.push(repo_id);
            }
        }
        Ok(sound)
    }

    /// Whether every tokenizer/weight file declared in `repo_id`'s cached
    /// manifest (if any) matches its on-disk size under the flat layout.
    async fn passes_size_check(&self, repo_id: &RepoId) -> bool {
        let Ok(Some(cached)) = self.metadata.get(repo_id).await else {
            return true;
        };
        for file in &cached.manifest.files {
            if !(file.is_tokenizer() || file.is_weight()) {
                continue;
            }
            let Some(expected) = file.expected_size else {
                continue;
            };
            let path = self.directories.flat_path(repo_id, &file.name);
            match std::fs::metadata(&path) {
                Ok(m) if m.len() == expected => {}
                _ => return false,
            }
        }
        true
    }

    /// Subscribe to `repo_id`'s observable state (§4.8).
    pub async fn subscribe(&self, repo_id: &RepoId) -> tokio::sync::watch::Receiver<RepoState> {
        self.state.subscribe(repo_id).await
    }

    /// Read `repo_id`'s current observable state without subscribing.
    pub async fn get_state(&self, repo_id: &RepoId) -> RepoState {
        self.state.get(repo_id).await
    }

    /// Path of `relative_path` within `repo_id`'s flat, loader-friendly
    /// layout, regardless of whether the file exists yet.
    #[must_use]
    pub fn get_model_path(&self, repo_id: &RepoId, relative_path: &str) -> PathBuf {
        self.directories.flat_path(repo_id, relative_path)
    }

    /// The resolved cache base directory this engine is rooted at.
    #[must_use]
    pub fn cache_base(&self) -> &Path {
        self.directories.base()
    }

    /// Access to the metadata cache, for callers that need to subscribe to
    /// raw `MetadataChanged` events rather than go through download/verify.
    #[must_use]
    pub fn metadata(&self) -> &Arc<JsonMetadataStore> {
        &self.metadata
    }
}
