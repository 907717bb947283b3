//! JSON-file-backed, single-writer metadata store implementing
//! [`MetadataCachePort`] (§4.3).
//!
//! Mutations go through one `tokio::sync::Mutex`, which is what makes this a
//! single-writer actor: readers and writers alike serialise on it, so no two
//! mutations interleave and every reader sees a consistent snapshot. Disk
//! writes are best-effort; a write failure logs and leaves the in-memory
//! state (and thus subsequent reads) correct, per §4.3's failure policy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use hfcache_core::error::{HubError, HubResult};
use hfcache_core::manifest::{CachedMetadata, MissingRepoRecord, RepoId};
use hfcache_core::ports::{BoxFetchFuture, MetadataCachePort, MetadataChanged, UpdateResult};

/// Minimum pacing between writes in [`JsonMetadataStore::batch_update`].
const BATCH_PACING: Duration = Duration::from_millis(100);

/// On-disk representation: `BTreeMap` keys serialise in sorted order, giving
/// us "sorted keys" for free without a custom serializer (§6).
#[derive(Debug, Default, Serialize, Deserialize)]
struct OnDiskStore {
    records: BTreeMap<String, CachedMetadata>,
    missing: BTreeMap<String, MissingRepoRecord>,
}

struct StoreState {
    records: BTreeMap<String, CachedMetadata>,
    missing: BTreeMap<String, MissingRepoRecord>,
}

impl StoreState {
    fn from_disk(disk: OnDiskStore) -> Self {
        Self {
            records: disk.records,
            missing: disk.missing,
        }
    }

    fn to_disk(&self) -> OnDiskStore {
        OnDiskStore {
            records: self.records.clone(),
            missing: self.missing.clone(),
        }
    }
}

/// Persistence for repo manifests and hub metadata (C3), backed by a single
/// pretty-printed JSON file.
pub struct JsonMetadataStore {
    path: PathBuf,
    state: Mutex<StoreState>,
    changes: broadcast::Sender<MetadataChanged>,
}

impl JsonMetadataStore {
    /// Open (or create) the store at `path`, loading any existing state.
    /// A missing or unparsable file starts the store empty rather than
    /// failing — this is itself the degrade-to-in-memory path applied at
    /// startup.
    pub async fn open(path: PathBuf) -> Self {
        let state = Self::load(&path).await;
        let (changes, _) = broadcast::channel(32);
        Self {
            path,
            state: Mutex::new(state),
            changes,
        }
    }

    async fn load(path: &Path) -> StoreState {
        match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<OnDiskStore>(&bytes) {
                Ok(disk) => StoreState::from_disk(disk),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "metadata store file is corrupt, starting empty");
                    StoreState::from_disk(OnDiskStore::default())
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                StoreState::from_disk(OnDiskStore::default())
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not read metadata store, starting empty");
                StoreState::from_disk(OnDiskStore::default())
            }
        }
    }

    /// Persist the current state to disk. Failures are logged, not
    /// propagated: the in-memory state (already mutated by the caller)
    /// remains the source of truth for this process.
    async fn persist(&self, state: &StoreState) {
        let Some(parent) = self.path.parent() else {
            return;
        };
        if let Err(err) = tokio::fs::create_dir_all(parent).await {
            tracing::warn!(path = %parent.display(), error = %err, "could not create metadata store directory");
            return;
        }

        let on_disk = state.to_disk();
        let body = match serde_json::to_vec_pretty(&on_disk) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(error = %err, "could not serialize metadata store");
                return;
            }
        };

        if let Err(err) = tokio::fs::write(&self.path, body).await {
            tracing::warn!(path = %self.path.display(), error = %err, "could not write metadata store, continuing in-memory only");
        }
    }

    /// Subscribe to `MetadataChanged` events. Lagging subscribers miss
    /// intermediate events but never block a writer.
    pub fn subscribe(&self) -> broadcast::Receiver<MetadataChanged> {
        self.changes.subscribe()
    }

    fn notify(&self, repo_id: &RepoId) {
        let _ = self.changes.send(MetadataChanged {
            repo_id: repo_id.clone(),
        });
    }
}

#[async_trait]
impl MetadataCachePort for JsonMetadataStore {
    async fn get(&self, repo_id: &RepoId) -> HubResult<Option<CachedMetadata>> {
        let state = self.state.lock().await;
        let now = Utc::now();
        Ok(state
            .records
            .get(&repo_id.as_str())
            .filter(|record| record.is_fresh(now))
            .cloned())
    }

    async fn get_or_fetch(
        &self,
        repo_id: &RepoId,
        fetch: Box<dyn FnOnce() -> BoxFetchFuture + Send>,
    ) -> HubResult<CachedMetadata> {
        if let Some(cached) = self.get(repo_id).await? {
            return Ok(cached);
        }

        if self.is_missing_suppressed(repo_id).await? {
            return Err(HubError::NotFound {
                message: format!("{repo_id} is suppressed as missing"),
            });
        }

        match fetch().await {
            Ok(metadata) => {
                self.update(repo_id, UpdateResult::Found(metadata.clone())).await?;
                Ok(metadata)
            }
            Err(HubError::NotFound { message }) => {
                self.update(repo_id, UpdateResult::Missing).await?;
                Err(HubError::NotFound { message })
            }
            Err(err) => Err(err),
        }
    }

    async fn update(&self, repo_id: &RepoId, result: UpdateResult) -> HubResult<()> {
        {
            let mut state = self.state.lock().await;
            match result {
                UpdateResult::Found(metadata) => {
                    state.records.insert(repo_id.as_str(), metadata);
                    state.missing.remove(&repo_id.as_str());
                }
                UpdateResult::Missing => {
                    state.missing.insert(
                        repo_id.as_str(),
                        MissingRepoRecord {
                            repo_id: repo_id.clone(),
                            last_seen_missing: Utc::now(),
                        },
                    );
                }
            }
            self.persist(&state).await;
        }
        self.notify(repo_id);
        Ok(())
    }

    async fn batch_update(&self, updates: Vec<(RepoId, UpdateResult)>) -> HubResult<()> {
        let mut first = true;
        for (repo_id, result) in updates {
            if !first {
                tokio::time::sleep(BATCH_PACING).await;
            }
            first = false;
            self.update(&repo_id, result).await?;
        }
        Ok(())
    }

    async fn is_missing_suppressed(&self, repo_id: &RepoId) -> HubResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .missing
            .get(&repo_id.as_str())
            .is_some_and(|record| record.is_suppressing(Utc::now())))
    }

    async fn clear_expired(&self) -> HubResult<usize> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let before = state.records.len() + state.missing.len();
        state.records.retain(|_, record| record.is_fresh(now));
        state.missing.retain(|_, record| record.is_suppressing(now));
        let removed = before - (state.records.len() + state.missing.len());

        self.persist(&state).await;
        Ok(removed)
    }

    async fn clear_all(&self) -> HubResult<()> {
        let mut state = self.state.lock().await;
        state.records.clear();
        state.missing.clear();
        self.persist(&state).await;
        Ok(())
    }
}
