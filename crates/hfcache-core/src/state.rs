//! Observable State Hub (C8): a single-writer, many-reader state container
//! keyed by `repo_id` (§4.8).
//!
//! Re-architected per §9's redesign note: rather than ~20 independently
//! published fields, each repo's state is a single `RepoState` value pushed
//! through one subscribable `tokio::sync::watch` channel. Downstream
//! consumers compute their own diffs and may apply their own rate limiting.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};

use crate::error::HubError;
use crate::manifest::RepoId;

/// Per-file progress within an active download (§3 `active_file_status`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveFileStatus {
    /// Index of this file within the download plan.
    pub index: usize,
    /// Total number of files in the plan.
    pub total: usize,
    /// Relative file name.
    pub name: String,
    /// Bytes downloaded for this file so far.
    pub downloaded_bytes: u64,
    /// Total size of this file, when known.
    pub total_bytes: Option<u64>,
    /// Fractional progress for this file, in `[0, 1]`.
    pub progress: f64,
}

/// Verification counters (§3 `verify_counters`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VerifyCounters {
    /// Files found missing during the scan.
    pub missing: usize,
    /// Files found corrupt (size or hash mismatch) during the scan.
    pub corrupt: usize,
    /// Files successfully repaired so far.
    pub repaired: usize,
    /// `missing + corrupt` at scan completion.
    pub total_to_repair: usize,
    /// Index of the file currently being scanned.
    pub scan_index: usize,
    /// Total number of files to scan.
    pub scan_total: usize,
}

/// A repo-level download/verify error record (§3 `download_error`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadErrorRecord {
    /// Human-readable message.
    pub message: String,
    /// Stable machine-readable kind, from [`HubError::kind`].
    pub kind: String,
    /// When the error occurred.
    pub timestamp: DateTime<Utc>,
}

impl DownloadErrorRecord {
    /// Build a record from a [`HubError`], stamped with the current time.
    #[must_use]
    pub fn from_error(err: &HubError) -> Self {
        Self {
            message: err.to_string(),
            kind: err.kind().to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// The full observable state for a single repo (§3, §4.8's state machine).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoState {
    /// The repo this state describes.
    pub repo_id: RepoId,
    /// Whether a download is currently in flight.
    pub is_downloading: bool,
    /// Overall download fraction in `[0, 1]`.
    pub download_progress: f64,
    /// Total bytes across the download plan, when known.
    pub total_bytes: Option<u64>,
    /// Bytes downloaded so far across the whole repo.
    pub downloaded_bytes: u64,
    /// Status of the file currently streaming, if any.
    pub active_file_status: Option<ActiveFileStatus>,
    /// Whether a verification pass is currently in flight.
    pub is_verifying: bool,
    /// Overall verification fraction in `[0, 1]`.
    pub verification_progress: f64,
    /// Verification counters for the in-flight or most recent pass.
    pub verify_counters: VerifyCounters,
    /// The most recent repo-level error, if any.
    pub download_error: Option<DownloadErrorRecord>,
    /// Whether the repo is currently considered terminally, fully downloaded.
    pub is_downloaded: bool,
    /// Monotonically increasing sequence number for this repo's state.
    pub seq: u64,
    /// When this snapshot was produced.
    pub updated_at: DateTime<Utc>,
}

impl RepoState {
    /// The idle/initial state for a repo that has not yet been touched.
    #[must_use]
    pub fn idle(repo_id: RepoId) -> Self {
        Self {
            repo_id,
            is_downloading: false,
            download_progress: 0.0,
            total_bytes: None,
            downloaded_bytes: 0,
            active_file_status: None,
            is_verifying: false,
            verification_progress: 0.0,
            verify_counters: VerifyCounters::default(),
            download_error: None,
            is_downloaded: false,
            seq: 0,
            updated_at: Utc::now(),
        }
    }
}

/// A single repo's channel pair: the hub keeps the sender, subscribers hold
/// receivers obtained via `subscribe`.
struct RepoChannel {
    sender: watch::Sender<RepoState>,
}

/// Thread-safe map of per-repo state, with pub-sub via `tokio::sync::watch`.
///
/// Mutations for a given repo are sequenced: `mutate` takes an exclusive
/// reference to that repo's current state and nothing else observes a
/// half-applied update, satisfying "the last write wins but no update is
/// lost relative to any other write on the same repo".
#[derive(Clone, Default)]
pub struct StateHub {
    channels: Arc<RwLock<HashMap<RepoId, RepoChannel>>>,
}

impl StateHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a repo's state, creating its idle channel if this is the
    /// first subscriber.
    pub async fn subscribe(&self, repo_id: &RepoId) -> watch::Receiver<RepoState> {
        if let Some(channel) = self.channels.read().await.get(repo_id) {
            return channel.sender.subscribe();
        }

        let mut channels = self.channels.write().await;
        let channel = channels.entry(repo_id.clone()).or_insert_with(|| {
            let (sender, _) = watch::channel(RepoState::idle(repo_id.clone()));
            RepoChannel { sender }
        });
        channel.sender.subscribe()
    }

    /// Read the current snapshot for a repo, without subscribing.
    pub async fn get(&self, repo_id: &RepoId) -> RepoState {
        if let Some(channel) = self.channels.read().await.get(repo_id) {
            return channel.sender.borrow().clone();
        }
        RepoState::idle(repo_id.clone())
    }

    /// Apply `update` to a repo's current state and publish the result.
    /// `seq` and `updated_at` are stamped by the hub, not the caller.
    pub async fn mutate(&self, repo_id: &RepoId, update: impl FnOnce(&mut RepoState)) {
        let mut channels = self.channels.write().await;
        let channel = channels.entry(repo_id.clone()).or_insert_with(|| {
            let (sender, _) = watch::channel(RepoState::idle(repo_id.clone()));
            RepoChannel { sender }
        });

        channel.sender.send_modify(|state| {
            update(state);
            state.seq += 1;
            state.updated_at = Utc::now();
        });
    }

    /// Remove a repo's channel entirely (on explicit deletion).
    pub async fn remove(&self, repo_id: &RepoId) {
        self.channels.write().await.remove(repo_id);
    }
}
