//! Directory Manager (C5): the two-layout on-disk cache scheme (§4.5).
//!
//! The blob store is the source of truth; snapshot and flat entries are
//! derived indexes that can be re-materialised from blobs + manifest at any
//! time (§9).

use std::path::{Path, PathBuf};

use crate::error::{HubError, HubResult};
use crate::manifest::{FileEntry, RepoId, TOKENIZER_ARTIFACTS};
use crate::paths::ensure::verify_writable;

/// Revision tracked by the engine. Only "main" is supported (§1 Non-goals:
/// no multi-revision history).
pub const MAIN_REVISION: &str = "main";

/// Owns the on-disk layout rooted at a cache base directory.
#[derive(Debug, Clone)]
pub struct DirectoryManager {
    base: PathBuf,
}

impl DirectoryManager {
    /// Construct a manager rooted at `base` (already resolved by
    /// [`crate::paths::cache::resolve_cache_dir`]).
    #[must_use]
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    /// The cache base directory.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Create the cache base directory if missing and verify it is writable.
    pub fn ensure_base(&self) -> HubResult<()> {
        std::fs::create_dir_all(&self.base)
            .map_err(|e| HubError::disk(self.base.display().to_string(), &e))?;
        verify_writable(&self.base).map_err(|e| HubError::DiskError {
            path: self.base.display().to_string(),
            source: crate::error::IoFailure {
                kind: "NotWritable".to_string(),
                message: e.to_string(),
            },
        })
    }

    fn repo_root(&self, repo_id: &RepoId) -> PathBuf {
        self.base.join(repo_id.cache_dirname())
    }

    fn blobs_dir(&self, repo_id: &RepoId) -> PathBuf {
        self.repo_root(repo_id).join("blobs")
    }

    /// Path of a blob given its repo and SHA-256 hash.
    #[must_use]
    pub fn blob_path(&self, repo_id: &RepoId, sha256: &str) -> PathBuf {
        self.blobs_dir(repo_id).join(sha256)
    }

    /// Path of a file within the content-addressed snapshot tree.
    #[must_use]
    pub fn snapshot_path(&self, repo_id: &RepoId, revision: &str, rel_path: &str) -> PathBuf {
        self.repo_root(repo_id)
            .join("snapshots")
            .join(revision)
            .join(rel_path)
    }

    /// Path of a file within the flat, loader-friendly layout.
    #[must_use]
    pub fn flat_path(&self, repo_id: &RepoId, rel_path: &str) -> PathBuf {
        self.base
            .join(repo_id.owner())
            .join(repo_id.name())
            .join(rel_path)
    }

    fn refs_main_path(&self, repo_id: &RepoId) -> PathBuf {
        self.repo_root(repo_id).join("refs").join(MAIN_REVISION)
    }

    /// Write `refs/main` with the active revision id.
    pub fn write_refs_main(&self, repo_id: &RepoId, revision: &str) -> HubResult<()> {
        let path = self.refs_main_path(repo_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HubError::disk(parent.display().to_string(), &e))?;
        }
        std::fs::write(&path, revision).map_err(|e| HubError::disk(path.display().to_string(), &e))
    }

    /// Atomically move a temp file into the blob store under `sha256`.
    ///
    /// If an identical blob already exists, the temp file is discarded
    /// instead (idempotent under concurrent downloads of the same content).
    pub fn promote_temp_to_blob(
        &self,
        repo_id: &RepoId,
        temp_path: &Path,
        sha256: &str,
    ) -> HubResult<PathBuf> {
        let blobs_dir = self.blobs_dir(repo_id);
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| HubError::disk(blobs_dir.display().to_string(), &e))?;

        let blob_path = self.blob_path(repo_id, sha256);
        if blob_path.exists() {
            let _ = std::fs::remove_file(temp_path);
            return Ok(blob_path);
        }

        rename_or_copy(temp_path, &blob_path)?;
        Ok(blob_path)
    }

    /// Ensure both the snapshot symlink and the flat-layout entry exist for
    /// `entry`, pointing at its blob. Prefers a hardlink, falls back to a
    /// copy across devices, and to a symlink if hardlinking is unsupported.
    pub fn materialise(
        &self,
        repo_id: &RepoId,
        revision: &str,
        entry: &FileEntry,
        sha256: &str,
    ) -> HubResult<()> {
        let blob = self.blob_path(repo_id, sha256);
        let snapshot = self.snapshot_path(repo_id, revision, &entry.name);
        let flat = self.flat_path(repo_id, &entry.name);

        link_into_place(&blob, &snapshot, true)?;
        link_into_place(&blob, &flat, false)?;
        Ok(())
    }

    /// Scan both layouts for repos that look downloaded: at least one
    /// tokenizer artifact and at least one weight artifact present under the
    /// flat layout (§4.5, §8 enumerator soundness).
    pub fn enumerate_downloaded(&self) -> HubResult<Vec<RepoId>> {
        let mut found = Vec::new();
        let Ok(owners) = std::fs::read_dir(&self.base) else {
            return Ok(found);
        };

        for owner_entry in owners.flatten() {
            let owner_path = owner_entry.path();
            if !owner_path.is_dir() {
                continue;
            }
            let owner_name = owner_entry.file_name();
            let Some(owner_str) = owner_name.to_str() else {
                continue;
            };
            // Skip the hub-cache-style directories; only flat-layout owner
            // directories are scanned here.
            if owner_str.starts_with("models--") {
                continue;
            }

            let Ok(repo_dirs) = std::fs::read_dir(&owner_path) else {
                continue;
            };
            for repo_entry in repo_dirs.flatten() {
                let repo_path = repo_entry.path();
                if !repo_path.is_dir() {
                    continue;
                }
                let Some(repo_name) = repo_entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let candidate = format!("{owner_str}/{repo_name}");
                let Some(repo_id) = RepoId::parse(&candidate) else {
                    continue;
                };

                if has_tokenizer_and_weight(&repo_path) {
                    found.push(repo_id);
                }
            }
        }

        Ok(found)
    }

    /// Remove blobs, snapshots, and the flat directory for a repo.
    pub fn delete(&self, repo_id: &RepoId) -> HubResult<()> {
        let repo_root = self.repo_root(repo_id);
        if repo_root.exists() {
            std::fs::remove_dir_all(&repo_root)
                .map_err(|e| HubError::disk(repo_root.display().to_string(), &e))?;
        }

        let flat_dir = self.base.join(repo_id.owner()).join(repo_id.name());
        if flat_dir.exists() {
            std::fs::remove_dir_all(&flat_dir)
                .map_err(|e| HubError::disk(flat_dir.display().to_string(), &e))?;
        }

        Ok(())
    }
}

fn has_tokenizer_and_weight(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };

    let mut has_tokenizer = false;
    let mut has_weight = false;

    for entry in entries.flatten() {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if TOKENIZER_ARTIFACTS.contains(&name.as_str()) {
            has_tokenizer = true;
        }
        if crate::manifest::is_weight_name(&name) {
            has_weight = true;
        }
        if has_tokenizer && has_weight {
            return true;
        }
    }

    false
}

/// Move `src` to `dst`, falling back to copy+remove across devices.
fn rename_or_copy(src: &Path, dst: &Path) -> HubResult<()> {
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            std::fs::copy(src, dst).map_err(|e| HubError::disk(dst.display().to_string(), &e))?;
            std::fs::remove_file(src).ok();
            Ok(())
        }
        Err(e) => Err(HubError::disk(dst.display().to_string(), &e)),
    }
}

/// `EXDEV` (cross-device link) errno, without depending on the `libc` crate.
/// Value `18` holds on Linux, macOS, and the BSDs.
const fn libc_exdev() -> i32 {
    18
}

/// Link `target` into place at `link_path`: hardlink preferred, copy if
/// cross-device, symlink otherwise. `prefer_symlink` requests a symlink
/// directly (used for the snapshot tree, which conventionally uses symlinks
/// to make the content-addressed nature visible).
fn link_into_place(target: &Path, link_path: &Path, prefer_symlink: bool) -> HubResult<()> {
    if let Some(parent) = link_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| HubError::disk(parent.display().to_string(), &e))?;
    }

    if link_path.exists() || link_path.is_symlink() {
        let _ = std::fs::remove_file(link_path);
    }

    if prefer_symlink {
        return symlink(target, link_path);
    }

    match std::fs::hard_link(target, link_path) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            std::fs::copy(target, link_path)
                .map(|_| ())
                .map_err(|e| HubError::disk(link_path.display().to_string(), &e))
        }
        Err(_) => symlink(target, link_path),
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link_path: &Path) -> HubResult<()> {
    std::os::unix::fs::symlink(target, link_path)
        .map_err(|e| HubError::disk(link_path.display().to_string(), &e))
}

#[cfg(windows)]
fn symlink(target: &Path, link_path: &Path) -> HubResult<()> {
    std::os::windows::fs::symlink_file(target, link_path)
        .map_err(|e| HubError::disk(link_path.display().to_string(), &e))
}
