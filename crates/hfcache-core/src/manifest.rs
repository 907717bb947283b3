//! Repository identifiers and the file/manifest data model (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extensions considered "weight" artifacts for `is_weight` derivation and
/// for the enumerator's weight-artifact check.
const WEIGHT_EXTENSIONS: &[&str] = &["safetensors", "bin", "gguf", "npz", "mlx"];

/// Names considered tokenizer artifacts for the enumerator's soundness check.
pub const TOKENIZER_ARTIFACTS: &[&str] =
    &["tokenizer.json", "tokenizer.model", "tokenizer_config.json"];

/// A normalised `owner/name` repository identifier.
///
/// Canonicalisation lower-cases the owner, preserves the name's original
/// case, and strips any `models--` prefix a caller might pass through by
/// mistake. Lookups are case-insensitive on owner, case-sensitive on name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    /// Parse and canonicalise a `owner/name` string.
    ///
    /// Returns `None` if the string does not split into exactly two non-empty
    /// segments.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        // Cache-dirname form (`models--owner--name`) uses `--` as the
        // owner/name separator; only rewrite it to `/` when that prefix was
        // actually present, so a plain `owner/name` whose name legitimately
        // contains a literal `--` is left untouched.
        let owned;
        let unprefixed = match trimmed.strip_prefix("models--") {
            Some(rest) => {
                owned = rest.replacen("--", "/", 1);
                owned.as_str()
            }
            None => trimmed,
        };
        let mut parts = unprefixed.splitn(2, '/');
        let owner = parts.next()?.trim();
        let name = parts.next()?.trim();
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_lowercase(),
            name: name.to_string(),
        })
    }

    /// The canonical `owner/name` string form, e.g. for use as a cache key.
    #[must_use]
    pub fn as_str(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// The owning org or user (already lower-cased).
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The repo name, case preserved.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The hub-cache-style directory name: `models--{owner}--{name}`.
    #[must_use]
    pub fn cache_dirname(&self) -> String {
        format!("models--{}--{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A single file entry within a repo manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Relative path of the file within the repo.
    pub name: String,
    /// Declared size in bytes, when known.
    pub expected_size: Option<u64>,
    /// Declared SHA-256, lower-case 64-hex, when known.
    pub expected_sha256: Option<String>,
}

/// Whether `name` names a model-weight artifact, derived from its extension.
/// Free function so callers that only have a name (not a whole [`FileEntry`])
/// don't need to construct one just to ask.
#[must_use]
pub fn is_weight_name(name: &str) -> bool {
    WEIGHT_EXTENSIONS
        .iter()
        .any(|ext| name.ends_with(&format!(".{ext}")))
}

impl FileEntry {
    /// Whether this entry names a model-weight artifact, derived from its
    /// extension.
    #[must_use]
    pub fn is_weight(&self) -> bool {
        is_weight_name(&self.name)
    }

    /// Whether this entry names a tokenizer artifact.
    #[must_use]
    pub fn is_tokenizer(&self) -> bool {
        TOKENIZER_ARTIFACTS
            .iter()
            .any(|artifact| self.name == *artifact)
    }
}

/// Ordered set of file entries for the main revision of a repo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoManifest {
    /// The repo this manifest belongs to.
    pub repo_id: RepoId,
    /// Files in the revision, in hub-reported order. Names are unique.
    pub files: Vec<FileEntry>,
    /// Revision commit id, when the hub reported one.
    pub sha: Option<String>,
    /// When this manifest was fetched from the hub.
    pub fetched_at: DateTime<Utc>,
}

impl RepoManifest {
    /// Total size across all entries with a known `expected_size`.
    #[must_use]
    pub fn total_known_bytes(&self) -> u64 {
        self.files.iter().filter_map(|f| f.expected_size).sum()
    }

    /// Files ordered smallest-first for download planning (§4.6): entries
    /// with an unknown size sort last, after all known-size entries.
    #[must_use]
    pub fn download_plan(&self) -> Vec<FileEntry> {
        let mut files = self.files.clone();
        files.sort_by_key(|f| f.expected_size.unwrap_or(u64::MAX));
        files
    }
}

/// Current cache format version, for forward-compatible migrations.
pub const CACHE_VERSION: u32 = 1;

/// Metadata TTL before a record is considered stale (§3: 7 days).
pub const METADATA_TTL_DAYS: i64 = 7;

/// How long a missing-repo record suppresses further hub lookups (§3: 6h).
pub const MISSING_REPO_RETRY_HOURS: i64 = 6;

/// Richer, user-facing record keyed by `repo_id` (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedMetadata {
    /// The manifest this record wraps.
    pub manifest: RepoManifest,
    /// Download count as last observed from the hub.
    pub downloads: u64,
    /// Like count as last observed from the hub.
    pub likes: u64,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Pipeline tag (e.g. `text-generation`), when present.
    pub pipeline_tag: Option<String>,
    /// Repo creation timestamp, when reported.
    pub created_at: Option<DateTime<Utc>>,
    /// Library name (e.g. `transformers`), when reported.
    pub library_name: Option<String>,
    /// When this record was cached.
    pub cached_at: DateTime<Utc>,
    /// Cache format version this record was written with.
    pub cache_version: u32,
}

impl CachedMetadata {
    /// Whether this record is still within the 7-day TTL.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.cached_at) < chrono::Duration::days(METADATA_TTL_DAYS)
    }
}

/// Suppresses further hub lookups for a repo known to 404.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissingRepoRecord {
    /// The repo that returned 404.
    pub repo_id: RepoId,
    /// When it was last observed missing.
    pub last_seen_missing: DateTime<Utc>,
}

impl MissingRepoRecord {
    /// Whether the suppression window (6h) is still in effect.
    #[must_use]
    pub fn is_suppressing(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_seen_missing)
            < chrono::Duration::hours(MISSING_REPO_RETRY_HOURS)
    }
}
