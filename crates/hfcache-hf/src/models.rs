//! Wire-format response types for the `HuggingFace` Hub JSON API (§4.4,
//! §6). These are internal to this crate; callers see only the port DTOs
//! defined in `hfcache_core::ports::client`.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// `GET /api/models/{owner}/{name}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoInfoResponse {
    pub id: String,
    pub sha: Option<String>,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub pipeline_tag: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    pub library_name: Option<String>,
    #[serde(default)]
    pub siblings: Vec<SiblingResponse>,
}

/// A `siblings[]` entry. `size`/`sha` are the hub's plain-file fields; large
/// (LFS-tracked) files instead report their real size/hash under `lfs`.
#[derive(Debug, Clone, Deserialize)]
pub struct SiblingResponse {
    pub rfilename: String,
    pub size: Option<u64>,
    pub sha: Option<String>,
    pub lfs: Option<LfsField>,
}

impl SiblingResponse {
    /// LFS metadata takes precedence over the inline fields (§4.4): `lfs.size`
    /// over `size`, `lfs.sha256`/`lfs.pointer_sha256` over inline `sha`.
    pub fn resolved_size(&self) -> Option<u64> {
        self.lfs
            .as_ref()
            .and_then(LfsField::info)
            .and_then(|lfs| lfs.size)
            .or(self.size)
    }

    pub fn resolved_sha256(&self) -> Option<String> {
        self.lfs
            .as_ref()
            .and_then(LfsField::info)
            .and_then(|lfs| lfs.sha256.clone().or_else(|| lfs.pointer_sha256.clone()))
            .or_else(|| self.sha.clone())
    }
}

/// The hub's `lfs` field is an object for LFS-tracked files and otherwise
/// omitted or some other shape entirely; `Other` absorbs whatever that is
/// without failing deserialization of the surrounding sibling.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LfsField {
    Info(LfsInfo),
    Other(serde_json::Value),
}

impl LfsField {
    pub fn info(&self) -> Option<&LfsInfo> {
        match self {
            Self::Info(info) => Some(info),
            Self::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LfsInfo {
    pub size: Option<u64>,
    pub sha256: Option<String>,
    #[serde(rename = "pointerSize")]
    pub pointer_size: Option<u64>,
    #[serde(rename = "pointerSha256")]
    pub pointer_sha256: Option<String>,
}

/// `GET /api/models?search=...` response entry. The search endpoint returns
/// a pared-down projection of [`RepoInfoResponse`].
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHitResponse {
    pub id: String,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub likes: u64,
    pub pipeline_tag: Option<String>,
}

/// `GET /api/whoami-v2` response.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoAmIResponse {
    pub user: WhoAmIUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhoAmIUser {
    pub name: String,
}
