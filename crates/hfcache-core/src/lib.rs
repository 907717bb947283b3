//! Domain types, ports, and local-only components of the model acquisition
//! engine: the identifiers and manifest model (§3), the integrity verifier
//! (C1), the network failure manager (C2), directory layout (C5), the
//! observable state hub (C8), the port traits C3/C4/C7's trigger depend on,
//! and the verification service (C7) built on top of them.
//!
//! Deliberately has no dependency on `hfcache-store`, `hfcache-hf`, or
//! `hfcache-download`: those crates depend on this one, not the reverse.

#![deny(unused_crate_dependencies)]

pub mod backoff;
pub mod error;
pub mod integrity;
pub mod manifest;
pub mod paths;
pub mod ports;
pub mod services;
pub mod state;

pub use backoff::{BackoffConfig, NetworkFailureManager};
pub use error::{HubError, HubResult, IoFailure};
pub use integrity::{
    hash_file, hash_file_async, hash_prefix, hash_prefix_async, verify_file, verify_file_async,
    StreamingHasher, Verdict,
};
pub use manifest::{
    CachedMetadata, FileEntry, MissingRepoRecord, RepoId, RepoManifest, CACHE_VERSION,
    METADATA_TTL_DAYS, MISSING_REPO_RETRY_HOURS, TOKENIZER_ARTIFACTS,
};
pub use paths::{
    default_cache_dir, ensure_directory, normalize_user_path, resolve_cache_dir,
    verify_writable, CacheDirResolution, CacheDirSource, DirectoryCreationStrategy,
    DirectoryManager, PathError, CACHE_DIR_ENV_VAR, DEFAULT_CACHE_DIR_RELATIVE, MAIN_REVISION,
};
pub use ports::{
    BoxFetchFuture, DownloadChunk, DownloadTriggerPort, HubClientPort, MetadataCachePort,
    MetadataChanged, RemoteFileInfo, RepoInfo, SearchHit, UpdateResult,
};
pub use services::{VerificationOutcome, VerificationService};
pub use state::{
    ActiveFileStatus, DownloadErrorRecord, RepoState, StateHub, VerifyCounters,
};

#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tokio_test as _;
