//! Port definitions (trait abstractions) for the two swappable backends the
//! engine depends on, plus the cross-crate trigger port that keeps C7 out of
//! `hfcache-download`.
//!
//! C2 (Network Failure Manager) and C8 (Observable State Hub) are concrete
//! types in [`crate::backoff`]/[`crate::state`] rather than ports: they are
//! pure local algorithms, never adapted to an alternate backend.

pub mod client;
pub mod download_trigger;
pub mod metadata_cache;

pub use client::{DownloadChunk, HubClientPort, RemoteFileInfo, RepoInfo, SearchHit};
pub use download_trigger::DownloadTriggerPort;
pub use metadata_cache::{BoxFetchFuture, MetadataCachePort, MetadataChanged, UpdateResult};
