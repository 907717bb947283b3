//! JSON-file-backed implementation of the Metadata Cache port (C3, §4.3).
//!
//! `JsonMetadataStore` is the single concrete adapter for
//! `hfcache_core::ports::MetadataCachePort` in this workspace: one file on
//! disk, one in-memory `Mutex` serialising every mutation, pretty-printed
//! sorted-key JSON persisted after each write.

#![deny(unused_crate_dependencies)]

pub mod path;
pub mod store;

pub use path::default_store_path;
pub use store::JsonMetadataStore;

#[cfg(test)]
use tokio_test as _;
