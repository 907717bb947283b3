//! Path resolution and on-disk layout for the cache.
//!
//! - [`cache`] resolves the cache base directory (`cache_base` config, §6).
//! - [`directory`] owns the two on-disk layouts rooted at that base (§3, §4.5).
//! - [`ensure`] provides directory-creation/writability primitives shared by
//!   both.
//! - [`error`] is the path-resolution error type.

mod cache;
mod directory;
mod ensure;
mod error;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cache::{
    CACHE_DIR_ENV_VAR, CacheDirResolution, CacheDirSource, DEFAULT_CACHE_DIR_RELATIVE,
    default_cache_dir, normalize_user_path, resolve_cache_dir,
};
pub use directory::{DirectoryManager, MAIN_REVISION};
pub use ensure::{DirectoryCreationStrategy, ensure_directory, verify_writable};
pub use error::PathError;
