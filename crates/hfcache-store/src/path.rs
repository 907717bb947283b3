//! Resolution of the metadata store's on-disk file path (§6).

use std::path::PathBuf;

/// Subdirectory of the platform cache directory the store file lives under.
const STORE_SUBDIR: &str = "pocket-cloud-mlx";

/// Name of the store file itself.
const STORE_FILENAME: &str = "hf_metadata_cache.json";

/// The platform-default metadata store path: `{caches}/pocket-cloud-mlx/hf_metadata_cache.json`,
/// where `{caches}` is the OS cache directory (distinct from `cache_base`,
/// which is where model blobs live).
pub fn default_store_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|base| base.join(STORE_SUBDIR).join(STORE_FILENAME))
}
