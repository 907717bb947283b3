//! Resolution of the cache base directory (§6 Configuration `cache_base`).

use std::env;
use std::path::PathBuf;

use super::error::PathError;

/// Default cache base, relative to the user's home directory, matching the
/// real hub's on-disk layout: `~/.cache/huggingface/hub`.
pub const DEFAULT_CACHE_DIR_RELATIVE: &str = ".cache/huggingface/hub";

/// Environment variable consulted when no explicit `cache_base` is supplied.
pub const CACHE_DIR_ENV_VAR: &str = "HFCACHE_CACHE_DIR";

/// Where a resolved cache path came from, for provenance reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDirSource {
    /// Caller passed an explicit override.
    Explicit,
    /// Resolved from the `HFCACHE_CACHE_DIR` environment variable.
    EnvVar,
    /// Fell back to the platform default under the user's home directory.
    Default,
}

/// Result of resolving the cache base directory, with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDirResolution {
    /// The resolved, absolute path.
    pub path: PathBuf,
    /// Where it came from.
    pub source: CacheDirSource,
}

/// The platform-default cache base: `{home}/.cache/huggingface/hub`.
pub fn default_cache_dir() -> Result<PathBuf, PathError> {
    let home = dirs::home_dir().ok_or(PathError::NoHomeDir)?;
    Ok(home.join(DEFAULT_CACHE_DIR_RELATIVE))
}

/// Expand a leading `~` and make the path absolute relative to the current
/// working directory if it is not already.
pub fn normalize_user_path(raw: &str) -> Result<PathBuf, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::EmptyPath);
    }

    let expanded = if trimmed == "~" || trimmed.starts_with("~/") {
        let home = dirs::home_dir().ok_or(PathError::NoHomeDir)?;
        if trimmed == "~" {
            home
        } else {
            home.join(trimmed.trim_start_matches("~/"))
        }
    } else {
        PathBuf::from(trimmed)
    };

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(expanded))
            .map_err(|e| PathError::CurrentDirError(e.to_string()))
    }
}

/// Resolve the cache base directory.
///
/// Precedence: explicit override → `HFCACHE_CACHE_DIR` env var → platform
/// default.
pub fn resolve_cache_dir(explicit: Option<&str>) -> Result<CacheDirResolution, PathError> {
    if let Some(raw) = explicit {
        return Ok(CacheDirResolution {
            path: normalize_user_path(raw)?,
            source: CacheDirSource::Explicit,
        });
    }

    if let Ok(raw) = env::var(CACHE_DIR_ENV_VAR) {
        return Ok(CacheDirResolution {
            path: normalize_user_path(&raw)?,
            source: CacheDirSource::EnvVar,
        });
    }

    Ok(CacheDirResolution {
        path: default_cache_dir()?,
        source: CacheDirSource::Default,
    })
}
