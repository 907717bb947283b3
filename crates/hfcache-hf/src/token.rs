//! Bearer token resolution (§4.4): in-app settings override → environment →
//! OS keychain → `.env` file (dev/test only).
//!
//! Credential storage itself is out of scope (§1): the engine only reads a
//! token through a provided accessor. [`KeychainAccessor`] is that seam —
//! composition roots that have a real keychain plug one in; [`NoKeychain`]
//! is the default that always misses.

/// Standard environment variable names consulted for a bearer token, tried
/// in this order.
pub const TOKEN_ENV_VARS: &[&str] = &["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN", "HUGGINGFACE_TOKEN"];

/// Where a resolved token came from, for diagnostics/logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Supplied directly via `HfClientConfig::with_token`.
    Explicit,
    /// Found in one of [`TOKEN_ENV_VARS`].
    EnvVar,
    /// Returned by a [`KeychainAccessor`].
    Keychain,
    /// Found in a `.env` file (dev/test only).
    DotEnv,
}

/// Reads a token from an OS keychain or other secure store external to this
/// crate. The engine never implements credential storage itself.
pub trait KeychainAccessor: Send + Sync {
    /// Return a token if the keychain has one configured.
    fn read_token(&self) -> Option<String>;
}

/// A [`KeychainAccessor`] that never has a token, used when no keychain
/// integration is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKeychain;

impl KeychainAccessor for NoKeychain {
    fn read_token(&self) -> Option<String> {
        None
    }
}

/// Resolve a token using the §4.4 precedence chain.
#[must_use]
pub fn resolve_token(
    explicit: Option<&str>,
    keychain: &dyn KeychainAccessor,
) -> Option<(String, TokenSource)> {
    if let Some(token) = explicit {
        if !token.is_empty() {
            return Some((token.to_string(), TokenSource::Explicit));
        }
    }

    for var in TOKEN_ENV_VARS {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return Some((value, TokenSource::EnvVar));
            }
        }
    }

    if let Some(token) = keychain.read_token() {
        return Some((token, TokenSource::Keychain));
    }

    if let Ok(iter) = dotenvy::dotenv_iter() {
        for (key, value) in iter.flatten() {
            if TOKEN_ENV_VARS.contains(&key.as_str()) && !value.is_empty() {
                return Some((value, TokenSource::DotEnv));
            }
        }
    }

    None
}
