//! Public configuration for the hub client (§6, §10.3).
//!
//! Mirrors the builder shape used elsewhere in this workspace: `#[must_use]`
//! methods, `const fn` setters for `Copy` values, and a `Default` impl
//! holding the concrete numeric defaults.

use std::time::Duration;

use crate::token::{KeychainAccessor, NoKeychain, TokenSource, resolve_token};

/// Configuration for the hub client.
///
/// # Example
///
/// ```
/// use hfcache_hf::HfClientConfig;
/// use std::time::Duration;
///
/// let config = HfClientConfig::new()
///     .with_timeout(Duration::from_secs(60))
///     .with_user_agent("my-app/1.0");
/// ```
#[derive(Debug, Clone)]
pub struct HfClientConfig {
    /// Base origin for both the `api/` and `resolve/` endpoints.
    pub(crate) base_url: String,
    /// User agent string for HTTP requests.
    pub(crate) user_agent: String,
    /// Per-request timeout (§5: 300s).
    pub(crate) request_timeout: Duration,
    /// Explicit token override, highest precedence in §4.4's resolution chain.
    pub(crate) token: Option<String>,
    /// Maximum number of per-file retry attempts (§4.6 uses this, not C4 itself).
    pub(crate) max_retries: u8,
    /// Base delay between per-file retries (§4.6: 1s, 2s, 4s).
    pub(crate) retry_base_delay: Duration,
}

impl Default for HfClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://huggingface.co".to_string(),
            user_agent: concat!("hfcache-hf/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(300),
            token: None,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

impl HfClientConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base origin. Defaults to `https://huggingface.co`.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the user agent string for HTTP requests.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the per-request timeout. Defaults to 300s (§5).
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set an explicit authentication token, overriding env/keychain/`.env`
    /// resolution (§4.4).
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set an optional explicit authentication token.
    #[must_use]
    pub fn with_optional_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Set the maximum number of retry attempts. Defaults to 3 (§4.6).
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base delay between retries. Defaults to 1s (§4.6).
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Resolve the effective bearer token using the §4.4 precedence chain,
    /// against a caller-supplied keychain accessor (or [`NoKeychain`]).
    #[must_use]
    pub fn resolve_token(&self, keychain: &dyn KeychainAccessor) -> Option<(String, TokenSource)> {
        resolve_token(self.token.as_deref(), keychain)
    }

    /// Resolve the effective token using the default (no-op) keychain.
    #[must_use]
    pub fn resolve_token_default(&self) -> Option<(String, TokenSource)> {
        self.resolve_token(&NoKeychain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = HfClientConfig::new();
        assert_eq!(config.base_url, "https://huggingface.co");
        assert!(config.user_agent.contains("hfcache-hf"));
        assert_eq!(config.request_timeout, Duration::from_secs(300));
        assert!(config.token.is_none());
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn builder_overrides_every_field() {
        let config = HfClientConfig::new()
            .with_base_url("https://custom.api")
            .with_user_agent("test-agent")
            .with_timeout(Duration::from_secs(60))
            .with_token("secret")
            .with_max_retries(5)
            .with_retry_delay(Duration::from_millis(250));

        assert_eq!(config.base_url, "https://custom.api");
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.token, Some("secret".to_string()));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_base_delay, Duration::from_millis(250));
    }

    #[test]
    fn optional_token_accepts_none() {
        let with_token = HfClientConfig::new().with_optional_token(Some("token".to_string()));
        assert_eq!(with_token.token, Some("token".to_string()));

        let without_token = HfClientConfig::new().with_optional_token(None);
        assert!(without_token.token.is_none());
    }
}
