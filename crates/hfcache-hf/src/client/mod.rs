//! The hub client (C4): implements [`HubClientPort`] against a generic
//! [`HttpBackend`], split by concern across this module's siblings (search,
//! repo listing, download).

mod download;
mod repo_files;
mod search;

use async_trait::async_trait;
use hfcache_core::error::HubResult;
use hfcache_core::manifest::RepoId;
use hfcache_core::ports::client::{DownloadChunk, HubClientPort, RemoteFileInfo, RepoInfo, SearchHit};

use crate::config::HfClientConfig;
use crate::http::{HttpBackend, ReqwestBackend};
use crate::token::{KeychainAccessor, NoKeychain};

/// Production client: [`HfClient`] wired to [`ReqwestBackend`]. The generic
/// backend parameter only exists to make this type testable against
/// [`crate::http::testing::FakeBackend`]; callers should name this alias.
pub type DefaultHfClient = HfClient<ReqwestBackend>;

/// Stateless hub client, generic over the HTTP transport (§4.4, §10.4).
pub struct HfClient<B: HttpBackend> {
    pub(crate) backend: B,
    pub(crate) base_url: String,
}

impl DefaultHfClient {
    /// Build a client resolving its token with no keychain integration.
    pub fn new(config: &HfClientConfig) -> Self {
        Self::with_keychain(config, &NoKeychain)
    }

    /// Build a client resolving its token through a caller-supplied keychain.
    pub fn with_keychain(config: &HfClientConfig, keychain: &dyn KeychainAccessor) -> Self {
        let token = config.resolve_token(keychain).map(|(token, _source)| token);
        let backend = ReqwestBackend::new(config, token);
        Self {
            backend,
            base_url: config.base_url.clone(),
        }
    }
}

impl<B: HttpBackend> HfClient<B> {
    #[cfg(test)]
    pub(crate) fn with_backend(base_url: impl Into<String>, backend: B) -> Self {
        Self {
            backend,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl<B: HttpBackend> HubClientPort for HfClient<B> {
    async fn search(&self, query: &str, limit: usize) -> HubResult<Vec<SearchHit>> {
        self.search_impl(query, limit).await.map_err(HfErrorExt::into_hub)
    }

    async fn get_repo_info(&self, repo_id: &RepoId) -> HubResult<RepoInfo> {
        self.get_repo_info_impl(repo_id).await.map_err(HfErrorExt::into_hub)
    }

    async fn list_files_detailed(&self, repo_id: &RepoId) -> HubResult<Vec<RemoteFileInfo>> {
        self.list_files_detailed_impl(repo_id).await.map_err(HfErrorExt::into_hub)
    }

    async fn file_size(&self, repo_id: &RepoId, file_path: &str) -> HubResult<Option<u64>> {
        self.file_size_impl(repo_id, file_path).await.map_err(HfErrorExt::into_hub)
    }

    async fn download_file(
        &self,
        repo_id: &RepoId,
        file_path: &str,
        offset: u64,
        on_chunk: &mut (dyn FnMut(DownloadChunk) -> HubResult<()> + Send),
    ) -> HubResult<()> {
        // Returns HubResult directly (rather than routing through
        // `HfErrorExt::into_hub`) so a caller's own error from `on_chunk`
        // (e.g. cancellation) survives unreclassified.
        self.download_file_impl(repo_id, file_path, offset, on_chunk).await
    }

    async fn validate_token(&self) -> HubResult<bool> {
        self.validate_token_impl().await.map_err(HfErrorExt::into_hub)
    }
}

/// Local alias so trait-impl methods above read `.map_err(HfErrorExt::into_hub)`
/// instead of repeating the fully qualified conversion at every call site.
trait HfErrorExt {
    fn into_hub(self) -> hfcache_core::error::HubError;
}

impl HfErrorExt for crate::error::HfError {
    fn into_hub(self) -> hfcache_core::error::HubError {
        self.into_hub_error()
    }
}
