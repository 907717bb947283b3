//! Repo search (§4.4 `search`).

use hfcache_core::manifest::RepoId;
use hfcache_core::ports::client::SearchHit;

use crate::error::HfResult;
use crate::http::HttpBackend;
use crate::models::SearchHitResponse;
use crate::url::search_url;

use super::HfClient;

impl<B: HttpBackend> HfClient<B> {
    pub(crate) async fn search_impl(&self, query: &str, limit: usize) -> HfResult<Vec<SearchHit>> {
        let url = search_url(&self.base_url, query, limit)?;
        let hits: Vec<SearchHitResponse> = self.backend.get_json(&url).await?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                RepoId::parse(&hit.id).map(|repo_id| SearchHit {
                    repo_id,
                    downloads: hit.downloads,
                    likes: hit.likes,
                    pipeline_tag: hit.pipeline_tag,
                })
            })
            .take(limit)
            .collect())
    }
}
