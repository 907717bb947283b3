//! Repo info and file listing (§4.4 `get_repo_info`, `list_files_detailed`).

use hfcache_core::manifest::RepoId;
use hfcache_core::ports::client::{RemoteFileInfo, RepoInfo};

use crate::error::HfResult;
use crate::http::HttpBackend;
use crate::models::RepoInfoResponse;
use crate::url::repo_info_url;

use super::HfClient;

impl<B: HttpBackend> HfClient<B> {
    pub(crate) async fn get_repo_info_impl(&self, repo_id: &RepoId) -> HfResult<RepoInfo> {
        let url = repo_info_url(&self.base_url, repo_id)?;
        let response: RepoInfoResponse = self.backend.get_json(&url).await?;
        Ok(RepoInfo {
            repo_id: repo_id.clone(),
            sha: response.sha,
            downloads: response.downloads,
            likes: response.likes,
            tags: response.tags,
            pipeline_tag: response.pipeline_tag,
            created_at: response.created_at,
            library_name: response.library_name,
        })
    }

    pub(crate) async fn list_files_detailed_impl(
        &self,
        repo_id: &RepoId,
    ) -> HfResult<Vec<RemoteFileInfo>> {
        let url = repo_info_url(&self.base_url, repo_id)?;
        let response: RepoInfoResponse = self.backend.get_json(&url).await?;
        Ok(response
            .siblings
            .into_iter()
            .map(|sibling| RemoteFileInfo {
                size: sibling.resolved_size(),
                sha256: sibling.resolved_sha256(),
                rfilename: sibling.rfilename,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_client;
    use crate::http::testing::{CannedResponse, FakeBackend};
    use hfcache_core::manifest::RepoId;

    #[tokio::test]
    async fn get_repo_info_maps_every_field() {
        let backend = FakeBackend::new().with_response(
            "api/models/thebloke/llama",
            CannedResponse::Json(serde_json::json!({
                "id": "TheBloke/llama",
                "sha": "deadbeef",
                "downloads": 7,
                "likes": 3,
                "tags": ["gguf"],
                "pipeline_tag": "text-generation",
                "library_name": "transformers",
                "siblings": []
            })),
        );
        let client = test_client(backend);
        let repo_id = RepoId::parse("TheBloke/llama").unwrap();

        let info = client.get_repo_info_impl(&repo_id).await.unwrap();
        assert_eq!(info.sha.as_deref(), Some("deadbeef"));
        assert_eq!(info.tags, vec!["gguf".to_string()]);
        assert_eq!(info.library_name.as_deref(), Some("transformers"));
    }

    #[tokio::test]
    async fn list_files_detailed_prefers_lfs_metadata() {
        let backend = FakeBackend::new().with_response(
            "api/models/thebloke/llama",
            CannedResponse::Json(serde_json::json!({
                "id": "TheBloke/llama",
                "siblings": [
                    {"rfilename": "config.json", "size": 512, "sha": "abc"},
                    {
                        "rfilename": "model.safetensors",
                        "size": 100,
                        "sha": "inline",
                        "lfs": {"size": 9_000_000_000_u64, "sha256": "real-sha"}
                    }
                ]
            })),
        );
        let client = test_client(backend);
        let repo_id = RepoId::parse("TheBloke/llama").unwrap();

        let files = client.list_files_detailed_impl(&repo_id).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].size, Some(512));
        assert_eq!(files[1].size, Some(9_000_000_000));
        assert_eq!(files[1].sha256.as_deref(), Some("real-sha"));
    }
}
