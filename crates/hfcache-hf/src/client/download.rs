//! File size probing, byte-range download, and token validation (§4.4
//! `file_size`, `download_file`, `validate_token`).

use hfcache_core::error::{HubError, HubResult};
use hfcache_core::manifest::RepoId;
use hfcache_core::ports::client::DownloadChunk;

use crate::error::{HfError, HfResult};
use crate::http::HttpBackend;
use crate::models::WhoAmIResponse;
use crate::url::{resolve_file_url, whoami_url};

use super::HfClient;

impl<B: HttpBackend> HfClient<B> {
    pub(crate) async fn file_size_impl(&self, repo_id: &RepoId, file_path: &str) -> HfResult<Option<u64>> {
        let url = resolve_file_url(&self.base_url, repo_id, file_path)?;
        self.backend.head_content_length(&url).await
    }

    pub(crate) async fn download_file_impl(
        &self,
        repo_id: &RepoId,
        file_path: &str,
        offset: u64,
        on_chunk: &mut (dyn FnMut(DownloadChunk) -> HubResult<()> + Send),
    ) -> HubResult<()> {
        let url = resolve_file_url(&self.base_url, repo_id, file_path).map_err(HfError::into_hub_error)?;

        let mut callback_error: Option<HubError> = None;
        let stream_result = self
            .backend
            .get_stream(&url, offset, &mut |chunk_offset, bytes| {
                match on_chunk(DownloadChunk {
                    offset: chunk_offset,
                    data: bytes.to_vec(),
                }) {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        callback_error = Some(err);
                        Err(HfError::Network("chunk callback aborted the stream".to_string()))
                    }
                }
            })
            .await;

        // The caller's own error (e.g. cancellation) takes precedence over the
        // sentinel transport error used to unwind `get_stream`.
        if let Some(err) = callback_error {
            return Err(err);
        }
        stream_result.map_err(HfError::into_hub_error)
    }

    pub(crate) async fn validate_token_impl(&self) -> HfResult<bool> {
        let url = whoami_url(&self.base_url)?;
        match self.backend.get_json::<WhoAmIResponse>(&url).await {
            Ok(_) => Ok(true),
            Err(HfError::Status { status: 401, .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
