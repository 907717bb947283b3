//! HTTP backend abstraction (§10.4). [`HfClient`](crate::client::HfClient) is
//! generic over [`HttpBackend`] so its request-shaping logic can be
//! exercised fully offline against [`testing::FakeBackend`] in tests, while
//! [`ReqwestBackend`] is the one real implementation used in production.
//!
//! This layer is intentionally dumb: it does not retry, does not apply
//! backoff, and does not know about repo ids. All of that policy lives in
//! C2/C6 (§4.2, §4.6); this module only turns a URL into bytes or JSON.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::config::HfClientConfig;
use crate::error::{HfError, HfResult};

/// Minimal HTTP surface `HfClient` needs: JSON `GET`, size-probing `HEAD`,
/// and a byte-range streaming `GET`.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// `GET` a URL and deserialize the JSON body.
    async fn get_json<T: DeserializeOwned + Send>(&self, url: &Url) -> HfResult<T>;

    /// `HEAD` a URL and return its `Content-Length`, when present.
    async fn head_content_length(&self, url: &Url) -> HfResult<Option<u64>>;

    /// `GET` a URL starting at `offset` (via `Range: bytes={offset}-` when
    /// nonzero), invoking `on_chunk(absolute_offset, bytes)` per chunk as it
    /// arrives. `on_chunk` returning an error aborts the stream immediately
    /// and that error is returned — callers use this to implement
    /// cancellation at a buffer boundary (§5).
    async fn get_stream(
        &self,
        url: &Url,
        offset: u64,
        on_chunk: &mut (dyn FnMut(u64, &[u8]) -> HfResult<()> + Send),
    ) -> HfResult<()>;
}

/// Production backend over a shared `reqwest::Client`. Holds the resolved
/// bearer token (if any); callers decide how that token was resolved (§4.4).
pub struct ReqwestBackend {
    client: reqwest::Client,
    auth_token: Option<String>,
}

impl ReqwestBackend {
    pub fn new(config: &HfClientConfig, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            auth_token: token,
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Turn a non-success response into the exact §4.4 status classification.
    async fn classify_error(response: reqwest::Response) -> HfError {
        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        HfError::Status {
            status,
            message,
            retry_after_secs,
        }
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn get_json<T: DeserializeOwned + Send>(&self, url: &Url) -> HfResult<T> {
        let response = self.authorize(self.client.get(url.as_str())).send().await?;
        if !response.status().is_success() {
            return Err(Self::classify_error(response).await);
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(Into::into)
    }

    async fn head_content_length(&self, url: &Url) -> HfResult<Option<u64>> {
        let response = self.authorize(self.client.head(url.as_str())).send().await?;
        if !response.status().is_success() {
            return Err(Self::classify_error(response).await);
        }
        Ok(response.content_length())
    }

    async fn get_stream(
        &self,
        url: &Url,
        offset: u64,
        on_chunk: &mut (dyn FnMut(u64, &[u8]) -> HfResult<()> + Send),
    ) -> HfResult<()> {
        use futures_util::StreamExt;

        let mut request = self.authorize(self.client.get(url.as_str()));
        if offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::classify_error(response).await);
        }

        let mut position = offset;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            on_chunk(position, &chunk)?;
            position += chunk.len() as u64;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{CannedResponse, FakeBackend, FakeFailure};
    use super::*;

    #[tokio::test]
    async fn fake_backend_returns_canned_json() {
        let backend = FakeBackend::new()
            .with_response("models/org/repo", CannedResponse::Json(serde_json::json!({"ok": true})));
        let url = Url::parse("https://huggingface.co/api/models/org/repo").unwrap();
        let value: serde_json::Value = backend.get_json(&url).await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn fake_backend_missing_response_is_404() {
        let backend = FakeBackend::new();
        let url = Url::parse("https://huggingface.co/api/models/missing").unwrap();
        let result: HfResult<serde_json::Value> = backend.get_json(&url).await;
        assert!(matches!(result, Err(HfError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn fake_backend_streams_bytes_from_offset() {
        let backend = FakeBackend::new()
            .with_response("resolve/main/model.bin", CannedResponse::Bytes(vec![1, 2, 3, 4, 5]));
        let url = Url::parse("https://huggingface.co/org/repo/resolve/main/model.bin").unwrap();

        let mut received = Vec::new();
        backend
            .get_stream(&url, 2, &mut |offset, bytes| {
                received.push((offset, bytes.to_vec()));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(received, vec![(2, vec![3, 4, 5])]);
    }

    #[tokio::test]
    async fn fake_backend_injected_failure_is_consumed_once() {
        let backend = FakeBackend::new()
            .with_injected_failure(
                "resolve/main/model.bin",
                FakeFailure::Network("connection reset".into()),
            )
            .with_response("resolve/main/model.bin", CannedResponse::Bytes(vec![9, 9]));
        let url = Url::parse("https://huggingface.co/org/repo/resolve/main/model.bin").unwrap();

        let first = backend.get_stream(&url, 0, &mut |_, _| Ok(())).await;
        assert!(matches!(first, Err(HfError::Network(_))));

        let mut received = Vec::new();
        backend
            .get_stream(&url, 0, &mut |offset, bytes| {
                received.push((offset, bytes.to_vec()));
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(received, vec![(0, vec![9, 9])]);
    }
}
