//! URL construction helpers for the hub API (§4.4, §6). Pure functions so
//! every call site builds the same shape of URL and tests don't need a
//! client instance.

use hfcache_core::manifest::RepoId;
use url::Url;

use crate::error::{HfError, HfResult};

/// Percent-encode a single path segment (owner, repo name, or one component
/// of a file path).
fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Percent-encode a file path, preserving its `/` separators.
fn encode_file_path(file_path: &str) -> String {
    file_path.split('/').map(encode_segment).collect::<Vec<_>>().join("/")
}

fn parse(raw: &str) -> HfResult<Url> {
    Url::parse(raw).map_err(HfError::InvalidUrl)
}

/// `GET {base}/api/models?search={query}&limit={limit}`.
pub fn search_url(base_url: &str, query: &str, limit: usize) -> HfResult<Url> {
    let mut url = parse(&format!("{}/api/models", base_url.trim_end_matches('/')))?;
    url.query_pairs_mut()
        .append_pair("search", query)
        .append_pair("limit", &limit.to_string());
    Ok(url)
}

/// `GET {base}/api/models/{owner}/{name}`.
pub fn repo_info_url(base_url: &str, repo_id: &RepoId) -> HfResult<Url> {
    parse(&format!(
        "{}/api/models/{}/{}",
        base_url.trim_end_matches('/'),
        encode_segment(repo_id.owner()),
        encode_segment(repo_id.name()),
    ))
}

/// `{base}/{owner}/{name}/resolve/main/{file_path}`, used both as the `HEAD`
/// size probe and the `GET` byte-stream URL.
pub fn resolve_file_url(base_url: &str, repo_id: &RepoId, file_path: &str) -> HfResult<Url> {
    parse(&format!(
        "{}/{}/{}/resolve/main/{}",
        base_url.trim_end_matches('/'),
        encode_segment(repo_id.owner()),
        encode_segment(repo_id.name()),
        encode_file_path(file_path),
    ))
}

/// `GET {base}/api/whoami-v2`.
pub fn whoami_url(base_url: &str) -> HfResult<Url> {
    parse(&format!("{}/api/whoami-v2", base_url.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoId {
        RepoId::parse("TheBloke/Llama-2-7B-GGUF").unwrap()
    }

    #[test]
    fn search_url_carries_query_and_limit() {
        let url = search_url("https://huggingface.co", "llama", 20).unwrap();
        assert_eq!(url.path(), "/api/models");
        assert!(url.query().unwrap().contains("search=llama"));
        assert!(url.query().unwrap().contains("limit=20"));
    }

    #[test]
    fn repo_info_url_is_owner_slash_name() {
        let url = repo_info_url("https://huggingface.co", &repo()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://huggingface.co/api/models/thebloke/Llama-2-7B-GGUF"
        );
    }

    #[test]
    fn resolve_file_url_preserves_subdirectories() {
        let url = resolve_file_url("https://huggingface.co", &repo(), "Q4_K_M/model.gguf").unwrap();
        assert_eq!(
            url.as_str(),
            "https://huggingface.co/thebloke/Llama-2-7B-GGUF/resolve/main/Q4_K_M/model.gguf"
        );
    }

    #[test]
    fn resolve_file_url_encodes_unsafe_characters() {
        let url = resolve_file_url("https://huggingface.co", &repo(), "weights v2.bin").unwrap();
        assert!(url.as_str().contains("weights%20v2.bin"));
    }

    #[test]
    fn whoami_url_is_stable() {
        let url = whoami_url("https://huggingface.co").unwrap();
        assert_eq!(url.as_str(), "https://huggingface.co/api/whoami-v2");
    }
}
