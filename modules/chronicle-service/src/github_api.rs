//! GitHub contents API client used to mirror memory documents.
//!
//! Writes are optimistic: the blob `sha` read before a write is sent back
//! with it, and GitHub rejects the write if the file moved in between.

use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::http::truncate_error;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};

const GITHUB_API_BASE: &str = "https://api.github.com";

/// Secondary store operations used by the sync orchestrator
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Repository path a memory file is mirrored to
    fn path_for(&self, file_name: &str) -> String {
        file_name.to_string()
    }

    /// Current revision token, `None` if the path does not exist yet
    async fn get_revision(&self, path: &str) -> Result<Option<String>, MirrorError>;

    /// Write `content`. With a revision the write only succeeds if it still
    /// matches the remote; without one it is a create.
    async fn put(
        &self,
        path: &str,
        content: &[u8],
        commit_message: &str,
        revision: Option<&str>,
    ) -> Result<Value, MirrorError>;

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, MirrorError>;
}

pub struct GithubClient {
    http: Client,
    config: MirrorConfig,
}

impl GithubClient {
    pub fn new(http: Client, config: MirrorConfig) -> Self {
        Self { http, config }
    }

    fn contents_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!(
            "{}/repos/{}/{}/contents/{}",
            GITHUB_API_BASE,
            self.config.owner,
            self.config.repo,
            encoded.join("/")
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("token {}", self.config.token))
            .header("Accept", "application/vnd.github+json")
    }

    async fn fetch_contents(&self, path: &str) -> Result<Option<Value>, MirrorError> {
        let mut request = self.authorized(self.http.get(self.contents_url(path)));
        if let Some(branch) = &self.config.branch {
            request = request.query(&[("ref", branch.as_str())]);
        }

        let response = request.send().await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let response = check(response).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| MirrorError::new(format!("Invalid JSON from GitHub: {}", e)))?;
        Ok(Some(body))
    }
}

async fn check(response: Response) -> Result<Response, MirrorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| truncate_error(&body).to_string());
    Err(MirrorError::with_status(
        format!("GitHub API error: {}", message),
        status.as_u16(),
    ))
}

/// GitHub wraps base64 content at 60 columns
fn decode_content(encoded: &str) -> Result<Vec<u8>, MirrorError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact)
        .map_err(|e| MirrorError::new(format!("Invalid base64 content: {}", e)))
}

#[async_trait]
impl MirrorStore for GithubClient {
    fn path_for(&self, file_name: &str) -> String {
        match &self.config.path_prefix {
            Some(prefix) => format!("{}/{}", prefix, file_name.trim_start_matches('/')),
            None => file_name.trim_start_matches('/').to_string(),
        }
    }

    async fn get_revision(&self, path: &str) -> Result<Option<String>, MirrorError> {
        Ok(self
            .fetch_contents(path)
            .await?
            .and_then(|body| body["sha"].as_str().map(str::to_string)))
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        commit_message: &str,
        revision: Option<&str>,
    ) -> Result<Value, MirrorError> {
        let mut payload = json!({
            "message": commit_message,
            "content": BASE64.encode(content),
        });
        if let Some(sha) = revision {
            payload["sha"] = json!(sha);
        }
        if let Some(branch) = &self.config.branch {
            payload["branch"] = json!(branch);
        }

        let response = self
            .authorized(self.http.put(self.contents_url(path)))
            .json(&payload)
            .send()
            .await?;
        let response = check(response).await?;

        let body: Value = response.json().await.unwrap_or(Value::Null);
        log::info!(
            "[GITHUB] Mirrored {} to {}/{}",
            path,
            self.config.owner,
            self.config.repo
        );
        Ok(json!({
            "path": body["content"]["path"],
            "sha": body["content"]["sha"],
            "commit": body["commit"]["sha"],
        }))
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, MirrorError> {
        match self.fetch_contents(path).await? {
            None => Ok(None),
            Some(body) => {
                let encoded = body["content"]
                    .as_str()
                    .ok_or_else(|| MirrorError::new(format!("{} is not a file", path)))?;
                decode_content(encoded).map(Some)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client(path_prefix: Option<&str>) -> GithubClient {
        let http = crate::http::build_client(Duration::from_secs(5)).unwrap();
        GithubClient::new(
            http,
            MirrorConfig {
                owner: "me".to_string(),
                repo: "notes".to_string(),
                token: "ghp_x".to_string(),
                branch: None,
                path_prefix: path_prefix.map(str::to_string),
            },
        )
    }

    #[test]
    fn test_contents_url_encodes_segments() {
        let gh = client(None);
        assert_eq!(
            gh.contents_url("memories/my file.json"),
            "https://api.github.com/repos/me/notes/contents/memories/my%20file.json"
        );
    }

    #[test]
    fn test_path_for_prefix() {
        assert_eq!(client(None).path_for("m.json"), "m.json");
        assert_eq!(client(Some("memories")).path_for("m.json"), "memories/m.json");
    }

    #[test]
    fn test_decode_wrapped_content() {
        let encoded = BASE64.encode(br#"{"memory":"hello","emotion":"calm","reflection":"a long enough line to wrap"}"#);
        let wrapped: String = encoded
            .as_bytes()
            .chunks(60)
            .map(|c| format!("{}\n", std::str::from_utf8(c).unwrap()))
            .collect();
        let decoded = decode_content(&wrapped).unwrap();
        assert!(String::from_utf8(decoded).unwrap().contains("\"emotion\":\"calm\""));
        assert!(decode_content("***").is_err());
    }
}
