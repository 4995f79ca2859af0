//! Google Drive v3 client used as the primary memory store.
//!
//! Files are addressed by their human-readable name. OAuth access tokens
//! are refreshed lazily from the authorized-user credentials in TOKEN_JSON.

use crate::error::StoreError;
use crate::http::truncate_error;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tokio::sync::RwLock;

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const TOKEN_REFRESH_URL: &str = "https://oauth2.googleapis.com/token";

pub const JSON_MIME: &str = "application/json";

/// A stored file, identified by Drive's opaque id
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFileHandle {
    pub id: String,
    pub name: String,
}

/// Primary store operations used by the sync orchestrator
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Newest non-trashed file with exactly this name
    async fn find(&self, file_name: &str) -> Result<Option<RemoteFileHandle>, StoreError>;

    async fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<RemoteFileHandle, StoreError>;

    /// Overwrite the content of an existing file, keeping its id
    async fn replace(
        &self,
        handle: &RemoteFileHandle,
        bytes: Vec<u8>,
    ) -> Result<RemoteFileHandle, StoreError>;

    /// Full file content, buffered
    async fn download(&self, handle: &RemoteFileHandle) -> Result<Vec<u8>, StoreError>;
}

/// OAuth authorized-user credentials, as written by the Google auth libraries
#[derive(Clone, Deserialize)]
pub struct DriveCredentials {
    /// Last known access token, may be expired
    #[serde(default, alias = "access_token")]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl DriveCredentials {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let creds: DriveCredentials = serde_json::from_str(raw)
            .map_err(|e| format!("Drive credential error: {}", e))?;
        if creds.token.is_none() && !creds.can_refresh() {
            return Err(
                "Drive credential error: need an access token or refresh_token, client_id and client_secret"
                    .to_string(),
            );
        }
        Ok(creds)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }
}

impl fmt::Debug for DriveCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveCredentials")
            .field("has_token", &self.token.is_some())
            .field("can_refresh", &self.can_refresh())
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFileHandle>,
}

/// Google Drive API client
pub struct DriveClient {
    http: Client,
    credentials: DriveCredentials,
    access_token: RwLock<Option<String>>,
}

impl DriveClient {
    pub fn new(http: Client, credentials: DriveCredentials) -> Self {
        let access_token = RwLock::new(credentials.token.clone());
        Self {
            http,
            credentials,
            access_token,
        }
    }

    async fn current_token(&self) -> Result<String, StoreError> {
        if let Some(token) = self.access_token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.refresh_access_token().await
    }

    /// Exchange the refresh token for a new access token
    async fn refresh_access_token(&self) -> Result<String, StoreError> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            self.credentials.refresh_token.as_deref(),
            self.credentials.client_id.as_deref(),
            self.credentials.client_secret.as_deref(),
        ) else {
            return Err(StoreError::with_status(
                "Access token expired and no refresh credentials are configured",
                401,
            ));
        };

        let token_url = self
            .credentials
            .token_uri
            .as_deref()
            .unwrap_or(TOKEN_REFRESH_URL);

        let response = self
            .http
            .post(token_url)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::with_status(
                format!("Token refresh failed: {}", truncate_error(&body)),
                status,
            ));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::new(format!("Failed to parse token response: {}", e)))?;

        log::debug!("[DRIVE] Access token refreshed");
        *self.access_token.write().await = Some(token_response.access_token.clone());
        Ok(token_response.access_token)
    }

    /// Send an authorized request, refreshing the token once on a 401
    async fn send<F>(&self, build: F) -> Result<Response, StoreError>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let token = self.current_token().await?;
        let response = build(&token).send().await?;
        if response.status().as_u16() != 401 || !self.credentials.can_refresh() {
            return Ok(response);
        }

        log::info!("[DRIVE] Access token rejected, refreshing");
        let token = self.refresh_access_token().await?;
        Ok(build(&token).send().await?)
    }
}

/// Turn a non-2xx Drive response into a `StoreError`
async fn check(response: Response, context: &str) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::with_status(
        format!("{}: {}", context, error_message(&body)),
        status.as_u16(),
    )
    .with_reason(error_reason(&body)))
}

/// Pull `error.message` out of a Google API error body, falling back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| truncate_error(body).to_string())
}

/// `error.errors[0].reason` of a Google API error body
fn error_reason(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["errors"][0]["reason"].as_str().map(str::to_string))
}

/// Quote a file name for use inside a Drive `q` string literal
fn escape_query_value(name: &str) -> String {
    name.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Body for a `multipart/related` upload: JSON metadata part, then media part
fn multipart_related_body(boundary: &str, metadata: &Value, mime: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {mime}\r\n\r\n",
            b = boundary,
            meta = metadata,
            mime = mime
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn find(&self, file_name: &str) -> Result<Option<RemoteFileHandle>, StoreError> {
        let query = format!("name='{}' and trashed=false", escape_query_value(file_name));
        let url = format!("{}/files", DRIVE_API_BASE);

        let response = self
            .send(|token| {
                self.http.get(&url).bearer_auth(token).query(&[
                    ("q", query.as_str()),
                    ("spaces", "drive"),
                    ("fields", "files(id,name)"),
                    ("orderBy", "createdTime desc"),
                ])
            })
            .await?;
        let response = check(response, "Drive file lookup failed").await?;

        let list: FileList = response
            .json()
            .await
            .map_err(|e| StoreError::new(format!("Failed to parse file list: {}", e)))?;

        if list.files.len() > 1 {
            log::warn!(
                "[DRIVE] {} live files named '{}', using the newest ({})",
                list.files.len(),
                file_name,
                list.files[0].id
            );
        }
        Ok(list.files.into_iter().next())
    }

    async fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<RemoteFileHandle, StoreError> {
        let boundary = format!("chronicle-{:016x}", rand::random::<u64>());
        let metadata = json!({ "name": file_name, "mimeType": mime });
        let body = multipart_related_body(&boundary, &metadata, mime, &bytes);
        let url = format!("{}/files", DRIVE_UPLOAD_BASE);
        let content_type = format!("multipart/related; boundary={}", boundary);

        let response = self
            .send(|token| {
                self.http
                    .post(&url)
                    .bearer_auth(token)
                    .query(&[("uploadType", "multipart"), ("fields", "id,name")])
                    .header("Content-Type", content_type.as_str())
                    .body(body.clone())
            })
            .await?;
        let response = check(response, "Drive upload failed").await?;

        let handle: RemoteFileHandle = response
            .json()
            .await
            .map_err(|e| StoreError::new(format!("Failed to parse upload response: {}", e)))?;
        log::info!("[DRIVE] Created '{}' ({})", handle.name, handle.id);
        Ok(handle)
    }

    async fn replace(
        &self,
        handle: &RemoteFileHandle,
        bytes: Vec<u8>,
    ) -> Result<RemoteFileHandle, StoreError> {
        let url = format!("{}/files/{}", DRIVE_UPLOAD_BASE, handle.id);

        let response = self
            .send(|token| {
                self.http
                    .patch(&url)
                    .bearer_auth(token)
                    .query(&[("uploadType", "media"), ("fields", "id,name")])
                    .header("Content-Type", JSON_MIME)
                    .body(bytes.clone())
            })
            .await?;
        let response = check(response, "Drive update failed").await?;

        let updated: RemoteFileHandle = response
            .json()
            .await
            .map_err(|e| StoreError::new(format!("Failed to parse update response: {}", e)))?;
        log::info!("[DRIVE] Updated '{}' ({})", updated.name, updated.id);
        Ok(updated)
    }

    async fn download(&self, handle: &RemoteFileHandle) -> Result<Vec<u8>, StoreError> {
        let url = format!("{}/files/{}", DRIVE_API_BASE, handle.id);

        let response = self
            .send(|token| {
                self.http
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("alt", "media")])
            })
            .await?;
        let response = check(response, "Drive download failed").await?;

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
