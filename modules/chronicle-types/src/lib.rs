//! Shared types for the chronicle service and its RPC clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// File name used when a request does not name one
pub const DEFAULT_FILE_NAME: &str = "second_memory.json";

fn default_file_name() -> String {
    DEFAULT_FILE_NAME.to_string()
}

/// A memory document: any JSON object, no fixed schema
pub type MemoryDocument = Map<String, Value>;

// =====================================================
// RPC Request Types
// =====================================================

/// POST /chronicle/sync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<Value>,
    /// Skip merging and write the candidate as a fresh file
    #[serde(default)]
    pub create_new: bool,
    /// Skip merging and upload the candidate as a new file under the same
    /// name; the previous file is left in place and no longer read
    #[serde(default)]
    pub reset_drive_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Any other top-level fields; used by the raw fallback envelope
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncRequest {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    /// Whether this request bypasses the merge path
    pub fn forces_replace(&self) -> bool {
        self.create_new || self.reset_drive_file
    }
}

/// POST /chronicle/load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRequest {
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

// =====================================================
// RPC Response Types
// =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveSyncStatus {
    Created,
    Updated,
    RecreatedDueToPermissionError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveStatus {
    pub status: DriveSyncStatus,
    pub file_id: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GithubSyncStatus {
    GithubSynced,
    GithubError,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubStatus {
    pub status: GithubSyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl GithubStatus {
    pub fn skipped() -> Self {
        Self {
            status: GithubSyncStatus::Skipped,
            response: None,
        }
    }

    pub fn synced(response: Value) -> Self {
        Self {
            status: GithubSyncStatus::GithubSynced,
            response: Some(response),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            status: GithubSyncStatus::GithubError,
            response: Some(Value::String(msg.into())),
        }
    }
}

/// Result of a successful sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub status: String,
    pub timestamp: String,
    pub drive_status: DriveStatus,
    pub github_status: GithubStatus,
    /// The document as persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<MemoryDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResponse {
    pub status: String,
    pub file_name: String,
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub role: String,
    pub time: String,
    pub environment: String,
}

/// Body returned with every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: msg.into(),
        }
    }
}
