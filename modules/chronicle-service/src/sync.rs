//! Sync orchestration: authorize, resolve, merge or replace, persist, mirror.
//!
//! A sync runs through the phases of [`SyncPhase`] in order. Any failure
//! before mirroring aborts the request; mirror failures are reported in the
//! result and never abort it.

use crate::auth::AuthGate;
use crate::config::{Config, DriveAuth};
use crate::drive_api::{DriveClient, JSON_MIME, RemoteFileHandle, RemoteStore};
use crate::error::{MirrorError, StoreError, SyncError};
use crate::github_api::{GithubClient, MirrorStore};
use crate::merge::merge;
use chrono::{DateTime, SecondsFormat, Utc};
use chronicle_types::*;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Authorizing,
    Resolving,
    Merging,
    Replacing,
    Persisting,
    Mirroring,
    Done,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Authorizing => "authorizing",
            SyncPhase::Resolving => "resolving",
            SyncPhase::Merging => "merging",
            SyncPhase::Replacing => "replacing",
            SyncPhase::Persisting => "persisting",
            SyncPhase::Mirroring => "mirroring",
            SyncPhase::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// A request field that can carry the memory payload
struct ContentField {
    name: &'static str,
    extract: fn(&SyncRequest) -> Option<&Value>,
}

fn content_field(r: &SyncRequest) -> Option<&Value> {
    r.content.as_ref()
}

fn data_field(r: &SyncRequest) -> Option<&Value> {
    r.data.as_ref()
}

fn emotion_field(r: &SyncRequest) -> Option<&Value> {
    r.emotion.as_ref()
}

fn memory_field(r: &SyncRequest) -> Option<&Value> {
    r.memory.as_ref()
}

fn reflection_field(r: &SyncRequest) -> Option<&Value> {
    r.reflection.as_ref()
}

/// Payload fields in precedence order; the first populated one wins
const CONTENT_FIELDS: &[ContentField] = &[
    ContentField { name: "content", extract: content_field },
    ContentField { name: "data", extract: data_field },
    ContentField { name: "emotion", extract: emotion_field },
    ContentField { name: "memory", extract: memory_field },
    ContentField { name: "reflection", extract: reflection_field },
];

/// Truthiness: `null`, `false`, zero and empty strings, arrays or objects are skipped
fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Build the candidate document for a sync request, stamped with `timestamp`.
///
/// An object under `content` is taken as the whole document. Any other
/// populated field is stored under its own name. With nothing populated the
/// remaining request fields are wrapped under `raw`.
pub fn resolve_candidate(request: &SyncRequest, timestamp: &str) -> MemoryDocument {
    let selected = CONTENT_FIELDS.iter().find_map(|field| {
        (field.extract)(request)
            .filter(|v| is_populated(v))
            .map(|v| (field.name, v))
    });

    let mut candidate = match selected {
        Some(("content", Value::Object(doc))) => doc.clone(),
        Some((name, value)) => {
            let mut doc = Map::new();
            doc.insert(name.to_string(), value.clone());
            doc
        }
        None => {
            let mut doc = Map::new();
            doc.insert("raw".to_string(), Value::Object(request.extra.clone()));
            doc
        }
    };
    candidate.insert("timestamp".to_string(), Value::String(timestamp.to_string()));
    candidate
}

/// Name used when the canonical file can no longer be written by us
pub fn recovery_file_name(file_name: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", now.format("%Y%m%d_%H%M%S"), file_name)
}

fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct SyncService {
    gate: AuthGate,
    store: Result<Arc<dyn RemoteStore>, SyncError>,
    mirror: Option<Arc<dyn MirrorStore>>,
}

impl SyncService {
    pub fn new(
        gate: AuthGate,
        store: Result<Arc<dyn RemoteStore>, SyncError>,
        mirror: Option<Arc<dyn MirrorStore>>,
    ) -> Self {
        Self {
            gate,
            store,
            mirror,
        }
    }

    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let store: Result<Arc<dyn RemoteStore>, SyncError> = match &config.drive {
            DriveAuth::Missing => Err(SyncError::CredentialsUnavailable(
                "Missing token.json in environment".to_string(),
            )),
            DriveAuth::Invalid(e) => Err(SyncError::ServerMisconfigured(e.clone())),
            DriveAuth::Ready(creds) => Ok(Arc::new(DriveClient::new(http.clone(), creds.clone()))),
        };

        let mirror = config
            .mirror
            .clone()
            .map(|m| Arc::new(GithubClient::new(http, m)) as Arc<dyn MirrorStore>);

        Self::new(AuthGate::new(config.api_key.clone()), store, mirror)
    }

    /// Run only the auth gate, for requests rejected before orchestration
    pub fn authorize(&self, credential: Option<&str>) -> Result<(), SyncError> {
        self.gate.authorize(credential)
    }

    fn store(&self) -> Result<&Arc<dyn RemoteStore>, SyncError> {
        self.store.as_ref().map_err(Clone::clone)
    }

    pub async fn sync(
        &self,
        request: &SyncRequest,
        credential: Option<&str>,
    ) -> Result<SyncResult, SyncError> {
        let mut phase = SyncPhase::Authorizing;
        let result = self.run_sync(request, credential, Utc::now(), &mut phase).await;
        match &result {
            Ok(r) => log::info!(
                "[CHRONICLE] Synced '{}': drive={:?} github={:?}",
                request.file_name,
                r.drive_status.status,
                r.github_status.status
            ),
            Err(e) => log::warn!(
                "[CHRONICLE] Sync of '{}' failed while {}: {}",
                request.file_name,
                phase,
                e
            ),
        }
        result
    }

    async fn run_sync(
        &self,
        request: &SyncRequest,
        credential: Option<&str>,
        now: DateTime<Utc>,
        phase: &mut SyncPhase,
    ) -> Result<SyncResult, SyncError> {
        self.gate.authorize(credential)?;
        let store = self.store()?;

        *phase = SyncPhase::Resolving;
        let timestamp = format_timestamp(now);
        let file_name = request.file_name.as_str();
        let candidate = resolve_candidate(request, &timestamp);
        let existing = store.find(file_name).await?;
        let force_replace = request.forces_replace();

        let (target, in_place) = match existing {
            Some(handle) if !force_replace => {
                *phase = SyncPhase::Merging;
                let current = read_document(store.as_ref(), &handle).await?;
                (merge(&current, &candidate), Some(handle))
            }
            _ => {
                *phase = SyncPhase::Replacing;
                (candidate, None)
            }
        };
        log::debug!("[CHRONICLE] '{}' resolved via {}", file_name, phase);

        *phase = SyncPhase::Persisting;
        let bytes = serde_json::to_vec_pretty(&target)
            .map_err(|e| StoreError::new(format!("Failed to serialize document: {}", e)))?;

        let drive_status = match in_place {
            Some(handle) => match store.replace(&handle, bytes.clone()).await {
                Ok(updated) => DriveStatus {
                    status: DriveSyncStatus::Updated,
                    file_id: updated.id,
                    file_name: updated.name,
                },
                Err(e) if e.is_permission_denied() => {
                    let new_name = recovery_file_name(file_name, now);
                    log::warn!(
                        "[CHRONICLE] No write access to '{}' ({}), recreating as '{}'",
                        file_name,
                        e,
                        new_name
                    );
                    let created = store.upload(&new_name, bytes.clone(), JSON_MIME).await?;
                    DriveStatus {
                        status: DriveSyncStatus::RecreatedDueToPermissionError,
                        file_id: created.id,
                        file_name: created.name,
                    }
                }
                Err(e) => return Err(e.into()),
            },
            None => {
                let created = store.upload(file_name, bytes.clone(), JSON_MIME).await?;
                DriveStatus {
                    status: DriveSyncStatus::Created,
                    file_id: created.id,
                    file_name: created.name,
                }
            }
        };

        *phase = SyncPhase::Mirroring;
        let github_status = match &self.mirror {
            Some(mirror) => mirror_document(mirror.as_ref(), file_name, &bytes).await,
            None => GithubStatus::skipped(),
        };

        *phase = SyncPhase::Done;
        Ok(SyncResult {
            status: "success".to_string(),
            timestamp,
            drive_status,
            github_status,
            document: Some(target),
        })
    }

    pub async fn load(
        &self,
        request: &LoadRequest,
        credential: Option<&str>,
    ) -> Result<LoadResponse, SyncError> {
        self.gate.authorize(credential)?;
        let store = self.store()?;

        let handle = store
            .find(&request.file_name)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("{} not found", request.file_name)))?;
        let bytes = store.download(&handle).await?;

        let content = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        log::info!("[CHRONICLE] Loaded '{}' ({})", handle.name, handle.id);
        Ok(LoadResponse {
            status: "success".to_string(),
            file_name: handle.name,
            content,
        })
    }
}

/// Download and parse the current document. Content that is not a JSON
/// object is treated as empty so the incoming update replaces it.
async fn read_document(
    store: &dyn RemoteStore,
    handle: &RemoteFileHandle,
) -> Result<MemoryDocument, SyncError> {
    let bytes = store.download(handle).await?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => {
            log::warn!("[CHRONICLE] '{}' is not a JSON object, replacing it", handle.name);
            Ok(Map::new())
        }
        Err(e) => {
            log::warn!("[CHRONICLE] '{}' is not valid JSON ({}), replacing it", handle.name, e);
            Ok(Map::new())
        }
    }
}

/// Write the document to the mirror. Never fails the sync.
async fn mirror_document(mirror: &dyn MirrorStore, file_name: &str, bytes: &[u8]) -> GithubStatus {
    let path = mirror.path_for(file_name);
    let message = format!("update: {}", file_name);

    match write_with_revision(mirror, &path, bytes, &message).await {
        Ok(response) => GithubStatus::synced(response),
        Err(e) => {
            log::warn!("[CHRONICLE] Mirror write for {} failed: {}", path, e);
            GithubStatus::error(e.to_string())
        }
    }
}

/// Put with the current revision token; on a conflict re-read it and retry once
async fn write_with_revision(
    mirror: &dyn MirrorStore,
    path: &str,
    bytes: &[u8],
    message: &str,
) -> Result<Value, MirrorError> {
    let revision = mirror.get_revision(path).await?;
    match mirror.put(path, bytes, message, revision.as_deref()).await {
        Err(e) if e.is_conflict() => {
            log::warn!("[CHRONICLE] Mirror conflict on {}, retrying with fresh revision", path);
            let revision = mirror.get_revision(path).await?;
            mirror.put(path, bytes, message, revision.as_deref()).await
        }
        other => other,
    }
}
