//! Error types for the chronicle service.

use axum::http::StatusCode;
use std::fmt;

/// Failure talking to the primary remote store (Google Drive)
#[derive(Debug, Clone)]
pub struct StoreError {
    pub message: String,
    /// HTTP status code if the store answered
    pub status_code: Option<u16>,
    /// Google's `error.errors[0].reason`, e.g. `insufficientFilePermissions`
    pub reason: Option<String>,
}

/// 403 reasons that mean "not allowed to touch this file". Quota and rate
/// limit 403s are not in this list.
const PERMISSION_REASONS: &[&str] = &[
    "insufficientFilePermissions",
    "appNotAuthorizedToFile",
    "forbidden",
];

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        StoreError {
            message: message.into(),
            status_code: None,
            reason: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        StoreError {
            message: message.into(),
            status_code: Some(status_code),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    /// The file exists but this credential may not write it (e.g. it was
    /// created under a different owner or app)
    pub fn is_permission_denied(&self) -> bool {
        self.status_code == Some(403)
            && self
                .reason
                .as_deref()
                .is_some_and(|r| PERMISSION_REASONS.contains(&r))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.status_code {
            write!(f, "[HTTP {}] {}", code, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for StoreError {}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StoreError::new("Drive request timed out")
        } else {
            StoreError::new(format!("Drive request failed: {}", e))
        }
    }
}

/// Failure talking to the GitHub mirror. Never aborts a sync.
#[derive(Debug, Clone)]
pub struct MirrorError {
    pub message: String,
    pub status_code: Option<u16>,
}

impl MirrorError {
    pub fn new(message: impl Into<String>) -> Self {
        MirrorError {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        MirrorError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// The revision token sent with a write no longer matches the remote
    pub fn is_conflict(&self) -> bool {
        match self.status_code {
            Some(409) => true,
            Some(422) => self.message.contains("sha"),
            _ => false,
        }
    }
}

impl fmt::Display for MirrorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.status_code {
            write!(f, "[HTTP {}] {}", code, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for MirrorError {}

impl From<reqwest::Error> for MirrorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MirrorError::new("GitHub request timed out")
        } else {
            MirrorError::new(format!("GitHub request failed: {}", e))
        }
    }
}

/// Request-level failure, mapped onto an HTTP status by the route handlers
#[derive(Debug, Clone)]
pub enum SyncError {
    /// Missing or wrong API key
    Unauthorized(String),
    /// No API key configured, or Drive credentials present but unusable
    ServerMisconfigured(String),
    /// No Drive credentials configured at all
    CredentialsUnavailable(String),
    NotFound(String),
    MalformedInput(String),
    RemoteStore(StoreError),
}

impl SyncError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SyncError::Unauthorized(_) => StatusCode::FORBIDDEN,
            SyncError::ServerMisconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SyncError::CredentialsUnavailable(_) => StatusCode::UNAUTHORIZED,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            SyncError::RemoteStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            SyncError::ServerMisconfigured(msg) => write!(f, "Server misconfigured: {}", msg),
            SyncError::CredentialsUnavailable(msg) => write!(f, "{}", msg),
            SyncError::NotFound(msg) => write!(f, "Not found: {}", msg),
            SyncError::MalformedInput(msg) => write!(f, "Malformed input: {}", msg),
            SyncError::RemoteStore(e) => write!(f, "Remote store error: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::RemoteStore(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            SyncError::Unauthorized("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            SyncError::CredentialsUnavailable("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            SyncError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SyncError::MalformedInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SyncError::RemoteStore(StoreError::new("x")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_error_classification() {
        let denied = |reason: &str, status: u16| {
            StoreError::with_status("Drive update failed", status)
                .with_reason(Some(reason.to_string()))
                .is_permission_denied()
        };
        assert!(denied("insufficientFilePermissions", 403));
        assert!(denied("appNotAuthorizedToFile", 403));
        assert!(denied("forbidden", 403));
        assert!(!denied("userRateLimitExceeded", 403));
        assert!(!denied("rateLimitExceeded", 403));
        assert!(!denied("dailyLimitExceeded", 403));
        assert!(!denied("storageQuotaExceeded", 403));
        assert!(!denied("insufficientFilePermissions", 404));
        assert!(!StoreError::with_status("User rate limit exceeded.", 403).is_permission_denied());
        assert!(!StoreError::new("io").is_permission_denied());
    }

    #[test]
    fn test_mirror_conflict_detection() {
        assert!(MirrorError::with_status("conflict", 409).is_conflict());
        assert!(MirrorError::with_status("\"sha\" wasn't supplied", 422).is_conflict());
        assert!(!MirrorError::with_status("Validation Failed", 422).is_conflict());
        assert!(!MirrorError::with_status("boom", 500).is_conflict());
    }

    #[test]
    fn test_display_includes_status() {
        let e = StoreError::with_status("insufficientFilePermissions", 403);
        assert_eq!(e.to_string(), "[HTTP 403] insufficientFilePermissions");
    }
}
