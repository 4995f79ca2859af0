//! Axum route handlers for the chronicle RPC API.

use crate::auth;
use crate::error::SyncError;
use crate::sync::SyncService;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chronicle_types::*;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub struct AppState {
    pub service: SyncService,
    pub environment: String,
}

fn error_response(e: SyncError) -> Response {
    let status = e.status_code();
    if status.is_server_error() {
        log::error!("[CHRONICLE] {}", e);
    }
    (status, Json(ErrorResponse::new(e.to_string()))).into_response()
}

/// Parse a JSON body; an empty body reads as `{}`
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, SyncError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(raw).map_err(|e| SyncError::MalformedInput(e.to_string()))
}

/// A body we cannot parse only gets a 400 if the header credential is good
fn reject_malformed(state: &AppState, headers: &HeaderMap, e: SyncError) -> Response {
    match state.service.authorize(auth::extract_credential(headers, None)) {
        Ok(()) => error_response(e),
        Err(auth_err) => error_response(auth_err),
    }
}

// GET /
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthStatus>) {
    (
        StatusCode::OK,
        Json(HealthStatus {
            status: "ok".to_string(),
            role: "Reflector Bridge".to_string(),
            time: chrono::Utc::now().to_rfc3339(),
            environment: state.environment.clone(),
        }),
    )
}

// POST /chronicle/sync
pub async fn sync(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: SyncRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(e) => return reject_malformed(&state, &headers, e),
    };

    let credential = auth::extract_credential(&headers, request.api_key.as_deref());
    match state.service.sync(&request, credential).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => error_response(e),
    }
}

// POST /chronicle/load
pub async fn load(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: LoadRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(e) => return reject_malformed(&state, &headers, e),
    };

    let credential = auth::extract_credential(&headers, request.api_key.as_deref());
    match state.service.load(&request, credential).await {
        Ok(loaded) => (StatusCode::OK, Json(loaded)).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthGate;
    use axum::http::HeaderValue;
    use serde_json::Value;

    fn state_without_drive() -> Arc<AppState> {
        Arc::new(AppState {
            service: SyncService::new(
                AuthGate::new(Some("right".to_string())),
                Err(SyncError::CredentialsUnavailable(
                    "Missing token.json in environment".to_string(),
                )),
                None,
            ),
            environment: "test".to_string(),
        })
    }

    fn headers_with_key(key: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(auth::API_KEY_HEADER, HeaderValue::from_static(key));
        headers
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, Json(health)) = health(State(state_without_drive())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "ok");
        assert_eq!(health.role, "Reflector Bridge");
        assert_eq!(health.environment, "test");
    }

    #[tokio::test]
    async fn test_sync_wrong_key_is_forbidden() {
        let response = sync(
            State(state_without_drive()),
            headers_with_key("wrong"),
            Bytes::from_static(br#"{"memory":"hello"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["success"], Value::Bool(false));
        assert!(body["error"].as_str().unwrap().contains("Unauthorized"));
    }

    #[tokio::test]
    async fn test_sync_body_key_is_accepted_carrier() {
        let response = sync(
            State(state_without_drive()),
            HeaderMap::new(),
            Bytes::from_static(br#"{"memory":"hello","api_key":"right"}"#),
        )
        .await;
        // past the gate, stopped by missing Drive credentials
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let response = sync(
            State(state_without_drive()),
            headers_with_key("right"),
            Bytes::from_static(b"{not json"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = sync(
            State(state_without_drive()),
            HeaderMap::new(),
            Bytes::from_static(b"{not json"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_load_empty_body_uses_default_file() {
        let response = load(
            State(state_without_drive()),
            headers_with_key("right"),
            Bytes::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Missing token.json in environment");
    }

    #[tokio::test]
    async fn test_missing_server_key() {
        let state = Arc::new(AppState {
            service: SyncService::new(AuthGate::new(None), Err(SyncError::NotFound("x".into())), None),
            environment: "test".to_string(),
        });
        let response = load(State(state), headers_with_key("anything"), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
