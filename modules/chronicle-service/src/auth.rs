//! API key gate for the chronicle endpoints.
//!
//! The key may arrive in the `X-API-Key` header, an `Authorization: Bearer`
//! header, or an `api_key` field in the JSON body. Carriers are checked in
//! that order and the first one present is the only one considered.

use crate::error::SyncError;
use axum::http::HeaderMap;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone)]
pub struct AuthGate {
    expected: Option<String>,
}

impl AuthGate {
    pub fn new(expected: Option<String>) -> Self {
        Self { expected }
    }

    pub fn authorize(&self, credential: Option<&str>) -> Result<(), SyncError> {
        let expected = self
            .expected
            .as_deref()
            .ok_or_else(|| SyncError::ServerMisconfigured("Server missing API key".to_string()))?;

        match credential {
            Some(given) if constant_time_eq(given.as_bytes(), expected.as_bytes()) => Ok(()),
            Some(_) => Err(SyncError::Unauthorized("invalid API key".to_string())),
            None => Err(SyncError::Unauthorized("missing API key".to_string())),
        }
    }
}

/// Pick the credential from the first carrier that is present. Blank header
/// values count as absent.
pub fn extract_credential<'a>(
    headers: &'a HeaderMap,
    body_key: Option<&'a str>,
) -> Option<&'a str> {
    if let Some(value) = headers.get(API_KEY_HEADER) {
        let key = value.to_str().unwrap_or_default().trim();
        if !key.is_empty() {
            return Some(key);
        }
    }
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        let raw = value.to_str().unwrap_or_default().trim();
        if let Some(token) = bearer_token(raw) {
            return Some(token);
        }
    }
    body_key
}

/// Token of a `Bearer` authorization value; the scheme name is case-insensitive
fn bearer_token(raw: &str) -> Option<&str> {
    let (scheme, token) = raw.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
