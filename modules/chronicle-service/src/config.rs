use crate::drive_api::DriveCredentials;
use std::fmt;
use std::time::Duration;

const DEFAULT_PORT: u16 = 9110;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// State of the Drive credentials found at startup
#[derive(Debug, Clone)]
pub enum DriveAuth {
    /// TOKEN_JSON not set
    Missing,
    /// TOKEN_JSON set but unusable
    Invalid(String),
    Ready(DriveCredentials),
}

/// GitHub mirror target. Only built when owner, repo and token are all set.
#[derive(Clone)]
pub struct MirrorConfig {
    pub owner: String,
    pub repo: String,
    pub token: String,
    pub branch: Option<String>,
    pub path_prefix: Option<String>,
}

impl fmt::Debug for MirrorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("path_prefix", &self.path_prefix)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub drive: DriveAuth,
    pub mirror: Option<MirrorConfig>,
    pub http_timeout: Duration,
    pub environment: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = get("CHRONICLE_PORT")
            .or_else(|| get("PORT"))
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let http_timeout = get("CHRONICLE_HTTP_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let drive = match get("TOKEN_JSON") {
            None => DriveAuth::Missing,
            Some(raw) => match DriveCredentials::parse(&raw) {
                Ok(creds) => DriveAuth::Ready(creds),
                Err(e) => DriveAuth::Invalid(e),
            },
        };

        let mirror = match (get("GH_OWNER"), get("GH_REPO"), get("GH_TOKEN")) {
            (Some(owner), Some(repo), Some(token)) => Some(MirrorConfig {
                owner,
                repo,
                token,
                branch: get("GH_BRANCH"),
                path_prefix: get("GH_PATH_PREFIX")
                    .map(|p| p.trim_matches('/').to_string())
                    .filter(|p| !p.is_empty()),
            }),
            _ => None,
        };

        Self {
            host: get("CHRONICLE_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            api_key: get("REFLECTOR_API_KEY"),
            drive,
            mirror,
            http_timeout,
            environment: get("CHRONICLE_ENVIRONMENT").unwrap_or_else(|| "production".to_string()),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.bind_addr(), "127.0.0.1:9110");
        assert!(config.api_key.is_none());
        assert!(matches!(config.drive, DriveAuth::Missing));
        assert!(config.mirror.is_none());
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.environment, "production");
    }

    #[test]
    fn test_port_fallback() {
        assert_eq!(config_from(&[("PORT", "8000")]).port, 8000);
        assert_eq!(
            config_from(&[("PORT", "8000"), ("CHRONICLE_PORT", "9000")]).port,
            9000
        );
        assert_eq!(config_from(&[("PORT", "not-a-port")]).port, 9110);
    }

    #[test]
    fn test_mirror_requires_full_triple() {
        let partial = config_from(&[("GH_OWNER", "me"), ("GH_REPO", "notes")]);
        assert!(partial.mirror.is_none());

        let empty_token = config_from(&[("GH_OWNER", "me"), ("GH_REPO", "notes"), ("GH_TOKEN", "")]);
        assert!(empty_token.mirror.is_none());

        let full = config_from(&[
            ("GH_OWNER", "me"),
            ("GH_REPO", "notes"),
            ("GH_TOKEN", "ghp_x"),
            ("GH_PATH_PREFIX", "/memories/"),
        ]);
        let mirror = full.mirror.unwrap();
        assert_eq!(mirror.owner, "me");
        assert_eq!(mirror.path_prefix.as_deref(), Some("memories"));
        assert!(mirror.branch.is_none());
    }

    #[test]
    fn test_invalid_token_json() {
        let config = config_from(&[("TOKEN_JSON", "{not json")]);
        assert!(matches!(config.drive, DriveAuth::Invalid(_)));
    }

    #[test]
    fn test_ready_token_json() {
        let config = config_from(&[(
            "TOKEN_JSON",
            r#"{"refresh_token":"r","client_id":"c","client_secret":"s"}"#,
        )]);
        assert!(matches!(config.drive, DriveAuth::Ready(_)));
    }
}
