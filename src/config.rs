//! Configuration management for the PlacePrep client
//!
//! Settings live in `config.json` under the platform config directory. The
//! backend URL can be overridden with `PLACEPREP_BACKEND_URL`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::auth::RefreshFailurePolicy;

/// Environment variable overriding the backend URL
pub const BACKEND_URL_ENV: &str = "PLACEPREP_BACKEND_URL";

const DEV_BACKEND_URL: &str = "http://localhost:8000";
const PROD_BACKEND_URL: &str = "https://placeprep-backend.onrender.com";

/// Errors while loading, saving or interpreting configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine config path")]
    NoConfigDir,

    #[error("Failed to access config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid backend URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Where the credential pair is persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// OS credential manager, entries grouped under `namespace`
    Keyring { namespace: String },
    /// JSON file at `path`
    File { path: PathBuf },
    /// Not persisted
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Keyring {
            namespace: "PlacePrep".to_string(),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend origin, without the API prefix
    pub backend_url: String,
    /// Path prefix of every API route
    pub api_prefix: String,
    /// Where the host application sends users to sign in again
    pub login_path: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    pub storage: StorageConfig,
    pub refresh_failure_policy: RefreshFailurePolicy,
}

fn default_backend_url() -> String {
    if cfg!(debug_assertions) {
        DEV_BACKEND_URL.to_string()
    } else {
        PROD_BACKEND_URL.to_string()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            api_prefix: "/api".to_string(),
            login_path: "/login".to_string(),
            request_timeout_secs: 30,
            storage: StorageConfig::default(),
            refresh_failure_policy: RefreshFailurePolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Gets the config directory path (cross-platform)
    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|p| PathBuf::from(p).join("PlacePrep"))
        }

        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|p| PathBuf::from(p).join("Library/Application Support/PlacePrep"))
        }

        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| std::env::var("HOME").ok().map(|p| PathBuf::from(p).join(".config")))
                .map(|p| p.join("placeprep"))
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }

    /// Gets the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.json"))
    }

    /// Loads configuration from the default location
    ///
    /// A missing or unreadable file yields the defaults; the environment
    /// override is applied either way.
    pub fn load() -> Self {
        let from_disk = Self::config_path().and_then(|path| match Self::load_from(&path) {
            Ok(config) => Some(config),
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = ?path, "Ignoring config file: {}", e);
                None
            }
        });

        from_disk.unwrap_or_default().apply_env()
    }

    /// Loads configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Saves configuration to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Saves configuration to a specific file, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Applies `PLACEPREP_BACKEND_URL` if set
    pub fn apply_env(self) -> Self {
        match std::env::var(BACKEND_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => self.with_backend_url(url.trim()),
            _ => self,
        }
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_refresh_failure_policy(mut self, policy: RefreshFailurePolicy) -> Self {
        self.refresh_failure_policy = policy;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `<backend_url><api_prefix>/`, the base every request path joins onto
    pub fn api_base(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: self.backend_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.backend_url).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("expected an http(s) origin".into()));
        }

        let prefix = self.api_prefix.trim_matches('/');
        let mut path = url.path().trim_end_matches('/').to_string();
        if !prefix.is_empty() {
            path.push('/');
            path.push_str(prefix);
        }
        path.push('/');
        url.set_path(&path);
        Ok(url)
    }

    /// Resolves an API route such as `auth/refresh`
    pub fn endpoint(&self, route: &str) -> Result<Url, ConfigError> {
        let base = self.api_base()?;
        base.join(route.trim_start_matches('/'))
            .map_err(|e| ConfigError::InvalidUrl {
                url: format!("{}{}", base, route),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.login_path, "/login");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.refresh_failure_policy, RefreshFailurePolicy::Terminal);
        assert!(matches!(config.storage, StorageConfig::Keyring { .. }));
        // Tests build with debug assertions
        assert_eq!(config.backend_url, "http://localhost:8000");
    }

    #[test]
    fn test_api_base() {
        let config = ClientConfig::default().with_backend_url("https://example.com/");
        assert_eq!(config.api_base().unwrap().as_str(), "https://example.com/api/");

        let nested = ClientConfig::default().with_backend_url("https://example.com/prep");
        assert_eq!(nested.api_base().unwrap().as_str(), "https://example.com/prep/api/");
    }

    #[test]
    fn test_endpoint() {
        let config = ClientConfig::default();
        assert_eq!(
            config.endpoint("/auth/refresh").unwrap().as_str(),
            "http://localhost:8000/api/auth/refresh"
        );
    }

    #[test]
    fn test_invalid_backend_url() {
        let config = ClientConfig::default().with_backend_url("not a url");
        assert!(matches!(config.api_base(), Err(ConfigError::InvalidUrl { .. })));

        let config = ClientConfig::default().with_backend_url("ftp://files.example.com");
        assert!(config.api_base().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"backend_url":"https://staging.example.com","storage":{"kind":"memory"}}"#)
                .unwrap();
        assert_eq!(config.backend_url, "https://staging.example.com");
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.login_path, "/login");
    }

    #[test]
    fn test_policy_serialization() {
        let config = ClientConfig::default().with_refresh_failure_policy(RefreshFailurePolicy::Retain);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"refresh_failure_policy\":\"retain\""));
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = ClientConfig::default()
            .with_backend_url("https://staging.example.com")
            .with_storage(StorageConfig::File {
                path: dir.path().join("session.json"),
            });
        config.save_to(&path).unwrap();

        let loaded = ClientConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClientConfig::load_from(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_config_path_name() {
        if let Some(path) = ClientConfig::config_path() {
            assert!(path.ends_with("config.json"));
        }
    }
}
