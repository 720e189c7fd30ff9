//! Configuration management for Quill

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{ConfigError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Where the remembered session token lives
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    /// One file per key under `session.path`
    #[default]
    File,
    /// OS-native keyring
    Keyring,
    /// Process memory only; nothing survives a restart
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub storage: TokenStorage,
    #[serde(default = "default_session_path")]
    pub path: String,
}

fn default_base_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_session_path() -> String {
    "~/.local/share/quill/session".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage: TokenStorage::default(),
            path: default_session_path(),
        }
    }
}

impl SessionConfig {
    /// Expand `~` in the session path
    pub fn expand_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

impl ApiConfig {
    /// Parse and check the base URL
    pub fn parsed_base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;

        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.base_url.clone(),
                reason: "expected an http(s) URL".to_string(),
            }
            .into());
        }

        Ok(url)
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file yields the defaults. `QUILL_API_URL` overrides the
    /// configured base URL either way.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`Config::load`], reading `path` instead of the resolved location
    /// when one is given
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => resolve_config_path()?,
        };
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!("No config file at {:?}, using defaults", config_path);
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.api.parsed_base_url()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("QUILL_API_URL") {
            if !url.is_empty() {
                self.api.base_url = url;
            }
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("QUILL_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("quill").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, DEFAULT_API_URL);
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.session.storage, TokenStorage::File);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[api]\nbase_url = \"https://blog.example.com\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.api.base_url, "https://blog.example.com");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.session.storage, TokenStorage::File);
    }

    #[test]
    fn test_storage_backend_parsing() {
        let config: Config = toml::from_str("[session]\nstorage = \"keyring\"\n").unwrap();
        assert_eq!(config.session.storage, TokenStorage::Keyring);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[api]\nbase_url = \"ftp://blog.example.com\"\n").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid API URL"));
    }

    #[test]
    fn test_malformed_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[api\nbase_url = ").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var("QUILL_CONFIG", temp_dir.path().join("absent.toml"));
        std::env::remove_var("QUILL_API_URL");

        let config = Config::load().unwrap();
        std::env::remove_var("QUILL_CONFIG");

        assert_eq!(config.api.base_url, DEFAULT_API_URL);
    }

    #[test]
    #[serial]
    fn test_api_url_env_override() {
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var("QUILL_CONFIG", temp_dir.path().join("absent.toml"));
        std::env::set_var("QUILL_API_URL", "http://127.0.0.1:9000");

        let config = Config::load().unwrap();
        std::env::remove_var("QUILL_CONFIG");
        std::env::remove_var("QUILL_API_URL");

        assert_eq!(config.api.base_url, "http://127.0.0.1:9000");
    }

    #[test]
    #[serial]
    fn test_load_from_explicit_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(&path, "[session]\nstorage = \"memory\"\n").unwrap();
        std::env::remove_var("QUILL_API_URL");

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.session.storage, TokenStorage::Memory);
        assert_eq!(config.api.base_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_expand_path() {
        let session = SessionConfig {
            storage: TokenStorage::File,
            path: "/tmp/quill-session".to_string(),
        };
        assert_eq!(session.expand_path(), PathBuf::from("/tmp/quill-session"));
    }
}
