//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the service base URL, the session storage backend and the
//! last email used to sign in.
//!
//! Configuration is stored at `~/.config/warranty-manager/config.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{FileSessionStore, KeyringSessionStore, SessionStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "warranty-manager";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the service base URL
pub const API_URL_ENV: &str = "WARRANTY_API_URL";

/// Base URL used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1";

/// Where the session token is kept between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub storage: StorageBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the session file and logs
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Base URL, with `WARRANTY_API_URL` taking precedence over the file.
    pub fn api_base_url(&self) -> String {
        resolve_api_url(
            std::env::var(API_URL_ENV).ok(),
            self.api_base_url.as_deref(),
        )
    }

    /// Open the configured session store.
    pub fn open_store(&self) -> Result<Arc<dyn SessionStore>> {
        let store: Arc<dyn SessionStore> = match self.storage {
            StorageBackend::File => Arc::new(FileSessionStore::new(Self::data_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringSessionStore::new()?),
        };
        Ok(store)
    }
}

fn resolve_api_url(env: Option<String>, configured: Option<&str>) -> String {
    env.filter(|url| !url.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_api_url_precedence() {
        assert_eq!(resolve_api_url(None, None), DEFAULT_API_URL);
        assert_eq!(
            resolve_api_url(None, Some("https://warranty.example.com/api/v1")),
            "https://warranty.example.com/api/v1"
        );
        assert_eq!(
            resolve_api_url(
                Some("http://10.0.0.5:8080/api/v1".to_string()),
                Some("https://warranty.example.com/api/v1")
            ),
            "http://10.0.0.5:8080/api/v1"
        );
        // Blank env var is ignored
        assert_eq!(resolve_api_url(Some("  ".to_string()), None), DEFAULT_API_URL);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.storage, StorageBackend::File);
        assert!(config.api_base_url.is_none());
        assert!(config.last_email.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            api_base_url: Some("https://warranty.example.com/api/v1".to_string()),
            storage: StorageBackend::Keyring,
            last_email: Some("owner@example.com".to_string()),
        };
        config.save_to(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["storage"], "keyring");

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.storage, StorageBackend::Keyring);
        assert_eq!(loaded.last_email.as_deref(), Some("owner@example.com"));
    }

    #[test]
    fn test_data_dir_is_app_specific() {
        // No data directory at all on some CI hosts
        if let Ok(dir) = Config::data_dir() {
            assert!(dir.ends_with(APP_NAME));
        }
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
