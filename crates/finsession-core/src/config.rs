//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API root, which credential backend to use, request timeout, the
//! session timing policy and the last email used to sign in.
//!
//! Configuration is stored at `~/.config/finsession/config.json`.
//! `FINSESSION_API_URL` and `FINSESSION_STORAGE` override the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::REQUEST_TIMEOUT_SECS;
use crate::auth::{CredentialStore, FileStore, KeyringStore, LifecyclePolicy, MemoryStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "finsession";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Credential file name for the file backend
const CREDENTIALS_FILE: &str = "session.json";

/// Keyring account holding the session entries
const KEYRING_ACCOUNT: &str = "session";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/v1";

pub const API_URL_ENV: &str = "FINSESSION_API_URL";
pub const STORAGE_ENV: &str = "FINSESSION_STORAGE";

/// Where the session entries are kept between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keyring" => Ok(StorageBackend::Keyring),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("Unknown storage backend '{}' (expected file, keyring or memory)", other),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageBackend::File => "file",
            StorageBackend::Keyring => "keyring",
            StorageBackend::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub storage: StorageBackend,
    pub request_timeout_secs: u64,
    pub session: LifecyclePolicy,
    pub last_email: Option<String>,
    pub log_to_file: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            storage: StorageBackend::default(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            session: LifecyclePolicy::default(),
            last_email: None,
            log_to_file: false,
        }
    }
}

impl Config {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(STORAGE_ENV).ok(),
        )?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))
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
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply `FINSESSION_API_URL` / `FINSESSION_STORAGE` style overrides.
    pub fn apply_overrides(
        &mut self,
        api_url: Option<String>,
        storage: Option<String>,
    ) -> Result<()> {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(storage) = storage.filter(|s| !s.trim().is_empty()) {
            self.storage = storage.parse()?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("logs"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Open the credential store for the configured backend.
    pub fn credential_store(&self) -> Result<CredentialStore> {
        let store = match self.storage {
            StorageBackend::File => {
                let path = self.data_dir()?.join(CREDENTIALS_FILE);
                CredentialStore::new(Box::new(FileStore::new(path)))
            }
            StorageBackend::Keyring => {
                CredentialStore::new(Box::new(KeyringStore::new(KEYRING_ACCOUNT)))
            }
            StorageBackend::Memory => CredentialStore::new(Box::new(MemoryStore::new())),
        };
        Ok(store)
    }
}
