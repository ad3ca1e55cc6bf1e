//! Durable key-value persistence for the session credentials.
//!
//! The store keeps three named entries (`auth_token`, `refresh_token`,
//! `user_data`). It never inspects token contents. Backends implement
//! [`KeyValueStore`]; every multi-entry write goes through `set_many` so a
//! reader never observes a half-written session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use keyring::Entry;
use thiserror::Error;
use tracing::{debug, warn};

use super::session::Session;
use crate::models::UserProfile;

pub const ACCESS_TOKEN_KEY: &str = "auth_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user_data";

const ALL_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

/// Keyring service name
const SERVICE_NAME: &str = "finsession";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt credential data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// A string key-value store in the spirit of browser local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write all entries in one step.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError>;

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError>;
}

// ============================================================================
// Backends
// ============================================================================

/// Process-lifetime store. Used by tests and `--storage memory`.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set_many(&self, new_entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in new_entries {
            entries.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// JSON map on disk. Writes go to a sibling temp file that is renamed over
/// the original, so a crash mid-write leaves the previous contents intact.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_map()?.remove(key))
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        self.write_map(&map)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.path.exists() {
            return Ok(());
        }
        let mut map = self.read_map()?;
        for key in keys {
            map.remove(*key);
        }
        if map.is_empty() {
            std::fs::remove_file(&self.path)?;
            Ok(())
        } else {
            self.write_map(&map)
        }
    }
}

/// OS keychain. All entries live in one keychain item as a JSON map.
pub struct KeyringStore {
    account: String,
    write_lock: Mutex<()>,
}

impl KeyringStore {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn entry(&self) -> Result<Entry, StorageError> {
        Ok(Entry::new(SERVICE_NAME, &self.account)?)
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(serde_json::from_str(&secret)?),
            Err(keyring::Error::NoEntry) => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_map()?.remove(key))
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        self.entry()?.set_password(&serde_json::to_string(&map)?)?;
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        for key in keys {
            map.remove(*key);
        }
        let entry = self.entry()?;
        if map.is_empty() {
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e.into()),
            }
        } else {
            entry.set_password(&serde_json::to_string(&map)?)?;
            Ok(())
        }
    }
}

// ============================================================================
// Credential Store
// ============================================================================

/// Typed access to the three session entries on top of a [`KeyValueStore`].
///
/// Writes are serialized so a compare-then-write (renewal) cannot interleave
/// with a clear (logout).
pub struct CredentialStore {
    backend: Box<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(backend: Box<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist all three fields in one write.
    pub fn save(&self, session: &Session) -> Result<(), StorageError> {
        let user = serde_json::to_string(&session.user)?;
        let _guard = self.lock();
        self.backend.set_many(&[
            (ACCESS_TOKEN_KEY, session.access_token.as_str()),
            (REFRESH_TOKEN_KEY, session.refresh_token.as_str()),
            (USER_KEY, user.as_str()),
        ])
    }

    /// The last saved session, or `None` if any field is missing or unreadable.
    pub fn load(&self) -> Result<Option<Session>, StorageError> {
        let access_token = self.backend.get(ACCESS_TOKEN_KEY)?;
        let refresh_token = self.backend.get(REFRESH_TOKEN_KEY)?;
        let user = self.backend.get(USER_KEY)?;

        let (Some(access_token), Some(refresh_token), Some(user)) = (access_token, refresh_token, user)
        else {
            debug!("No complete session in credential store");
            return Ok(None);
        };

        match serde_json::from_str::<UserProfile>(&user) {
            Ok(user) => Ok(Some(Session {
                access_token,
                refresh_token,
                user,
            })),
            Err(e) => {
                warn!(error = %e, "Stored user profile is unreadable");
                Ok(None)
            }
        }
    }

    /// Remove every session entry. Clearing an empty store is a no-op.
    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock();
        self.backend.remove_many(&ALL_KEYS)
    }

    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.backend.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.backend.get(REFRESH_TOKEN_KEY)
    }

    pub fn user(&self) -> Result<Option<UserProfile>, StorageError> {
        match self.backend.get(USER_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Store both tokens without a profile (bootstrap redirect, before `/perfil` is fetched).
    pub fn save_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StorageError> {
        let _guard = self.lock();
        self.write_tokens(access_token, Some(refresh_token))
    }

    /// Replace the access token after a renewal, rotating the refresh token if
    /// one was issued, but only while the stored refresh token is still
    /// `expected_refresh`. Returns false and writes nothing if the session was
    /// cleared or replaced in the meantime.
    pub fn store_renewed_if_current(
        &self,
        expected_refresh: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<bool, StorageError> {
        let _guard = self.lock();
        if self.backend.get(REFRESH_TOKEN_KEY)?.as_deref() != Some(expected_refresh) {
            return Ok(false);
        }
        self.write_tokens(access_token, refresh_token)?;
        Ok(true)
    }

    fn write_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), StorageError> {
        match refresh_token {
            Some(refresh) => self.backend.set_many(&[
                (ACCESS_TOKEN_KEY, access_token),
                (REFRESH_TOKEN_KEY, refresh),
            ]),
            None => self.backend.set_many(&[(ACCESS_TOKEN_KEY, access_token)]),
        }
    }

    /// Replace the cached profile, keeping the tokens.
    pub fn save_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        let raw = serde_json::to_string(user)?;
        let _guard = self.lock();
        self.backend.set_many(&[(USER_KEY, raw.as_str())])
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        for key in ALL_KEYS {
            if self.backend.get(key)?.is_some() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
