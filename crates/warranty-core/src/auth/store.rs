//! Durable storage for the current session token.
//!
//! Exactly one token is stored at a time. A missing token is a normal
//! "nobody is signed in" condition and is reported as `Ok(None)`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use keyring::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Keychain service name for the keyring-backed store
const KEYRING_SERVICE: &str = "warranty-manager";

/// Keychain account under which the token is kept
const KEYRING_ACCOUNT: &str = "token";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

pub trait SessionStore: Send + Sync {
    /// Persist `token`, replacing any previous one
    fn save(&self, token: &str) -> Result<(), StoreError>;

    /// The stored token, if any
    fn load(&self) -> Result<Option<String>, StoreError>;

    /// Remove the stored token. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), StoreError>;
}

/// On-disk layout of the session file: a single token entry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    token: String,
}

/// Token kept in `session.json` under the application data directory.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }
}

impl SessionStore for FileSessionStore {
    fn save(&self, token: &str) -> Result<(), StoreError> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&StoredSession {
            token: token.to_string(),
        })?;
        write_private(&path, contents.as_bytes())?;
        debug!(path = %path.display(), "Saved session token");
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, StoreError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let stored: StoredSession = serde_json::from_str(&contents)?;
        if stored.token.is_empty() {
            return Ok(None);
        }
        Ok(Some(stored.token))
    }

    fn clear(&self) -> Result<(), StoreError> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(&path)?;
            debug!(path = %path.display(), "Removed session token");
        }
        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

/// Token kept in the OS keychain.
///
/// One keychain entry is opened up front and reused, so every call reads and
/// writes the same credential.
pub struct KeyringSessionStore {
    service: String,
    entry: Entry,
}

impl KeyringSessionStore {
    pub fn new() -> Result<Self, StoreError> {
        Self::with_service(KEYRING_SERVICE)
    }

    pub fn with_service(service: impl Into<String>) -> Result<Self, StoreError> {
        let service = service.into();
        let entry = Entry::new(&service, KEYRING_ACCOUNT)?;
        Ok(Self { service, entry })
    }
}

impl SessionStore for KeyringSessionStore {
    fn save(&self, token: &str) -> Result<(), StoreError> {
        self.entry.set_password(token)?;
        debug!(service = %self.service, "Saved session token to keychain");
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, StoreError> {
        match self.entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemorySessionStore {
    token: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, token: &str) -> Result<(), StoreError> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.token.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert!(store.load().unwrap().is_none());
        // Clearing an empty store is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested"));

        store.save("first.token.value").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("first.token.value"));

        // Re-login supersedes the old token wholesale
        store.save("second.token.value").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("second.token.value"));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_file_store_layout_is_single_token_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.save("a.b.c").unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, serde_json::json!({ "token": "a.b.c" }));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.save("a.b.c").unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        std::fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_keyring_store_keeps_token_between_calls() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        let store = KeyringSessionStore::with_service("warranty-manager-test").unwrap();

        assert!(store.load().unwrap().is_none());
        store.save("a.b.c").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("a.b.c"));
        assert_eq!(store.load().unwrap().as_deref(), Some("a.b.c"));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        // Clearing an empty keychain entry is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::with_token("x.y.z");
        assert_eq!(store.load().unwrap().as_deref(), Some("x.y.z"));
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        store.save("p.q.r").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("p.q.r"));
    }
}
