//! Durable storage for the remembered session token
//!
//! The store persists exactly one entry, keyed [`JWT_KEY`], holding the raw
//! bearer token. Absence of the entry means "no remembered session".
//!
//! Backends:
//! - [`FileTokenStore`]: one file per key, mode 0600 on Unix (default)
//! - [`KeyringTokenStore`]: OS-native keyring
//! - [`MemoryTokenStore`]: in-process map, mainly for tests
//!
//! ```no_run
//! use libquill::session::{FileTokenStore, TokenStore, JWT_KEY};
//!
//! # fn example() -> Result<(), libquill::error::StorageError> {
//! let store = FileTokenStore::new("/tmp/quill-session");
//! store.save(JWT_KEY, "eyJhbGciOi...")?;
//! assert!(store.load(JWT_KEY)?.is_some());
//! store.remove(JWT_KEY)?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::{SessionConfig, TokenStorage};
use crate::error::StorageError;

/// Key under which the session token is persisted
pub const JWT_KEY: &str = "jwt";

const KEYRING_SERVICE: &str = "quill";

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Key-value storage for session tokens
pub trait TokenStore: Send + Sync {
    /// Read a value. A missing key is `Ok(None)`, not an error.
    fn load(&self, key: &str) -> StorageResult<Option<String>>;

    fn save(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a value. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;

    fn backend_name(&self) -> &str;
}

/// Build the backend selected in the session configuration
pub fn open_token_store(config: &SessionConfig) -> StorageResult<Arc<dyn TokenStore>> {
    let store: Arc<dyn TokenStore> = match config.storage {
        TokenStorage::File => Arc::new(FileTokenStore::new(config.expand_path())),
        TokenStorage::Keyring => Arc::new(KeyringTokenStore::new()?),
        TokenStorage::Memory => Arc::new(MemoryTokenStore::new()),
    };
    tracing::debug!("Using {} token storage", store.backend_name());
    Ok(store)
}

/// Reject symlinks so a planted link cannot redirect token reads or writes
fn validate_not_symlink(path: &Path) -> StorageResult<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            Err(StorageError::Symlink(path.to_path_buf()))
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Io(e)),
    }
}

/// Plain files under a private directory
pub struct FileTokenStore {
    base_path: PathBuf,
}

impl FileTokenStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.token", key))
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.file_path(key);
        validate_not_symlink(&path)?;

        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    tracing::debug!("Loaded {} from {:?}", key, path);
                    Ok(Some(token.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn save(&self, key: &str, value: &str) -> StorageResult<()> {
        std::fs::create_dir_all(&self.base_path)?;

        let path = self.file_path(key);
        validate_not_symlink(&path)?;
        std::fs::write(&path, value)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!("Stored {} at {:?}", key, path);
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.file_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Removed {} at {:?}", key, path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}

/// OS keyring (macOS Keychain, Windows Credential Manager, Secret Service)
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    /// Fails with `StorageError::Unavailable` when no keyring is reachable
    pub fn new() -> StorageResult<Self> {
        Self::with_service(KEYRING_SERVICE)
    }

    pub fn with_service(service: impl Into<String>) -> StorageResult<Self> {
        let service = service.into();
        keyring::Entry::new(&service, "availability_check")
            .map_err(|e| StorageError::Unavailable(format!("OS keyring not accessible: {}", e)))?;
        Ok(Self { service })
    }

    fn entry(&self, key: &str) -> StorageResult<keyring::Entry> {
        keyring::Entry::new(&self.service, key)
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self, key: &str) -> StorageResult<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::Keyring(e.to_string())),
        }
    }

    fn save(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| StorageError::Keyring(e.to_string()))?;
        tracing::debug!("Stored {}.{} in OS keyring", self.service, key);
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::Keyring(e.to_string())),
        }
    }

    fn backend_name(&self) -> &str {
        "keyring"
    }
}

/// In-process storage
///
/// Clones share the same map, which lets a test hand one clone to a store,
/// drop that store, and build a fresh one on the same "disk".
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StorageError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable(
                "memory store switched off".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, key: &str) -> StorageResult<Option<String>> {
        self.check_available()?;
        Ok(self.values().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check_available()?;
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.check_available()?;
        self.values().remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
