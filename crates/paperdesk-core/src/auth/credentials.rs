use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use keyring::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::CredentialBackend;

const SERVICE_NAME: &str = "paperdesk";

/// Keychain account holding the whole credential record as JSON
const SESSION_ACCOUNT: &str = "session";

/// Credential file name in cache directory
const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keychain error: {0}")]
    Keychain(#[from] keyring::Error),

    #[error("Malformed credential record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The durable credential record: two string slots, written as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub token: Option<String>,
    /// User profile as serialized JSON
    pub profile: Option<String>,
}

impl StoredCredentials {
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.profile.is_none()
    }
}

/// Durable storage for the credential record.
///
/// Every write replaces the whole record; there are no partial updates.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<StoredCredentials, StoreError>;

    fn save(&self, record: &StoredCredentials) -> Result<(), StoreError>;

    /// Erase the record. Succeeds when nothing is stored.
    fn clear(&self) -> Result<(), StoreError>;
}

/// Open the store selected in the configuration.
pub fn open_store(backend: CredentialBackend, cache_dir: &Path) -> Arc<dyn CredentialStore> {
    match backend {
        CredentialBackend::File => Arc::new(FileCredentialStore::new(cache_dir)),
        CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new(SERVICE_NAME)),
        CredentialBackend::Memory => Arc::new(MemoryCredentialStore::default()),
    }
}

/// JSON file in the cache directory.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(CREDENTIALS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<StoredCredentials, StoreError> {
        if !self.path.exists() {
            return Ok(StoredCredentials::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, record: &StoredCredentials) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(record)?;
        std::fs::write(&self.path, contents)?;
        debug!(path = %self.path.display(), "Credential record written");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// OS keychain. The record is kept as one JSON entry so a save replaces
/// token and profile in a single write.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, SESSION_ACCOUNT)?)
    }

    /// Keychain payload for `record`; `None` means the entry should not exist.
    fn encode(record: &StoredCredentials) -> Result<Option<String>, StoreError> {
        if record.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(record)?))
    }

    fn decode(payload: Option<String>) -> Result<StoredCredentials, StoreError> {
        match payload {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(StoredCredentials::default()),
        }
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self) -> Result<StoredCredentials, StoreError> {
        let payload = match self.entry()?.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => return Err(e.into()),
        };
        Self::decode(payload)
    }

    fn save(&self, record: &StoredCredentials) -> Result<(), StoreError> {
        match Self::encode(record)? {
            Some(payload) => {
                self.entry()?.set_password(&payload)?;
                debug!(service = %self.service, "Credential record written to keychain");
                Ok(())
            }
            None => self.clear(),
        }
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    record: Mutex<StoredCredentials>,
}

impl MemoryCredentialStore {
    pub fn with_record(record: StoredCredentials) -> Self {
        Self {
            record: Mutex::new(record),
        }
    }

    pub fn snapshot(&self) -> StoredCredentials {
        self.record.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<StoredCredentials, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, record: &StoredCredentials) -> Result<(), StoreError> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = record.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = StoredCredentials::default();
        Ok(())
    }
}
