//! Secret store - Access tokens, the vault location and the index key.
//!
//! Production uses the OS keychain through `keyring`. Tests and ephemeral runs
//! use the in-memory store.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Key of the symmetric key sealing the index
pub const INDEX_KEY: &str = "pkm_index_key";
/// Key of the workspace access token
pub const WORKSPACE_TOKEN_KEY: &str = "workspace_access_token";
/// Key of the vault directory
pub const VAULT_LOCATION_KEY: &str = "vault_location";

/// Platform secret store.
pub trait SecretStore: Send + Sync {
    /// Read a secret. `Ok(None)` when nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a secret, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a secret. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Read a secret as UTF-8 text.
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| Error::SecretStore(format!("secret '{}' is not valid UTF-8", key))),
            None => Ok(None),
        }
    }

    /// Whether anything is stored under `key`.
    fn contains(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }
}

/// OS keychain (Keychain, Credential Manager, Secret Service).
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(&self.service, key)?)
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entry(key)?.get_secret() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entry(key)?.set_secret(value)?;
        debug!("[Secrets] Stored '{}' in {}", key, self.service);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local secret store.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| Error::SecretStore("memory store poisoned".to_string()))
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
