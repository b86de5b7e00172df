//! Index store - Authenticated-encrypted index file on local storage.
//!
//! File layout:
//!
//! ```text
//! PKMIDX01 (8 bytes) || nonce (12 bytes) || ciphertext || tag (16 bytes)
//! ```
//!
//! The magic header is bound to the ciphertext as associated data, so every
//! byte of the file is covered by authentication. The plaintext is a JSON
//! envelope `{"version": 1, "index": {...}}`.
//!
//! The store does no locking. Callers serialize writes.

use crate::crypto::{generate_key, Encryptor, KEY_LEN};
use crate::error::{Error, Result};
use crate::model::Index;
use crate::secrets::{SecretStore, INDEX_KEY};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Header of the encrypted index file
pub const INDEX_MAGIC: &[u8; 8] = b"PKMIDX01";

/// Schema version written by this build
pub const INDEX_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    index: &'a Index,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    index: Index,
}

/// Encrypted index file plus the key that seals it.
pub struct IndexStore {
    path: PathBuf,
    secrets: Arc<dyn SecretStore>,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            path: path.into(),
            secrets,
        }
    }

    /// Path of the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an index file exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Fetch the index key, generating and storing one on first use.
    fn load_key(&self) -> Result<[u8; KEY_LEN]> {
        if let Some(bytes) = self.secrets.get(INDEX_KEY)? {
            match <[u8; KEY_LEN]>::try_from(bytes.as_slice()) {
                Ok(key) => return Ok(key),
                Err(_) => warn!(
                    "[IndexStore] Stored key has {} bytes, expected {}; replacing it",
                    bytes.len(),
                    KEY_LEN
                ),
            }
        }

        let key = generate_key();
        // Delete first so the store never holds two entries for the key
        self.secrets.delete(INDEX_KEY)?;
        self.secrets.set(INDEX_KEY, &key)?;
        info!("[IndexStore] Generated new index key");
        Ok(key)
    }

    /// Seal and write the index, replacing the previous file atomically.
    pub fn save(&self, index: &Index) -> Result<()> {
        let key = self.load_key()?;
        let plaintext = serde_json::to_vec(&EnvelopeRef {
            version: INDEX_VERSION,
            index,
        })?;
        let sealed = Encryptor::new(&key).encrypt(&plaintext, INDEX_MAGIC)?;

        let mut blob = Vec::with_capacity(INDEX_MAGIC.len() + sealed.len());
        blob.extend_from_slice(INDEX_MAGIC);
        blob.extend_from_slice(&sealed);

        write_atomic(&self.path, &blob)?;
        debug!(
            "[IndexStore] Saved {} items ({} bytes) to {}",
            index.len(),
            blob.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Read and open the index.
    ///
    /// A missing file is an empty index. Any authentication or decoding
    /// failure is [`Error::StorageCorrupted`].
    pub fn load(&self) -> Result<Index> {
        let blob = match fs::read(&self.path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("[IndexStore] No index at {}", self.path.display());
                return Ok(Index::empty());
            }
            Err(e) => return Err(e.into()),
        };

        self.open(&blob)
    }

    fn open(&self, blob: &[u8]) -> Result<Index> {
        let sealed = blob
            .strip_prefix(INDEX_MAGIC.as_slice())
            .ok_or_else(|| Error::StorageCorrupted("wrong or missing header".to_string()))?;

        let key = self.load_key()?;
        let plaintext = Encryptor::new(&key)
            .decrypt(sealed, INDEX_MAGIC)
            .map_err(|e| Error::StorageCorrupted(e.to_string()))?;

        let header: EnvelopeHeader = serde_json::from_slice(&plaintext)
            .map_err(|e| Error::StorageCorrupted(format!("bad envelope: {}", e)))?;
        if header.version > INDEX_VERSION {
            return Err(Error::UnsupportedIndexVersion {
                found: header.version,
                supported: INDEX_VERSION,
            });
        }

        let envelope: Envelope = serde_json::from_slice(&plaintext)
            .map_err(|e| Error::StorageCorrupted(format!("bad index: {}", e)))?;
        Ok(envelope.index)
    }

    /// Persist the empty index.
    pub fn clear(&self) -> Result<()> {
        self.save(&Index::empty())
    }

    /// Move an unreadable index aside (`<name>.corrupt-<unix ts>`) and return
    /// its new path.
    pub fn quarantine(&self) -> Result<PathBuf> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "pkm_index".to_string());
        let target = self
            .path
            .with_file_name(format!("{}.corrupt-{}", file_name, Utc::now().timestamp()));

        fs::rename(&self.path, &target)?;
        warn!(
            "[IndexStore] Moved unreadable index to {}",
            target.display()
        );
        Ok(target)
    }
}

/// Write to a sibling temp file, then rename over `path`.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Item, Source};
    use crate::secrets::MemorySecretStore;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> (IndexStore, Arc<MemorySecretStore>) {
        let secrets = Arc::new(MemorySecretStore::new());
        let store = IndexStore::new(dir.path().join("data").join("pkm_index.enc"), secrets.clone());
        (store, secrets)
    }

    fn sample_index() -> Index {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let mut index = Index::empty();
        index.merge(
            [
                Item::new("Project plan", Source::Vault, at)
                    .with_link("file:///vault/plan.md")
                    .with_tags(["work", "urgent"]),
                Item::new("Roadmap", Source::Workspace, at).with_link("https://w.example/p/1"),
            ],
            at,
        );
        index
    }

    #[test]
    fn test_missing_file_loads_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let (store, _) = store_in(&dir);

        assert_eq!(store.load()?, Index::empty());
        Ok(())
    }

    #[test]
    fn test_roundtrip() -> Result<()> {
        let dir = TempDir::new()?;
        let (store, _) = store_in(&dir);

        let index = sample_index();
        store.save(&index)?;
        assert_eq!(store.load()?, index);

        store.save(&Index::empty())?;
        assert_eq!(store.load()?, Index::empty());
        Ok(())
    }

    #[test]
    fn test_file_has_header_and_no_plaintext() -> Result<()> {
        let dir = TempDir::new()?;
        let (store, _) = store_in(&dir);
        store.save(&sample_index())?;

        let blob = fs::read(store.path())?;
        assert_eq!(&blob[..INDEX_MAGIC.len()], INDEX_MAGIC);
        let text = String::from_utf8_lossy(&blob);
        assert!(!text.contains("Project plan"));
        Ok(())
    }

    #[test]
    fn test_any_flipped_byte_is_detected() -> Result<()> {
        let dir = TempDir::new()?;
        let (store, _) = store_in(&dir);
        store.save(&sample_index())?;
        let original = fs::read(store.path())?;

        for i in 0..original.len() {
            let mut tampered = original.clone();
            tampered[i] ^= 0x01;
            fs::write(store.path(), &tampered)?;

            match store.load() {
                Err(Error::StorageCorrupted(_)) => {}
                other => panic!("byte {} flipped, expected StorageCorrupted, got {:?}", i, other),
            }
        }
        Ok(())
    }

    #[test]
    fn test_truncated_file_is_corrupted() -> Result<()> {
        let dir = TempDir::new()?;
        let (store, _) = store_in(&dir);
        store.save(&sample_index())?;

        let blob = fs::read(store.path())?;
        fs::write(store.path(), &blob[..INDEX_MAGIC.len() + 4])?;

        assert!(matches!(store.load(), Err(Error::StorageCorrupted(_))));
        Ok(())
    }

    #[test]
    fn test_key_generated_once_and_reused() -> Result<()> {
        let dir = TempDir::new()?;
        let (store, secrets) = store_in(&dir);

        store.save(&sample_index())?;
        let key = secrets.get(INDEX_KEY)?.expect("key stored");
        assert_eq!(key.len(), KEY_LEN);

        store.save(&sample_index())?;
        store.load()?;
        assert_eq!(secrets.get(INDEX_KEY)?, Some(key));
        Ok(())
    }

    #[test]
    fn test_lost_key_is_corrupted() -> Result<()> {
        let dir = TempDir::new()?;
        let (store, secrets) = store_in(&dir);
        store.save(&sample_index())?;

        secrets.delete(INDEX_KEY)?;

        assert!(matches!(store.load(), Err(Error::StorageCorrupted(_))));
        Ok(())
    }

    #[test]
    fn test_malformed_key_is_replaced() -> Result<()> {
        let dir = TempDir::new()?;
        let (store, secrets) = store_in(&dir);
        secrets.set(INDEX_KEY, b"short")?;

        let index = sample_index();
        store.save(&index)?;

        assert_eq!(secrets.get(INDEX_KEY)?.map(|k| k.len()), Some(KEY_LEN));
        assert_eq!(store.load()?, index);
        Ok(())
    }

    #[test]
    fn test_newer_version_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let (store, secrets) = store_in(&dir);
        store.save(&Index::empty())?;

        // Re-seal a future envelope with the same key
        let key: [u8; KEY_LEN] = secrets
            .get(INDEX_KEY)?
            .and_then(|k| k.try_into().ok())
            .expect("key stored");
        let plaintext = br#"{"version": 2, "index": {"items": []}}"#;
        let sealed = Encryptor::new(&key).encrypt(plaintext, INDEX_MAGIC)?;
        let mut blob = INDEX_MAGIC.to_vec();
        blob.extend_from_slice(&sealed);
        fs::write(store.path(), blob)?;

        assert!(matches!(
            store.load(),
            Err(Error::UnsupportedIndexVersion { found: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_quarantine_moves_file_aside() -> Result<()> {
        let dir = TempDir::new()?;
        let (store, _) = store_in(&dir);
        store.save(&sample_index())?;

        let moved = store.quarantine()?;

        assert!(!store.exists());
        assert!(moved.exists());
        assert!(moved
            .file_name()
            .map(|n| n.to_string_lossy().starts_with("pkm_index.enc.corrupt-"))
            .unwrap_or(false));
        assert_eq!(store.load()?, Index::empty());
        Ok(())
    }

    #[test]
    fn test_clear_persists_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let (store, _) = store_in(&dir);
        store.save(&sample_index())?;

        store.clear()?;

        assert!(store.exists());
        assert!(store.load()?.is_empty());
        Ok(())
    }
}
