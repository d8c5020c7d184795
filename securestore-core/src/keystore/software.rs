//! Software-isolated key container.
//!
//! Keys are generated from the OS RNG and held in process memory (zeroized on
//! drop). When constructed with a key directory, every key is also persisted
//! as one owner-only file per alias so it survives restarts.
//!
//! # Key Files
//!
//! ```text
//! <key_dir>/<hex(sha256(alias))>.key    32 raw key bytes, mode 0600
//! ```
//!
//! A key file is published by writing a temporary file and hard-linking it to
//! the final name. Linking fails if the name already exists, so two processes
//! racing to create the same alias converge on whichever key landed first.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{IsolationLevel, KeyAlgorithm, KeyContainer, KeySpec, SealedBox};
use crate::error::{KeystoreError, KeystoreResult};

/// Size of the AES-256 key in bytes.
const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce in bytes.
const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
const TAG_SIZE: usize = 16;

const KEY_FILE_EXTENSION: &str = "key";

type KeyBytes = Zeroizing<[u8; KEY_SIZE]>;

/// Software-isolated implementation of [`KeyContainer`].
///
/// Refuses [`IsolationLevel::Hardware`] policies so the key provider falls
/// back to a software-level key.
pub struct SoftwareKeyContainer {
    keys: RwLock<HashMap<String, KeyBytes>>,
    key_dir: Option<PathBuf>,
}

impl std::fmt::Debug for SoftwareKeyContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareKeyContainer")
            .field("key_dir", &self.key_dir)
            .finish_non_exhaustive()
    }
}

impl SoftwareKeyContainer {
    /// Creates a container whose keys live only as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            key_dir: None,
        }
    }

    /// Creates a container that persists keys under `key_dir`.
    ///
    /// The directory is created on first key generation.
    #[must_use]
    pub fn persistent(key_dir: impl AsRef<Path>) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            key_dir: Some(key_dir.as_ref().to_path_buf()),
        }
    }

    /// Returns the key directory, if keys are persisted.
    #[must_use]
    pub fn key_dir(&self) -> Option<&Path> {
        self.key_dir.as_deref()
    }

    /// Removes the key stored under `alias`, in memory and on disk.
    ///
    /// Returns false if there was no such key. Envelopes sealed under the
    /// removed key can no longer be opened.
    ///
    /// # Errors
    ///
    /// Returns an error if the key file cannot be removed.
    pub fn delete_key(&self, alias: &str) -> KeystoreResult<bool> {
        let mut keys = self.keys.write().map_err(|_| poisoned())?;
        let mut removed = keys.remove(alias).is_some();
        if let Some(path) = self.key_path(alias) {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        drop(keys);
        Ok(removed)
    }

    fn key_path(&self, alias: &str) -> Option<PathBuf> {
        self.key_dir.as_ref().map(|dir| {
            let digest = Sha256::digest(alias.as_bytes());
            dir.join(format!("{}.{KEY_FILE_EXTENSION}", hex::encode(digest)))
        })
    }

    /// Returns true if the alias is known, loading its key file into memory.
    fn ensure_loaded(&self, alias: &str) -> KeystoreResult<bool> {
        {
            let keys = self.keys.read().map_err(|_| poisoned())?;
            if keys.contains_key(alias) {
                return Ok(true);
            }
        }
        let Some(path) = self.key_path(alias) else {
            return Ok(false);
        };
        let Some(key) = read_key_file(&path)? else {
            return Ok(false);
        };
        self.keys
            .write()
            .map_err(|_| poisoned())?
            .entry(alias.to_string())
            .or_insert(key);
        Ok(true)
    }

    fn cipher(&self, alias: &str) -> KeystoreResult<Aes256Gcm> {
        if !self.ensure_loaded(alias)? {
            return Err(KeystoreError::KeyNotFound(alias.to_string()));
        }
        let keys = self.keys.read().map_err(|_| poisoned())?;
        let key = keys
            .get(alias)
            .ok_or_else(|| KeystoreError::KeyNotFound(alias.to_string()))?;
        Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| KeystoreError::Corrupted(format!("invalid key length: {e}")))
    }
}

impl KeyContainer for SoftwareKeyContainer {
    fn is_available(&self) -> bool {
        true
    }

    fn find_key(&self, alias: String) -> KeystoreResult<Option<IsolationLevel>> {
        Ok(self
            .ensure_loaded(&alias)?
            .then_some(IsolationLevel::Software))
    }

    fn generate_key(&self, alias: String, spec: KeySpec) -> KeystoreResult<()> {
        if spec.isolation == IsolationLevel::Hardware {
            return Err(KeystoreError::IsolationUnsupported(
                "software key container has no hardware isolation".to_string(),
            ));
        }
        if spec.algorithm != KeyAlgorithm::Aes256Gcm
            || spec.key_size_bits != 256
            || spec.exportable
        {
            return Err(KeystoreError::Crypto(format!(
                "unsupported key spec: {spec:?}"
            )));
        }

        if self.ensure_loaded(&alias)? {
            return Ok(());
        }

        // Held across publication so in-process creators are serialized.
        let mut keys = self.keys.write().map_err(|_| poisoned())?;
        if keys.contains_key(&alias) {
            return Ok(());
        }

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut *key);

        let key = match self.key_path(&alias) {
            Some(path) => publish_key_file(&path, key)?,
            None => key,
        };
        log::debug!("software key container stored key for alias {alias}");
        keys.insert(alias, key);
        Ok(())
    }

    fn seal(
        &self,
        alias: String,
        associated_data: Vec<u8>,
        plaintext: Vec<u8>,
    ) -> KeystoreResult<SealedBox> {
        let plaintext = Zeroizing::new(plaintext);
        let cipher = self.cipher(&alias)?;

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: &associated_data,
                },
            )
            .map_err(|_| KeystoreError::Crypto("aead encrypt failed".to_string()))?;

        Ok(SealedBox {
            nonce: nonce.to_vec(),
            sealed,
        })
    }

    fn open_sealed(
        &self,
        alias: String,
        nonce: Vec<u8>,
        associated_data: Vec<u8>,
        sealed: Vec<u8>,
    ) -> KeystoreResult<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(KeystoreError::Crypto(format!(
                "nonce has invalid length: {} (expected {NONCE_SIZE})",
                nonce.len()
            )));
        }
        if sealed.len() < TAG_SIZE {
            return Err(KeystoreError::Crypto(format!(
                "sealed data too short: {} bytes (minimum {TAG_SIZE})",
                sealed.len()
            )));
        }

        let cipher = self.cipher(&alias)?;
        cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &sealed,
                    aad: &associated_data,
                },
            )
            .map_err(|_| KeystoreError::Crypto("aead authentication failed".to_string()))
    }
}

fn poisoned() -> KeystoreError {
    KeystoreError::Unavailable("key table lock poisoned".to_string())
}

fn read_key_file(path: &Path) -> KeystoreResult<Option<KeyBytes>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => Zeroizing::new(bytes),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if bytes.len() != KEY_SIZE {
        return Err(KeystoreError::Corrupted(format!(
            "key file has invalid length: {} (expected {KEY_SIZE})",
            bytes.len()
        )));
    }
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&bytes);
    Ok(Some(key))
}

/// Publishes `key` at `path` unless a key file already exists there.
///
/// Returns the key that ends up stored, which is the existing one if another
/// process won the race.
fn publish_key_file(path: &Path, key: KeyBytes) -> KeystoreResult<KeyBytes> {
    publish_key_file_with(path, key, |from, to| fs::hard_link(from, to))
}

fn publish_key_file_with(
    path: &Path,
    key: KeyBytes,
    link: impl FnOnce(&Path, &Path) -> io::Result<()>,
) -> KeystoreResult<KeyBytes> {
    if let Some(existing) = read_key_file(path)? {
        return Ok(existing);
    }
    let dir = path
        .parent()
        .ok_or_else(|| KeystoreError::Io(format!("key path has no parent: {}", path.display())))?;
    fs::create_dir_all(dir)?;

    let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));
    write_owner_only(&tmp, &key[..])?;
    let linked = link(&tmp, path);
    if let Err(err) = fs::remove_file(&tmp) {
        log::warn!("failed to remove temporary key file {}: {err}", tmp.display());
    }

    let published = match linked {
        // FAT/exFAT and some sandboxed mounts have no hard links. Exclusive
        // creation of the final name still refuses to overwrite a racing key.
        Err(err) if is_link_unsupported(&err) => {
            log::debug!("hard links unavailable in {}: {err}", dir.display());
            write_owner_only(path, &key[..])
        }
        other => other,
    };

    match published {
        Ok(()) => Ok(key),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => read_key_file(path)?
            .ok_or_else(|| KeystoreError::Corrupted("key file vanished after link".to_string())),
        Err(err) => Err(err.into()),
    }
}

fn is_link_unsupported(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied
    )
}

fn write_owner_only(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
