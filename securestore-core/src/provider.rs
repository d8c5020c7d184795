//! Master key lifecycle.
//!
//! The provider resolves the single master key lazily: it looks the alias up
//! in the key container and, if nothing is there, asks the container to
//! generate one, walking the configured isolation policies in order until a
//! level succeeds.
//!
//! Creation is single-flight. The first caller takes the write lock and
//! resolves the key; every caller arriving meanwhile blocks and then reuses
//! the cached handle, so one process generates at most one key per alias.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::config::SecureStoreConfig;
use crate::error::{KeystoreError, KeystoreResult};
use crate::keystore::{IsolationLevel, KeyContainer, KeySpec, SealedBox};

/// Handle to the master key inside a key container.
///
/// The handle never holds key material. Seal and open are delegated to the
/// container that owns the key.
#[derive(Clone)]
pub struct MasterKey {
    alias: Arc<str>,
    isolation: IsolationLevel,
    container: Arc<dyn KeyContainer>,
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("alias", &self.alias)
            .field("isolation", &self.isolation)
            .finish_non_exhaustive()
    }
}

impl MasterKey {
    /// Returns the alias the key is stored under.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Returns the isolation level the key lives at.
    #[must_use]
    pub const fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Seals `plaintext`, binding `associated_data` into the tag.
    ///
    /// # Errors
    ///
    /// Returns the container's error if sealing fails.
    pub fn seal(&self, associated_data: &[u8], plaintext: &[u8]) -> KeystoreResult<SealedBox> {
        self.container.seal(
            self.alias.to_string(),
            associated_data.to_vec(),
            plaintext.to_vec(),
        )
    }

    /// Opens `sealed` with `nonce`, verifying `associated_data`.
    ///
    /// # Errors
    ///
    /// Returns the container's error if authentication or decryption fails.
    pub fn open(
        &self,
        nonce: &[u8],
        associated_data: &[u8],
        sealed: &[u8],
    ) -> KeystoreResult<Vec<u8>> {
        self.container.open_sealed(
            self.alias.to_string(),
            nonce.to_vec(),
            associated_data.to_vec(),
            sealed.to_vec(),
        )
    }
}

/// Obtains or creates the master key in a [`KeyContainer`].
pub struct KeyProvider {
    container: Arc<dyn KeyContainer>,
    alias: Arc<str>,
    policies: Vec<IsolationLevel>,
    cached: RwLock<Option<MasterKey>>,
}

impl fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyProvider")
            .field("alias", &self.alias)
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

impl KeyProvider {
    /// Creates a provider for the alias and policies in `config`.
    #[must_use]
    pub fn new(container: Arc<dyn KeyContainer>, config: &SecureStoreConfig) -> Self {
        Self {
            container,
            alias: Arc::from(config.key_alias.as_str()),
            policies: config.isolation_policies.clone(),
            cached: RwLock::new(None),
        }
    }

    /// Returns true if the container is usable and at least one policy is configured.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        !self.policies.is_empty() && self.container.is_available()
    }

    /// Returns the master key, creating it on first use.
    ///
    /// Returns `None` if the container is unavailable or key generation failed
    /// at every configured isolation level. The cause is logged.
    #[must_use]
    pub fn get_or_create_key(&self) -> Option<MasterKey> {
        match self.resolve() {
            Ok(key) => Some(key),
            Err(err) => {
                log::error!("secure store master key unavailable: {err}");
                None
            }
        }
    }

    /// Forgets the cached master key so the next call looks it up again.
    ///
    /// Called when the container reports the key gone, for example after a
    /// platform keystore invalidated it.
    pub fn invalidate(&self) {
        match self.cached.write() {
            Ok(mut cached) => *cached = None,
            Err(_) => log::error!("master key cache lock poisoned"),
        }
    }

    #[allow(clippy::significant_drop_tightening)] // the write guard serializes creation
    fn resolve(&self) -> KeystoreResult<MasterKey> {
        if let Some(key) = self.cached.read().map_err(|_| poisoned())?.as_ref() {
            return Ok(key.clone());
        }

        let mut cached = self.cached.write().map_err(|_| poisoned())?;
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        if !self.is_supported() {
            return Err(KeystoreError::Unavailable(
                "no usable key container".to_string(),
            ));
        }

        let isolation = match self.container.find_key(self.alias.to_string())? {
            Some(isolation) => {
                log::debug!("using existing master key at {isolation} isolation");
                isolation
            }
            None => self.create()?,
        };

        let key = MasterKey {
            alias: Arc::clone(&self.alias),
            isolation,
            container: Arc::clone(&self.container),
        };
        *cached = Some(key.clone());
        Ok(key)
    }

    /// Generates the key, trying each isolation policy in order.
    fn create(&self) -> KeystoreResult<IsolationLevel> {
        let mut last_error = None;
        for &isolation in &self.policies {
            let spec = KeySpec::aes_256_gcm(isolation);
            match self.container.generate_key(self.alias.to_string(), spec) {
                Ok(()) => {
                    log::info!("generated master key at {isolation} isolation");
                    // A racing process may have won; report what is actually stored.
                    return Ok(self
                        .container
                        .find_key(self.alias.to_string())?
                        .unwrap_or(isolation));
                }
                Err(err) => {
                    log::warn!("master key generation at {isolation} isolation failed: {err}");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            KeystoreError::Unavailable("no isolation policy configured".to_string())
        }))
    }
}

fn poisoned() -> KeystoreError {
    KeystoreError::Unavailable("master key cache lock poisoned".to_string())
}
