//! Secure store facade.
//!
//! [`SecureStore`] wraps a plaintext into an [`Envelope`] sealed by the master
//! key, and unwraps it again. The caller owns storage of the envelope bytes;
//! the store never persists anything besides what its key container does.
//!
//! Each call resets the calling thread's last error on entry and records the
//! failure reason, if any, before returning.

use std::sync::Arc;

use crate::config::SecureStoreConfig;
use crate::diagnostics;
use crate::envelope::{self, Envelope};
use crate::error::{ErrorKind, KeystoreError, SecureStoreError, SecureStoreResult};
use crate::keystore::{KeyContainer, SoftwareKeyContainer};
use crate::provider::{KeyProvider, MasterKey};

/// Result of [`SecureStore::decrypt_or_passthrough`].
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct Unwrapped {
    /// The decrypted secret, or the input unchanged if it was not an envelope.
    pub plaintext: Vec<u8>,
    /// True if the input was an envelope and has been decrypted.
    pub was_wrapped: bool,
}

/// Encrypts and decrypts small secrets with a device-bound master key.
///
/// The optional `context` passed to `encrypt` is bound into the
/// authentication tag and must be passed again to `decrypt`. An empty context
/// is the same as no context.
#[derive(Debug, uniffi::Object)]
pub struct SecureStore {
    provider: KeyProvider,
    enabled: bool,
}

#[uniffi::export]
impl SecureStore {
    /// Creates a store over a host-supplied key container.
    #[uniffi::constructor]
    #[allow(clippy::needless_pass_by_value)]
    #[must_use]
    pub fn new(container: Arc<dyn KeyContainer>, config: SecureStoreConfig) -> Self {
        let provider = KeyProvider::new(container, &config);
        Self {
            provider,
            enabled: config.enabled,
        }
    }

    /// Creates a store over the built-in software key container.
    ///
    /// With `key_dir` the master key is persisted there and survives
    /// restarts; without it the key lives only as long as the process.
    #[uniffi::constructor]
    #[must_use]
    pub fn with_software_container(key_dir: Option<String>, config: SecureStoreConfig) -> Self {
        let container: Arc<dyn KeyContainer> = match key_dir {
            Some(dir) => Arc::new(SoftwareKeyContainer::persistent(dir)),
            None => Arc::new(SoftwareKeyContainer::in_memory()),
        };
        Self::new(container, config)
    }

    /// Returns true if the store is enabled and its key container is usable.
    ///
    /// Does not create the master key.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.enabled && self.provider.is_supported()
    }

    /// Encrypts `plaintext`, returning the envelope bytes.
    ///
    /// Returns `None` on failure; the reason is available from
    /// [`SecureStore::last_error`].
    #[allow(clippy::needless_pass_by_value)]
    #[must_use]
    pub fn encrypt(&self, plaintext: Vec<u8>, context: Option<Vec<u8>>) -> Option<Vec<u8>> {
        self.try_encrypt(&plaintext, context.as_deref()).ok()
    }

    /// Decrypts envelope bytes produced by [`SecureStore::encrypt`].
    ///
    /// Returns `None` on failure; the reason is available from
    /// [`SecureStore::last_error`].
    #[allow(clippy::needless_pass_by_value)]
    #[must_use]
    pub fn decrypt(&self, envelope: Vec<u8>, context: Option<Vec<u8>>) -> Option<Vec<u8>> {
        self.try_decrypt(&envelope, context.as_deref()).ok()
    }

    /// Decrypts `data` if it is an envelope, otherwise returns it unchanged.
    ///
    /// Lets callers migrate values stored before wrapping was enabled: read,
    /// unwrap or pass through, and re-encrypt when `was_wrapped` is false.
    /// Returns `None` if `data` is an envelope that fails to decrypt.
    #[allow(clippy::needless_pass_by_value)]
    #[must_use]
    pub fn decrypt_or_passthrough(
        &self,
        data: Vec<u8>,
        context: Option<Vec<u8>>,
    ) -> Option<Unwrapped> {
        self.try_decrypt_or_passthrough(&data, context.as_deref()).ok()
    }

    /// Returns the calling thread's last failure reason, or an empty string if
    /// its most recent call succeeded.
    #[allow(clippy::unused_self)] // associated functions are not supported with Uniffi exports
    #[must_use]
    pub fn last_error(&self) -> String {
        diagnostics::last_error_message()
    }

    /// Returns the taxonomy bucket of the calling thread's last failure.
    #[allow(clippy::unused_self)] // associated functions are not supported with Uniffi exports
    #[must_use]
    pub fn last_error_kind(&self) -> Option<ErrorKind> {
        diagnostics::last_error_kind()
    }
}

impl SecureStore {
    /// Encrypts `plaintext` into envelope bytes.
    ///
    /// # Errors
    ///
    /// - [`SecureStoreError::EmptyPlaintext`] if `plaintext` is empty
    /// - [`SecureStoreError::Unsupported`] if the store is not supported
    /// - [`SecureStoreError::KeyUnavailable`] if no master key can be obtained
    /// - [`SecureStoreError::EncryptFailed`] if the key container fails to seal
    /// - [`SecureStoreError::InvalidNonce`] if the container returns an unusable nonce
    pub fn try_encrypt(
        &self,
        plaintext: &[u8],
        context: Option<&[u8]>,
    ) -> SecureStoreResult<Vec<u8>> {
        diagnostics::track(|| {
            if plaintext.is_empty() {
                return Err(SecureStoreError::EmptyPlaintext);
            }
            let aad = context.unwrap_or_default();
            let sealed = match self.master_key()?.seal(aad, plaintext) {
                Err(KeystoreError::KeyNotFound(_)) => {
                    log::warn!("master key vanished from the container, provisioning a new one");
                    self.provider.invalidate();
                    self.master_key()?.seal(aad, plaintext)
                }
                sealed => sealed,
            }
            .map_err(|err| {
                log::warn!("secure store seal failed: {err}");
                SecureStoreError::EncryptFailed
            })?;
            let envelope = Envelope::new(sealed.nonce, sealed.sealed)?;
            Ok(envelope.encode())
        })
    }

    /// Decrypts envelope bytes back into the plaintext.
    ///
    /// # Errors
    ///
    /// - [`SecureStoreError::EmptyEnvelope`] if `envelope` is empty
    /// - [`SecureStoreError::Unsupported`] if the store is not supported
    /// - [`SecureStoreError::InvalidEnvelope`] if the bytes are not a well-formed envelope
    /// - [`SecureStoreError::KeyUnavailable`] if no master key can be obtained
    /// - [`SecureStoreError::DecryptFailed`] if authentication or decryption fails
    pub fn try_decrypt(
        &self,
        envelope: &[u8],
        context: Option<&[u8]>,
    ) -> SecureStoreResult<Vec<u8>> {
        diagnostics::track(|| {
            if envelope.is_empty() {
                return Err(SecureStoreError::EmptyEnvelope);
            }
            if !self.is_supported() {
                return Err(SecureStoreError::Unsupported);
            }
            let envelope = Envelope::decode(envelope)?;
            let key = self.master_key()?;
            key.open(
                envelope.nonce(),
                context.unwrap_or_default(),
                envelope.sealed(),
            )
            .map_err(|err| {
                if matches!(err, KeystoreError::KeyNotFound(_)) {
                    // The envelope is lost with the old key; the next encrypt provisions anew.
                    self.provider.invalidate();
                }
                log::debug!("secure store open failed: {err}");
                SecureStoreError::DecryptFailed
            })
        })
    }

    /// Decrypts `data` if it starts with the envelope magic, otherwise passes
    /// it through unchanged. Passthrough never touches the key container.
    ///
    /// # Errors
    ///
    /// Any error of [`SecureStore::try_decrypt`] for data carrying the magic.
    pub fn try_decrypt_or_passthrough(
        &self,
        data: &[u8],
        context: Option<&[u8]>,
    ) -> SecureStoreResult<Unwrapped> {
        if envelope::is_envelope(data) {
            let plaintext = self.try_decrypt(data, context)?;
            return Ok(Unwrapped {
                plaintext,
                was_wrapped: true,
            });
        }
        diagnostics::track(|| {
            Ok(Unwrapped {
                plaintext: data.to_vec(),
                was_wrapped: false,
            })
        })
    }

    fn master_key(&self) -> SecureStoreResult<MasterKey> {
        if !self.is_supported() {
            return Err(SecureStoreError::Unsupported);
        }
        self.provider
            .get_or_create_key()
            .ok_or(SecureStoreError::KeyUnavailable)
    }
}

/// Returns true if `bytes` start with the secure store envelope magic.
///
/// Lets callers tell wrapped values from legacy plaintext without attempting
/// to decrypt.
#[uniffi::export]
#[allow(clippy::needless_pass_by_value)]
#[must_use]
pub fn is_secure_store_envelope(bytes: Vec<u8>) -> bool {
    envelope::is_envelope(&bytes)
}
