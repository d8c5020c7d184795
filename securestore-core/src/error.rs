//! Error types for the secure store and its key containers.

use thiserror::Error;

/// Result type for facade operations.
pub type SecureStoreResult<T> = Result<T, SecureStoreError>;

/// Result type for key container operations.
pub type KeystoreResult<T> = Result<T, KeystoreError>;

/// Coarse failure reason reported to callers of the secure store.
///
/// Format and crypto failures are deliberately generic: a caller learns that an
/// envelope was rejected, never which field or check rejected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, uniffi::Error)]
pub enum SecureStoreError {
    /// The plaintext handed to `encrypt` was empty.
    #[error("secure store plaintext empty")]
    EmptyPlaintext,
    /// The envelope handed to `decrypt` was empty.
    #[error("secure store envelope empty")]
    EmptyEnvelope,
    /// The store is disabled or no key container is available.
    #[error("secure store unsupported")]
    Unsupported,
    /// The master key could not be found or created at any isolation level.
    #[error("secure store key unavailable")]
    KeyUnavailable,
    /// The key container returned a nonce outside `(0, MAX_NONCE_BYTES]`.
    #[error("secure store nonce invalid")]
    InvalidNonce,
    /// The key container failed to seal the plaintext.
    #[error("secure store encrypt failed")]
    EncryptFailed,
    /// The envelope is malformed (magic, nonce length or truncation).
    #[error("secure store envelope invalid")]
    InvalidEnvelope,
    /// Authentication failed or the key container failed to open the data.
    #[error("secure store decrypt failed")]
    DecryptFailed,
}

/// Failure taxonomy bucket of a [`SecureStoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum ErrorKind {
    /// Caller misuse: empty input or an unsupported platform.
    Usage,
    /// The key container could not provide a master key.
    Provisioning,
    /// The envelope bytes are malformed.
    Format,
    /// Authenticated encryption or decryption failed.
    Crypto,
}

impl SecureStoreError {
    /// Returns the taxonomy bucket for this error.
    #[must_use]
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::EmptyPlaintext | Self::EmptyEnvelope | Self::Unsupported => {
                ErrorKind::Usage
            }
            Self::KeyUnavailable => ErrorKind::Provisioning,
            Self::InvalidEnvelope => ErrorKind::Format,
            Self::InvalidNonce | Self::EncryptFailed | Self::DecryptFailed => {
                ErrorKind::Crypto
            }
        }
    }
}

/// Errors raised by key container implementations.
///
/// These carry detail for logs; the facade collapses them into
/// [`SecureStoreError`] before anything reaches the caller.
#[derive(Debug, Error, uniffi::Error)]
pub enum KeystoreError {
    /// The container cannot be used on this platform.
    #[error("key container unavailable: {0}")]
    Unavailable(String),

    /// The container cannot create keys at the requested isolation level.
    #[error("isolation level unsupported: {0}")]
    IsolationUnsupported(String),

    /// No key is stored under the alias.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Stored key material is malformed.
    #[error("key material corrupted: {0}")]
    Corrupted(String),

    /// AEAD seal or open failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Key persistence failed.
    #[error("io error: {0}")]
    Io(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for KeystoreError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

impl From<std::io::Error> for KeystoreError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}
