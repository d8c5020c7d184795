//! Binary envelope format for sealed secrets.
//!
//! # Binary Layout
//!
//! ```text
//! Offset      Size         Field
//! ------      ----         -----
//! 0           24           magic ("SECURESTORE_BLOB_AEAD_V1")
//! 24          1            nonce_len (u8, 1..=32)
//! 25          nonce_len    nonce
//! 25+n        remainder    sealed data (ciphertext || tag), at least 1 byte
//! ```
//!
//! There is no version field beyond the magic. A new layout gets a new magic.

// Offsets are bounded by MAX_NONCE_BYTES and fit in a u8.
#![allow(clippy::cast_possible_truncation)]

use crate::error::{SecureStoreError, SecureStoreResult};

/// Magic tag identifying the envelope format and version.
pub const MAGIC: &[u8; 24] = b"SECURESTORE_BLOB_AEAD_V1";

/// Largest nonce an envelope may carry.
pub const MAX_NONCE_BYTES: usize = 32;

const HEADER_SIZE: usize = MAGIC.len() + 1;

/// One encrypted secret: the provider-generated nonce and the sealed data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    nonce: Vec<u8>,
    sealed: Vec<u8>,
}

impl Envelope {
    /// Builds an envelope from a nonce and sealed data.
    ///
    /// # Errors
    ///
    /// Returns [`SecureStoreError::InvalidNonce`] if the nonce is empty or longer
    /// than [`MAX_NONCE_BYTES`], and [`SecureStoreError::EncryptFailed`] if the
    /// sealed data is empty.
    pub fn new(nonce: Vec<u8>, sealed: Vec<u8>) -> SecureStoreResult<Self> {
        if !is_valid_nonce_len(nonce.len()) {
            return Err(SecureStoreError::InvalidNonce);
        }
        if sealed.is_empty() {
            return Err(SecureStoreError::EncryptFailed);
        }
        Ok(Self { nonce, sealed })
    }

    /// Returns the nonce.
    #[must_use]
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Returns the sealed data (ciphertext followed by the authentication tag).
    #[must_use]
    pub fn sealed(&self) -> &[u8] {
        &self.sealed
    }

    /// Encodes the envelope to bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.nonce.len() + self.sealed.len());
        out.extend_from_slice(MAGIC);
        out.push(self.nonce.len() as u8);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.sealed);
        out
    }

    /// Decodes an envelope from bytes.
    ///
    /// Checks run in order and stop at the first failure: minimum length,
    /// magic, nonce length range, and at least one byte of sealed data after
    /// the nonce.
    ///
    /// # Errors
    ///
    /// Returns [`SecureStoreError::InvalidEnvelope`] for every violation.
    pub fn decode(bytes: &[u8]) -> SecureStoreResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(SecureStoreError::InvalidEnvelope);
        }
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(SecureStoreError::InvalidEnvelope);
        }
        let nonce_len = usize::from(bytes[MAGIC.len()]);
        if !is_valid_nonce_len(nonce_len) {
            return Err(SecureStoreError::InvalidEnvelope);
        }
        let sealed_offset = HEADER_SIZE + nonce_len;
        if bytes.len() <= sealed_offset {
            return Err(SecureStoreError::InvalidEnvelope);
        }
        Ok(Self {
            nonce: bytes[HEADER_SIZE..sealed_offset].to_vec(),
            sealed: bytes[sealed_offset..].to_vec(),
        })
    }
}

/// Returns true if `bytes` starts with the envelope magic.
///
/// This is a cheap sniff and does not validate the rest of the envelope.
#[must_use]
pub fn is_envelope(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

const fn is_valid_nonce_len(len: usize) -> bool {
    len > 0 && len <= MAX_NONCE_BYTES
}
