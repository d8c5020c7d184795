//! Platform key container abstraction.
//!
//! The secure store never handles raw key bytes. Every key lives inside a
//! container and is addressed by alias; the store asks the container to
//! generate a key under a policy and to seal or open data with it.
//!
//! # Platform Implementations
//!
//! - Android: Android Keystore (`StrongBox` when present, TEE otherwise)
//! - iOS: Keychain / Secure Enclave
//! - Desktop, tests: [`SoftwareKeyContainer`], a software-isolated container
//!   that keeps keys in process memory and optionally in owner-only key files
//!
//! Mobile hosts implement [`KeyContainer`] in Kotlin or Swift and hand it to
//! the store over FFI.

mod software;

pub use software::SoftwareKeyContainer;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::KeystoreResult;

/// Degree to which key material is isolated from the host process.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
    uniffi::Enum,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    /// Dedicated secure hardware (HSM, `StrongBox`, Secure Enclave).
    Hardware,
    /// Software-isolated key container (TEE-less keystore, OS keyring, key file).
    Software,
}

/// Symmetric AEAD algorithm a key is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum KeyAlgorithm {
    /// AES-256 in Galois/Counter Mode with a 128-bit tag.
    Aes256Gcm,
}

/// Generation policy handed to a container when creating the master key.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct KeySpec {
    /// Cipher the key is restricted to.
    pub algorithm: KeyAlgorithm,
    /// Key size in bits.
    pub key_size_bits: u32,
    /// Isolation level the container must honor or refuse.
    pub isolation: IsolationLevel,
    /// The container chooses a fresh random nonce on every seal.
    pub randomized_nonce: bool,
    /// Key may be used to encrypt.
    pub allow_encrypt: bool,
    /// Key may be used to decrypt.
    pub allow_decrypt: bool,
    /// Key bytes may leave the container.
    pub exportable: bool,
}

impl KeySpec {
    /// Policy for the master key: AES-256-GCM, encrypt and decrypt only,
    /// container-generated nonces, never exportable.
    #[must_use]
    pub const fn aes_256_gcm(isolation: IsolationLevel) -> Self {
        Self {
            algorithm: KeyAlgorithm::Aes256Gcm,
            key_size_bits: 256,
            isolation,
            randomized_nonce: true,
            allow_encrypt: true,
            allow_decrypt: true,
            exportable: false,
        }
    }
}

/// Output of a container seal: the nonce it generated and the sealed bytes.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct SealedBox {
    /// Nonce generated by the container for this seal.
    pub nonce: Vec<u8>,
    /// Ciphertext followed by the authentication tag.
    pub sealed: Vec<u8>,
}

/// Alias-addressed key storage with AEAD seal/open.
///
/// # Requirements
///
/// - Implementations MUST be safe to call from many threads at once.
/// - Keys MUST NOT be exportable, and raw key bytes never cross this trait.
/// - `generate_key` MUST NOT replace a key that already exists under the
///   alias. Racing creators either see the first key or fail.
/// - `seal` MUST generate a fresh nonce per call.
/// - `associated_data` MUST be bound into the authentication tag; an empty
///   value is the same as none.
/// - `seal` and `open_sealed` MUST report a key that no longer exists (deleted
///   or invalidated by the platform) as
///   [`KeystoreError::KeyNotFound`](crate::KeystoreError::KeyNotFound), so the
///   store can provision a replacement.
#[uniffi::export(with_foreign)]
pub trait KeyContainer: Send + Sync {
    /// Returns true if the container can store and use keys on this platform.
    ///
    /// Must be side-effect free and cheap.
    fn is_available(&self) -> bool;

    /// Looks up the key stored under `alias`.
    ///
    /// # Returns
    ///
    /// The isolation level the key lives at, or `None` if no key exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be queried.
    fn find_key(&self, alias: String) -> KeystoreResult<Option<IsolationLevel>>;

    /// Generates a key under `alias` following `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::IsolationUnsupported`](crate::KeystoreError::IsolationUnsupported)
    /// if the requested isolation level is not available, or another error if
    /// generation or persistence fails.
    fn generate_key(&self, alias: String, spec: KeySpec) -> KeystoreResult<()>;

    /// Seals `plaintext` under the key at `alias`, authenticating `associated_data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is missing or encryption fails.
    fn seal(
        &self,
        alias: String,
        associated_data: Vec<u8>,
        plaintext: Vec<u8>,
    ) -> KeystoreResult<SealedBox>;

    /// Opens `sealed` under the key at `alias` using `nonce`, verifying `associated_data`.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails, the nonce is unusable, or the
    /// key is missing.
    fn open_sealed(
        &self,
        alias: String,
        nonce: Vec<u8>,
        associated_data: Vec<u8>,
        sealed: Vec<u8>,
    ) -> KeystoreResult<Vec<u8>>;
}
