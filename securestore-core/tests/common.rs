//! Common test utilities shared across integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use securestore_core::{IsolationLevel, KeyContainer, KeySpec, KeystoreError, SealedBox};

const NONCE_SIZE: usize = 24;

/// Host-style key container with 24-byte XChaCha20-Poly1305 nonces.
///
/// Counts every key operation so tests can assert which calls reached it.
pub struct TestKeystore {
    keys: Mutex<HashMap<String, ([u8; 32], IsolationLevel)>>,
    hardware: bool,
    available: bool,
    nonce_override: Option<Vec<u8>>,
    calls: AtomicUsize,
    generated: AtomicUsize,
}

impl TestKeystore {
    /// A container backed by secure hardware.
    pub fn hardware() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            hardware: true,
            available: true,
            nonce_override: None,
            calls: AtomicUsize::new(0),
            generated: AtomicUsize::new(0),
        }
    }

    /// A container that refuses hardware-isolated keys.
    pub fn software_only() -> Self {
        Self {
            hardware: false,
            ..Self::hardware()
        }
    }

    /// A container that reports itself unusable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::hardware()
        }
    }

    /// A misbehaving container that reports `nonce` for every seal.
    pub fn with_nonce(nonce: Vec<u8>) -> Self {
        Self {
            nonce_override: Some(nonce),
            ..Self::hardware()
        }
    }

    /// Number of find, generate, seal and open calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of keys actually generated.
    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    fn key(&self, alias: &str) -> Result<[u8; 32], KeystoreError> {
        self.keys
            .lock()
            .map_err(|_| KeystoreError::Unavailable("mutex poisoned".to_string()))?
            .get(alias)
            .map(|(key, _)| *key)
            .ok_or_else(|| KeystoreError::KeyNotFound(alias.to_string()))
    }
}

impl KeyContainer for TestKeystore {
    fn is_available(&self) -> bool {
        self.available
    }

    fn find_key(&self, alias: String) -> Result<Option<IsolationLevel>, KeystoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .keys
            .lock()
            .map_err(|_| KeystoreError::Unavailable("mutex poisoned".to_string()))?
            .get(&alias)
            .map(|(_, level)| *level))
    }

    fn generate_key(&self, alias: String, spec: KeySpec) -> Result<(), KeystoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if spec.isolation == IsolationLevel::Hardware && !self.hardware {
            return Err(KeystoreError::IsolationUnsupported(
                "no secure hardware".to_string(),
            ));
        }
        // Widen the window for racing creators.
        std::thread::sleep(Duration::from_millis(5));

        let mut keys = self
            .keys
            .lock()
            .map_err(|_| KeystoreError::Unavailable("mutex poisoned".to_string()))?;
        keys.entry(alias).or_insert_with(|| {
            let mut key = [0u8; 32];
            OsRng.fill_bytes(&mut key);
            self.generated.fetch_add(1, Ordering::SeqCst);
            (key, spec.isolation)
        });
        Ok(())
    }

    fn seal(
        &self,
        alias: String,
        associated_data: Vec<u8>,
        plaintext: Vec<u8>,
    ) -> Result<SealedBox, KeystoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = self.key(&alias)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let sealed = cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: &associated_data,
                },
            )
            .map_err(|err| KeystoreError::Crypto(err.to_string()))?;
        Ok(SealedBox {
            nonce: self.nonce_override.clone().unwrap_or_else(|| nonce.to_vec()),
            sealed,
        })
    }

    fn open_sealed(
        &self,
        alias: String,
        nonce: Vec<u8>,
        associated_data: Vec<u8>,
        sealed: Vec<u8>,
    ) -> Result<Vec<u8>, KeystoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if nonce.len() != NONCE_SIZE {
            return Err(KeystoreError::Crypto("nonce size mismatch".to_string()));
        }
        let key = self.key(&alias)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        cipher
            .decrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &sealed,
                    aad: &associated_data,
                },
            )
            .map_err(|err| KeystoreError::Crypto(err.to_string()))
    }
}
