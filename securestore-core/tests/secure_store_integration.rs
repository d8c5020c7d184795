//! End-to-end behavior of the secure store over host-style and software key containers.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::TestKeystore;
use securestore_core::envelope::{Envelope, MAGIC};
use securestore_core::{
    last_error, ErrorKind, IsolationLevel, KeyContainer, SecureStore, SecureStoreConfig,
    SecureStoreError, SoftwareKeyContainer, DEFAULT_KEY_ALIAS,
};
use test_case::test_case;

fn store_over(container: &Arc<TestKeystore>) -> SecureStore {
    SecureStore::new(container.clone(), SecureStoreConfig::default())
}

fn header(nonce_len: u8) -> Vec<u8> {
    let mut bytes = MAGIC.to_vec();
    bytes.push(nonce_len);
    bytes
}

#[test]
fn test_round_trip_with_hardware_container() {
    let container = Arc::new(TestKeystore::hardware());
    let store = store_over(&container);

    for plaintext in [&b"x"[..], &b"session token"[..], &[0u8; 4096][..]] {
        let envelope = store.try_encrypt(plaintext, None).expect("encrypt");
        assert_eq!(&envelope[..MAGIC.len()], MAGIC);
        assert_eq!(envelope[MAGIC.len()], 24);
        assert_eq!(store.try_decrypt(&envelope, None).expect("decrypt"), plaintext);
    }

    let level = container
        .find_key(DEFAULT_KEY_ALIAS.to_string())
        .expect("find");
    assert_eq!(level, Some(IsolationLevel::Hardware));
    assert_eq!(container.generated(), 1);
}

#[test]
fn test_context_binding() {
    let store = store_over(&Arc::new(TestKeystore::hardware()));
    let envelope = store
        .try_encrypt(b"db key", Some(b"profile:alice".as_slice()))
        .expect("encrypt");

    assert_eq!(
        store
            .try_decrypt(&envelope, Some(b"profile:alice".as_slice()))
            .expect("decrypt"),
        b"db key"
    );
    for wrong in [Some(b"profile:bob".as_slice()), None, Some(b"".as_slice())] {
        assert_eq!(
            store.try_decrypt(&envelope, wrong),
            Err(SecureStoreError::DecryptFailed)
        );
    }
}

#[test]
fn test_nonces_are_unique() {
    let store = store_over(&Arc::new(TestKeystore::hardware()));

    let mut nonces = HashSet::new();
    let mut envelopes = HashSet::new();
    for _ in 0..256 {
        let envelope = store.try_encrypt(b"same secret", None).expect("encrypt");
        let parsed = Envelope::decode(&envelope).expect("decode");
        assert!(nonces.insert(parsed.nonce().to_vec()));
        assert_eq!(
            store.try_decrypt(&envelope, None).expect("decrypt"),
            b"same secret"
        );
        assert!(envelopes.insert(envelope));
    }
}

#[test_case(MAGIC[..10].to_vec() ; "shorter than header")]
#[test_case(MAGIC.to_vec() ; "missing nonce length")]
#[test_case({ let mut b = header(12); b[0] ^= 0x20; b.extend([1; 28]); b } ; "wrong magic")]
#[test_case({ let mut b = header(0); b.extend([1; 28]); b } ; "zero nonce length")]
#[test_case({ let mut b = header(33); b.extend([1; 60]); b } ; "oversized nonce length")]
#[test_case({ let mut b = header(24); b.extend([1; 10]); b } ; "nonce past end")]
#[test_case({ let mut b = header(24); b.extend([1; 24]); b } ; "no sealed data")]
fn test_malformed_envelope_rejected(bytes: Vec<u8>) {
    let container = Arc::new(TestKeystore::hardware());
    let store = store_over(&container);

    assert_eq!(
        store.try_decrypt(&bytes, None),
        Err(SecureStoreError::InvalidEnvelope)
    );
    assert_eq!(store.last_error_kind(), Some(ErrorKind::Format));
    assert_eq!(container.calls(), 0);
}

#[test]
fn test_any_bit_flip_is_rejected() {
    let store = store_over(&Arc::new(TestKeystore::hardware()));
    let context = Some(b"ctx".as_slice());
    let envelope = store.try_encrypt(b"tamper me", context).expect("encrypt");

    for index in 0..envelope.len() {
        let mut tampered = envelope.clone();
        tampered[index] ^= 0x01;
        let result = store.try_decrypt(&tampered, context);
        assert!(
            matches!(
                result,
                Err(SecureStoreError::InvalidEnvelope | SecureStoreError::DecryptFailed)
            ),
            "byte {index} flip was accepted: {result:?}"
        );
    }
}

#[test]
fn test_empty_inputs_never_reach_container() {
    let container = Arc::new(TestKeystore::hardware());
    let store = store_over(&container);

    assert_eq!(store.encrypt(Vec::new(), Some(b"ctx".to_vec())), None);
    assert_eq!(store.last_error(), "secure store plaintext empty");
    assert_eq!(store.decrypt(Vec::new(), None), None);
    assert_eq!(store.last_error(), "secure store envelope empty");
    assert_eq!(container.calls(), 0);
}

#[test]
fn test_concurrent_first_use_creates_one_key() {
    let container = Arc::new(TestKeystore::hardware());
    let store = Arc::new(store_over(&container));

    let handles: Vec<_> = (0..16u8)
        .map(|i| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let envelope = store.try_encrypt(&[i; 8], None).expect("encrypt");
                (i, envelope)
            })
        })
        .collect();

    for handle in handles {
        let (i, envelope) = handle.join().expect("join");
        assert_eq!(store.try_decrypt(&envelope, None).expect("decrypt"), [i; 8]);
    }
    assert_eq!(container.generated(), 1);
}

#[test]
fn test_encrypt_recovers_after_key_loss() {
    let container = Arc::new(SoftwareKeyContainer::in_memory());
    let store = SecureStore::new(container.clone(), SecureStoreConfig::default());
    let before = store.try_encrypt(b"before", None).expect("encrypt");

    assert!(container.delete_key(DEFAULT_KEY_ALIAS).expect("delete"));

    for round in 0..3 {
        let after = store
            .try_encrypt(b"after", None)
            .unwrap_or_else(|err| panic!("encrypt {round} after key loss: {err}"));
        assert_eq!(store.try_decrypt(&after, None).expect("decrypt"), b"after");
    }
    assert_eq!(
        container
            .find_key(DEFAULT_KEY_ALIAS.to_string())
            .expect("find"),
        Some(IsolationLevel::Software)
    );
    assert_eq!(
        store.try_decrypt(&before, None),
        Err(SecureStoreError::DecryptFailed)
    );
}

#[test]
fn test_decrypt_after_key_loss_then_encrypt() {
    let container = Arc::new(SoftwareKeyContainer::in_memory());
    let store = SecureStore::new(container.clone(), SecureStoreConfig::default());
    let before = store.try_encrypt(b"before", None).expect("encrypt");
    container.delete_key(DEFAULT_KEY_ALIAS).expect("delete");

    assert_eq!(
        store.try_decrypt(&before, None),
        Err(SecureStoreError::DecryptFailed)
    );
    let after = store.try_encrypt(b"after", None).expect("encrypt");
    assert_eq!(store.try_decrypt(&after, None).expect("decrypt"), b"after");
}

#[test]
fn test_falls_back_to_software_isolation() {
    let container = Arc::new(TestKeystore::software_only());
    let store = store_over(&container);

    let envelope = store.try_encrypt(b"secret", None).expect("encrypt");
    assert_eq!(store.try_decrypt(&envelope, None).expect("decrypt"), b"secret");
    assert_eq!(
        container
            .find_key(DEFAULT_KEY_ALIAS.to_string())
            .expect("find"),
        Some(IsolationLevel::Software)
    );
}

#[test]
fn test_require_hardware_refuses_fallback() {
    let container = Arc::new(TestKeystore::software_only());
    let config = SecureStoreConfig::default().require_hardware();
    let store = SecureStore::new(container.clone(), config);

    assert!(store.is_supported());
    assert_eq!(
        store.try_encrypt(b"secret", None),
        Err(SecureStoreError::KeyUnavailable)
    );
    assert_eq!(container.generated(), 0);
}

#[test]
fn test_unsupported_platforms() {
    let unavailable = Arc::new(TestKeystore::unavailable());
    let store = store_over(&unavailable);
    assert!(!store.is_supported());
    assert_eq!(
        store.try_encrypt(b"secret", None),
        Err(SecureStoreError::Unsupported)
    );
    assert_eq!(unavailable.calls(), 0);

    let container = Arc::new(TestKeystore::hardware());
    let config = SecureStoreConfig {
        enabled: false,
        ..SecureStoreConfig::default()
    };
    let disabled = SecureStore::new(container.clone(), config);
    assert!(!disabled.is_supported());
    assert_eq!(disabled.encrypt(b"secret".to_vec(), None), None);
    assert_eq!(disabled.last_error_kind(), Some(ErrorKind::Usage));
    assert_eq!(container.calls(), 0);
}

#[test_case(Vec::new() ; "empty nonce")]
#[test_case(vec![0; 33] ; "oversized nonce")]
fn test_container_nonce_is_validated(nonce: Vec<u8>) {
    let store = store_over(&Arc::new(TestKeystore::with_nonce(nonce)));
    assert_eq!(
        store.try_encrypt(b"secret", None),
        Err(SecureStoreError::InvalidNonce)
    );
}

#[test]
fn test_software_container_persists_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let key_dir = dir.path().to_str().expect("utf8 path").to_string();

    let first = SecureStore::with_software_container(
        Some(key_dir.clone()),
        SecureStoreConfig::default(),
    );
    let envelope = first.try_encrypt(b"persisted", None).expect("encrypt");

    let second = SecureStore::with_software_container(Some(key_dir), SecureStoreConfig::default());
    assert_eq!(
        second.try_decrypt(&envelope, None).expect("decrypt"),
        b"persisted"
    );

    let other_dir = tempfile::tempdir().expect("tempdir");
    let stranger = SecureStore::with_software_container(
        Some(other_dir.path().to_str().expect("utf8 path").to_string()),
        SecureStoreConfig::default(),
    );
    assert_eq!(
        stranger.try_decrypt(&envelope, None),
        Err(SecureStoreError::DecryptFailed)
    );
}

#[test]
fn test_last_error_tracks_most_recent_call() {
    let store = Arc::new(store_over(&Arc::new(TestKeystore::hardware())));

    assert!(store.decrypt(b"garbage".to_vec(), None).is_none());
    assert_eq!(last_error(), Some(SecureStoreError::InvalidEnvelope));

    let other = {
        let store = Arc::clone(&store);
        std::thread::spawn(move || (store.last_error(), store.last_error_kind()))
            .join()
            .expect("join")
    };
    assert_eq!(other, (String::new(), None));

    assert!(store.encrypt(b"fine".to_vec(), None).is_some());
    assert_eq!(last_error(), None);
    assert_eq!(store.last_error(), "");
}
