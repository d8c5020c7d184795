//! Local secure-blob store.
//!
//! Wraps small secrets (tokens, database keys, identity material) into a
//! self-describing authenticated envelope sealed by a master key that never
//! leaves the platform key container, and unwraps them again.
//!
//! ```rust
//! use securestore_core::{SecureStore, SecureStoreConfig};
//!
//! let store = SecureStore::with_software_container(None, SecureStoreConfig::default());
//! let context = Some(b"account:42".as_slice());
//! let envelope = store.try_encrypt(b"session token", context).unwrap();
//! let plaintext = store.try_decrypt(&envelope, context).unwrap();
//! assert_eq!(plaintext, b"session token");
//! ```
//!
//! Hosts on Android and iOS implement [`KeyContainer`] over the platform
//! keystore and construct the store through the generated bindings.

mod config;
pub use config::{config_from_env, default_config, SecureStoreConfig, DEFAULT_KEY_ALIAS};

mod diagnostics;
pub use diagnostics::{last_error, last_error_kind, last_error_message};

pub mod envelope;
pub use envelope::Envelope;

mod error;
pub use error::*;

pub mod keystore;
pub use keystore::{
    IsolationLevel, KeyAlgorithm, KeyContainer, KeySpec, SealedBox, SoftwareKeyContainer,
};

pub mod logger;

mod provider;
pub use provider::{KeyProvider, MasterKey};

mod store;
pub use store::{is_secure_store_envelope, SecureStore, Unwrapped};

uniffi::setup_scaffolding!("securestore_core");
