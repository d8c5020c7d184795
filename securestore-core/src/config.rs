//! Secure store configuration.
//!
//! Defaults suit a production install: one fixed master key alias, hardware
//! isolation preferred with a software fallback. Hosts may load a base
//! configuration from JSON (every field optional) and override any of it from
//! the environment:
//!
//! | Variable                       | Effect                                         |
//! |--------------------------------|------------------------------------------------|
//! | `SECURESTORE_KEY_ALIAS`        | Master key alias                               |
//! | `SECURESTORE_ISOLATION`        | Comma-separated policy order, e.g. `software`  |
//! | `SECURESTORE_REQUIRE_HARDWARE` | `1`/`true`/`on`: hardware only, no fallback    |
//! | `SECURESTORE_DISABLED`         | `1`/`true`/`on`: report the store unsupported  |

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::keystore::IsolationLevel;

/// Default alias of the master key.
pub const DEFAULT_KEY_ALIAS: &str = "securestore_master_key_v1";

const ENV_KEY_ALIAS: &str = "SECURESTORE_KEY_ALIAS";
const ENV_ISOLATION: &str = "SECURESTORE_ISOLATION";
const ENV_REQUIRE_HARDWARE: &str = "SECURESTORE_REQUIRE_HARDWARE";
const ENV_DISABLED: &str = "SECURESTORE_DISABLED";

/// Runtime configuration of a [`SecureStore`](crate::SecureStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct SecureStoreConfig {
    /// Alias the master key is stored under.
    pub key_alias: String,
    /// Isolation levels to try, in order, when the master key must be created.
    pub isolation_policies: Vec<IsolationLevel>,
    /// When false the store reports itself unsupported and refuses all calls.
    pub enabled: bool,
}

impl Default for SecureStoreConfig {
    fn default() -> Self {
        Self {
            key_alias: DEFAULT_KEY_ALIAS.to_string(),
            isolation_policies: vec![IsolationLevel::Hardware, IsolationLevel::Software],
            enabled: true,
        }
    }
}

impl SecureStoreConfig {
    /// Builds a configuration from the process environment, starting from defaults.
    ///
    /// Unparseable isolation entries are skipped with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies the environment variables on top of this configuration, for
    /// hosts that load a base configuration from a file.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub(crate) fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = self;

        if let Some(alias) = lookup(ENV_KEY_ALIAS).filter(|v| !v.trim().is_empty()) {
            config.key_alias = alias.trim().to_string();
        }
        if let Some(policies) = lookup(ENV_ISOLATION) {
            config.isolation_policies = parse_policies(&policies);
        }
        if lookup(ENV_REQUIRE_HARDWARE).is_some_and(|v| is_truthy(&v)) {
            config = config.require_hardware();
        }
        if lookup(ENV_DISABLED).is_some_and(|v| is_truthy(&v)) {
            config.enabled = false;
        }
        config
    }

    /// Restricts key creation to hardware isolation, with no software fallback.
    #[must_use]
    pub fn require_hardware(mut self) -> Self {
        self.isolation_policies = vec![IsolationLevel::Hardware];
        self
    }

    /// Replaces the isolation policy order.
    #[must_use]
    pub fn with_isolation_policies(mut self, policies: Vec<IsolationLevel>) -> Self {
        self.isolation_policies = policies;
        self
    }

    /// Replaces the master key alias.
    #[must_use]
    pub fn with_key_alias(mut self, alias: impl Into<String>) -> Self {
        self.key_alias = alias.into();
        self
    }
}

/// Returns the default configuration.
#[uniffi::export]
#[must_use]
pub fn default_config() -> SecureStoreConfig {
    SecureStoreConfig::default()
}

/// Returns the configuration derived from the process environment.
#[uniffi::export]
#[must_use]
pub fn config_from_env() -> SecureStoreConfig {
    SecureStoreConfig::from_env()
}

fn parse_policies(value: &str) -> Vec<IsolationLevel> {
    let mut policies = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match IsolationLevel::from_str(entry) {
            Ok(level) if !policies.contains(&level) => policies.push(level),
            Ok(_) => {}
            Err(_) => log::warn!("ignoring unknown isolation level {entry:?}"),
        }
    }
    policies
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}
