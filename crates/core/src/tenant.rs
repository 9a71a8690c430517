//! Tenant Registry
//!
//! Resolves the tenant key carried on an inbound telephony connection to the
//! profile that drives the call: display name, AI credential, behavioral
//! instructions, voice and optional greeting. The registry is built once at
//! startup and never mutated afterwards.

use secrecy::SecretString;
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};
use tracing::warn;

/// Voice used when a tenant record does not name one.
pub const DEFAULT_VOICE: &str = "Puck";

/// Why a tenant key could not be resolved to a usable profile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TenantError {
    #[error("unknown tenant: {0}")]
    Unknown(String),
    #[error("tenant {0} has no AI credential configured")]
    MissingCredential(String),
}

/// Failures while loading tenant records at startup.
#[derive(Debug, thiserror::Error)]
pub enum TenantLoadError {
    #[error("invalid tenant file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid tenant key {0:?}: keys must be non-empty and use only [A-Za-z0-9_-]")]
    InvalidKey(String),
}

/// A fully resolved tenant. Only ever handed out with a credential present.
#[derive(Debug)]
pub struct TenantProfile {
    pub key: String,
    pub name: String,
    pub api_key: SecretString,
    pub system_prompt: String,
    pub voice: String,
    /// When set, the AI is asked to speak this greeting as soon as setup completes.
    pub greeting: Option<String>,
}

/// A tenant as written in the tenant file, before its credential is resolved.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantRecord {
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Name of an environment variable holding the credential.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default)]
    pub greeting: Option<String>,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

/// Read-only lookup from tenant key to profile.
pub trait TenantRegistry: Send + Sync {
    /// Resolves a tenant key. Unknown keys and keys without a credential both fail.
    fn resolve(&self, key: &str) -> Result<Arc<TenantProfile>, TenantError>;
}

enum Entry {
    Ready(Arc<TenantProfile>),
    MissingCredential,
}

/// An immutable, in-memory `TenantRegistry`.
pub struct StaticTenantRegistry {
    tenants: HashMap<String, Entry>,
}

impl StaticTenantRegistry {
    /// Builds the registry from parsed records, resolving `api_key_env` through `env`.
    ///
    /// An inline `api_key` wins over `api_key_env`. Empty credentials count as missing.
    pub fn from_records<F>(
        records: HashMap<String, TenantRecord>,
        env: F,
    ) -> Result<Self, TenantLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut tenants = HashMap::with_capacity(records.len());
        for (key, record) in records {
            if !is_valid_key(&key) {
                return Err(TenantLoadError::InvalidKey(key));
            }

            let credential = record
                .api_key
                .clone()
                .or_else(|| record.api_key_env.as_deref().and_then(&env))
                .filter(|k| !k.trim().is_empty());

            let entry = match credential {
                Some(api_key) => Entry::Ready(Arc::new(TenantProfile {
                    key: key.clone(),
                    name: record.name,
                    api_key: SecretString::from(api_key),
                    system_prompt: record.system_prompt,
                    voice: record.voice,
                    greeting: record.greeting.filter(|g| !g.trim().is_empty()),
                })),
                None => {
                    warn!(
                        tenant = %key,
                        "Tenant has no credential; connections for it will be rejected"
                    );
                    Entry::MissingCredential
                }
            };
            tenants.insert(key, entry);
        }
        Ok(Self { tenants })
    }

    /// Parses a JSON tenant file, reading credentials from the process environment.
    pub fn from_json(json: &str) -> Result<Self, TenantLoadError> {
        let records: HashMap<String, TenantRecord> = serde_json::from_str(json)?;
        Self::from_records(records, |name| std::env::var(name).ok())
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    /// Tenant keys in sorted order, for startup logging.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.tenants.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl TenantRegistry for StaticTenantRegistry {
    fn resolve(&self, key: &str) -> Result<Arc<TenantProfile>, TenantError> {
        match self.tenants.get(key) {
            Some(Entry::Ready(profile)) => Ok(profile.clone()),
            Some(Entry::MissingCredential) => Err(TenantError::MissingCredential(key.to_string())),
            None => Err(TenantError::Unknown(key.to_string())),
        }
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
