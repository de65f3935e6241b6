//! Orchestrator collaborators: instance discovery and the secret store
//!
//! Both are consumed through traits so the controller never depends on a
//! concrete orchestrator. [`KubeClient`] implements them against the
//! Kubernetes REST API; [`memory`] holds in-process versions.

pub mod client;
pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::types::{DiscoveryError, StoreError};

pub use client::KubeClient;
pub use memory::{InMemorySecretStore, StaticDiscovery};

/// Label selector matching Vault server pods of the standard Helm chart.
pub const DEFAULT_LABEL_SELECTOR: &str = "app.kubernetes.io/name=vault,component=server";

/// A named secret: labels plus opaque byte values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretRecord {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl SecretRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Enumerates candidate Vault instances.
#[async_trait]
pub trait InstanceDiscovery: Send + Sync {
    /// Hosts (pod IPs) of the matching instances, in registry order.
    async fn list_instances(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<String>, DiscoveryError>;
}

/// Key/value secret API holding generated key material.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Create a record; fails with [`StoreError::AlreadyExists`] if the name is taken.
    async fn create(&self, namespace: &str, record: &SecretRecord) -> Result<(), StoreError>;

    /// Fetch a record; fails with [`StoreError::NotFound`] if missing.
    async fn get(&self, namespace: &str, name: &str) -> Result<SecretRecord, StoreError>;

    /// Replace an existing record; fails with [`StoreError::NotFound`] if missing.
    async fn update(&self, namespace: &str, record: &SecretRecord) -> Result<(), StoreError>;
}
