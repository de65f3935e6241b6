//! Read-only view of the Vault fleet
//!
//! Shared by the reconciliation loop and the readiness reporter. Holds no
//! state between calls: every call re-enumerates and re-probes.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::kube::InstanceDiscovery;
use crate::types::{DiscoveryError, ProbeError};
use crate::vault::{InstanceAddress, InstanceStatus, VaultApi};

#[derive(Clone)]
pub struct Fleet {
    discovery: Arc<dyn InstanceDiscovery>,
    vault: Arc<dyn VaultApi>,
    namespace: String,
    label_selector: String,
    port: u16,
}

impl Fleet {
    pub fn new(
        discovery: Arc<dyn InstanceDiscovery>,
        vault: Arc<dyn VaultApi>,
        namespace: impl Into<String>,
        label_selector: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            discovery,
            vault,
            namespace: namespace.into(),
            label_selector: label_selector.into(),
            port,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Current instance addresses in discovery order. An empty fleet is an error.
    pub async fn addresses(&self) -> Result<Vec<InstanceAddress>, DiscoveryError> {
        let hosts = self
            .discovery
            .list_instances(&self.namespace, &self.label_selector)
            .await?;

        if hosts.is_empty() {
            return Err(DiscoveryError::Empty);
        }

        debug!(count = hosts.len(), namespace = %self.namespace, "Found Vault pods");
        Ok(hosts
            .into_iter()
            .map(|host| InstanceAddress::new(host, self.port))
            .collect())
    }

    /// Probe each address in order. Failures are logged and kept in place.
    pub async fn probe_all(
        &self,
        addrs: &[InstanceAddress],
    ) -> Vec<Result<InstanceStatus, ProbeError>> {
        let mut statuses = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let status = self.vault.health(addr).await;
            if let Err(e) = &status {
                warn!(addr = %addr, error = %e, "Error checking Vault status");
            }
            statuses.push(status);
        }
        statuses
    }
}
