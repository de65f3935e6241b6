//! Initialization Coordinator
//!
//! Elects at most one uninitialized instance per tick, initializes it with
//! the fixed 5-share / 3-threshold policy, persists the root token and the
//! shares, then unseals it with the first `threshold` shares.
//!
//! Persistence failures do not abort the sequence. The root token may end up
//! stored without the keys or the reverse; both are logged and visible in the
//! returned [`InitReport`].

use std::sync::Arc;
use tracing::{error, info, warn};

use super::executor::{UnsealExecutor, UnsealOutcome};
use crate::keystore::{CredentialRecord, KeyRecord, KeyStore, WriteOutcome};
use crate::types::{InitializationError, PersistenceError, UnsealError};
use crate::vault::{InitRequest, InstanceAddress, InstanceStatus, VaultApi};

/// Which uninitialized instance, if any, gets initialized in a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ElectionPolicy {
    /// Only when no instance of the fleet is initialized yet; then the first
    /// uninitialized one in discovery order.
    #[default]
    Fleet,
    /// The first uninitialized instance in discovery order, regardless of
    /// the state of the others.
    PerTick,
}

impl ElectionPolicy {
    /// Index of the instance to initialize among this tick's probe results.
    /// Instances whose probe failed are `None` and never elected.
    pub fn elect(&self, statuses: &[Option<InstanceStatus>]) -> Option<usize> {
        if *self == Self::Fleet
            && statuses
                .iter()
                .flatten()
                .any(|status| status.initialized)
        {
            return None;
        }

        statuses
            .iter()
            .position(|status| matches!(status, Some(s) if !s.initialized))
    }
}

/// What happened after a successful remote initialization.
#[derive(Debug)]
pub struct InitReport {
    pub credential: Result<WriteOutcome, PersistenceError>,
    pub keys: Result<WriteOutcome, PersistenceError>,
    pub unseal: Result<UnsealOutcome, UnsealError>,
}

impl InitReport {
    pub fn fully_persisted(&self) -> bool {
        self.credential.is_ok() && self.keys.is_ok()
    }
}

pub struct InitCoordinator {
    vault: Arc<dyn VaultApi>,
    keys: KeyStore,
    executor: Arc<UnsealExecutor>,
    request: InitRequest,
}

impl InitCoordinator {
    pub fn new(vault: Arc<dyn VaultApi>, keys: KeyStore, executor: Arc<UnsealExecutor>) -> Self {
        Self {
            vault,
            keys,
            executor,
            request: InitRequest::default(),
        }
    }

    /// Initialize `addr`, which the caller has just probed as uninitialized.
    ///
    /// Only a failed remote call is an error; nothing is persisted then and
    /// the next tick retries.
    pub async fn initialize(&self, addr: &InstanceAddress) -> Result<InitReport, InitializationError> {
        info!(
            addr = %addr,
            shares = self.request.secret_shares,
            threshold = self.request.secret_threshold,
            "Initializing Vault"
        );

        let result = self.vault.initialize(addr, &self.request).await?;
        if result.key_shares.len() != result.total_shares as usize {
            warn!(
                addr = %addr,
                expected = result.total_shares,
                received = result.key_shares.len(),
                "Vault returned an unexpected number of key shares"
            );
        }

        let credential = self
            .keys
            .save_credential(&CredentialRecord::new(result.root_credential.clone()))
            .await;
        if let Err(e) = &credential {
            error!(addr = %addr, error = %e, "Failed to store root token");
        }

        let keys = self
            .keys
            .save_keys(&KeyRecord::new(result.key_shares.clone()))
            .await;
        if let Err(e) = &keys {
            error!(addr = %addr, error = %e, "Failed to store unseal keys");
        }

        if credential.is_ok() && keys.is_ok() {
            info!(addr = %addr, namespace = %self.keys.namespace(), "Vault initialized and secrets stored");
        } else {
            warn!(
                addr = %addr,
                root_token_stored = credential.is_ok(),
                unseal_keys_stored = keys.is_ok(),
                "Vault initialized but key material is only partially persisted"
            );
        }

        let unseal = self.executor.apply(addr, result.threshold_shares()).await;
        match &unseal {
            Ok(outcome) => info!(addr = %addr, applied = outcome.applied(), unsealed = outcome.is_unsealed(), "Applied initial unseal keys"),
            Err(e) => error!(addr = %addr, error = %e, "Failed to unseal freshly initialized Vault"),
        }

        Ok(InitReport {
            credential,
            keys,
            unseal,
        })
    }
}
