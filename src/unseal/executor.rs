//! Unseal Executor
//!
//! Applies key shares to one instance strictly in positional order. Stops at
//! the first answer reporting `sealed == false` and at the first failed
//! submission; a failed key is not retried within the tick.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::keystore::{self, KeyStore};
use crate::types::{PersistenceError, UnsealError};
use crate::vault::{InstanceAddress, VaultApi};

/// Result of applying a key sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsealOutcome {
    /// The instance reported unsealed after `applied` submissions.
    Unsealed { applied: usize },
    /// Every key was accepted but the instance is still sealed.
    StillSealed { applied: usize },
    /// The sequence was empty; nothing was sent.
    NoKeys,
}

impl UnsealOutcome {
    pub fn applied(&self) -> usize {
        match self {
            Self::Unsealed { applied } | Self::StillSealed { applied } => *applied,
            Self::NoKeys => 0,
        }
    }

    pub fn is_unsealed(&self) -> bool {
        matches!(self, Self::Unsealed { .. })
    }
}

/// Where the shares for an unseal attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    SecretStore,
    LocalDirectory,
}

/// Failure of a sourced unseal attempt.
#[derive(Debug, thiserror::Error)]
pub enum UnsealAttemptError {
    #[error("No unseal keys available: {store}; fallback: {local}")]
    NoKeys {
        store: PersistenceError,
        local: PersistenceError,
    },

    #[error(transparent)]
    Unseal(#[from] UnsealError),
}

pub struct UnsealExecutor {
    vault: Arc<dyn VaultApi>,
    keys: KeyStore,
    local_keys_dir: PathBuf,
}

impl UnsealExecutor {
    pub fn new(vault: Arc<dyn VaultApi>, keys: KeyStore, local_keys_dir: impl Into<PathBuf>) -> Self {
        Self {
            vault,
            keys,
            local_keys_dir: local_keys_dir.into(),
        }
    }

    /// Apply `keys` in order until the instance reports unsealed.
    ///
    /// Does not assume the instance is sealed on entry: a first answer of
    /// `sealed == false` ends the sequence without error.
    pub async fn apply(
        &self,
        addr: &InstanceAddress,
        keys: &[String],
    ) -> Result<UnsealOutcome, UnsealError> {
        if keys.is_empty() {
            return Ok(UnsealOutcome::NoKeys);
        }

        let total = keys.len();
        for (i, key) in keys.iter().enumerate() {
            let index = i + 1;
            let response = self.vault.unseal(addr, key).await.map_err(|e| {
                UnsealError::KeyRejected {
                    index,
                    source: Box::new(e),
                }
            })?;

            if !response.sealed {
                info!(addr = %addr, key = index, total, "Vault unsealed");
                return Ok(UnsealOutcome::Unsealed { applied: index });
            }
            debug!(addr = %addr, key = index, total, "Applied key, Vault still sealed");
        }

        warn!(addr = %addr, applied = total, "All keys applied but Vault is still sealed");
        Ok(UnsealOutcome::StillSealed { applied: total })
    }

    /// Unseal with persisted shares, or with the local key files when the
    /// persisted record cannot be read.
    pub async fn unseal(
        &self,
        addr: &InstanceAddress,
    ) -> Result<(KeySource, UnsealOutcome), UnsealAttemptError> {
        let (source, keys) = match self.keys.load_keys().await {
            Ok(keys) => (KeySource::SecretStore, keys),
            Err(store_err) => {
                warn!(
                    addr = %addr,
                    error = %store_err,
                    dir = %self.local_keys_dir.display(),
                    "Persisted unseal keys unavailable, falling back to local key files"
                );
                match keystore::load_local_keys(&self.local_keys_dir).await {
                    Ok(keys) => (KeySource::LocalDirectory, keys),
                    Err(local_err) => {
                        return Err(UnsealAttemptError::NoKeys {
                            store: store_err,
                            local: local_err,
                        })
                    }
                }
            }
        };

        let outcome = self.apply(addr, keys.shares()).await?;
        Ok((source, outcome))
    }
}
