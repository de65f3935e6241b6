//! Vault seal-state protocol
//!
//! The [`VaultApi`] trait is the seam between the controller and the remote
//! servers:
//! - [`HttpVault`] talks to real instances over HTTP
//! - [`MockVault`] simulates a fleet in memory for tests

pub mod client;
pub mod health;
pub mod mock;
pub mod models;

use async_trait::async_trait;

use crate::types::{InitializationError, ProbeError, UnsealError};

pub use client::HttpVault;
pub use mock::MockVault;
pub use models::{
    InitRequest, InitResult, InstanceAddress, InstanceStatus, UnsealResponse, SECRET_SHARES,
    SECRET_THRESHOLD,
};

/// Operations the controller performs against a single Vault instance.
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Query `sys/health` and classify the answer.
    async fn health(&self, addr: &InstanceAddress) -> Result<InstanceStatus, ProbeError>;

    /// Initialize the instance. Must be called only on an uninitialized one.
    async fn initialize(
        &self,
        addr: &InstanceAddress,
        request: &InitRequest,
    ) -> Result<InitResult, InitializationError>;

    /// Submit one key share. `sealed == true` in the answer is normal progress.
    async fn unseal(&self, addr: &InstanceAddress, key: &str) -> Result<UnsealResponse, UnsealError>;
}
