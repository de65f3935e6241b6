//! Vault auto-unseal controller
//!
//! Watches the Vault server pods of one namespace and keeps them usable:
//! initializes a fresh cluster once, stores the root token and the unseal
//! key shares as Kubernetes secrets, and unseals any instance found sealed.

pub mod config;
pub mod fleet;
pub mod keystore;
pub mod kube;
pub mod logging;
pub mod routes;
pub mod types;
pub mod unseal;
pub mod vault;

pub use config::Args;
pub use fleet::Fleet;
pub use keystore::KeyStore;
pub use routes::{create_router, ReadinessMode, ReadinessReporter};
pub use types::{Error, Result};
pub use unseal::{Controller, ElectionPolicy, InitCoordinator, UnsealExecutor};
