//! Configuration for the unseal controller
//!
//! CLI arguments and environment variable handling using clap. Every setting
//! can come from the environment so the controller runs unchanged as a
//! Deployment with a plain `env:` block.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::kube::DEFAULT_LABEL_SELECTOR;
use crate::routes::ReadinessMode;
use crate::types::{Error, Result};
use crate::unseal::ElectionPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Vault auto-unseal controller
#[derive(Parser, Debug, Clone)]
#[command(name = "vault-autounseal")]
#[command(about = "Keeps a fleet of Vault servers initialized and unsealed")]
pub struct Args {
    /// Namespace the Vault pods and the key secrets live in
    #[arg(long, env = "VAULT_NAMESPACE", default_value = "vault")]
    pub namespace: String,

    /// Port of the Vault API on each pod
    #[arg(long, env = "VAULT_PORT", default_value = "8200")]
    pub vault_port: u16,

    /// Seconds between reconciliation ticks
    #[arg(long, env = "CHECK_INTERVAL", default_value = "10")]
    pub check_interval: u64,

    /// Directory of local key files (key1..key3) used when the stored keys
    /// cannot be read
    #[arg(long, env = "VAULT_UNSEAL_KEYS_DIR", default_value = "/vault/unseal-keys")]
    pub unseal_keys_dir: PathBuf,

    /// Label selector for Vault server pods
    #[arg(long, env = "VAULT_LABEL_SELECTOR", default_value = DEFAULT_LABEL_SELECTOR)]
    pub label_selector: String,

    /// Scheme used to reach the Vault API (http or https)
    #[arg(long, env = "VAULT_SCHEME", default_value = "http")]
    pub vault_scheme: String,

    /// Connect timeout for Vault requests in milliseconds
    #[arg(long, env = "VAULT_CONNECT_TIMEOUT_MS", default_value = "5000")]
    pub connect_timeout_ms: u64,

    /// Address the health endpoints listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Which uninitialized instance may be initialized in a tick
    #[arg(long, env = "INIT_ELECTION", value_enum, default_value_t = ElectionPolicy::Fleet)]
    pub init_election: ElectionPolicy,

    /// What /ready requires of every instance
    #[arg(long, env = "READINESS_MODE", value_enum, default_value_t = ReadinessMode::Unsealed)]
    pub readiness_mode: ReadinessMode,

    /// Replace existing key secrets instead of leaving them untouched
    #[arg(long, env = "OVERWRITE_EXISTING_SECRETS", default_value = "false")]
    pub overwrite_existing_secrets: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.check_interval == 0 {
            return Err(Error::Config("CHECK_INTERVAL must be at least 1 second".to_string()));
        }

        if self.vault_port == 0 {
            return Err(Error::Config("VAULT_PORT must not be 0".to_string()));
        }

        if self.namespace.trim().is_empty() {
            return Err(Error::Config("VAULT_NAMESPACE must not be empty".to_string()));
        }

        if !matches!(self.vault_scheme.as_str(), "http" | "https") {
            return Err(Error::Config(format!(
                "VAULT_SCHEME must be http or https, got {}",
                self.vault_scheme
            )));
        }

        Ok(())
    }
}
