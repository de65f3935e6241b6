//! Vault wire types and the per-probe status model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Number of key shares requested at initialization.
pub const SECRET_SHARES: u32 = 5;

/// Number of shares required to unseal.
pub const SECRET_THRESHOLD: u32 = 3;

/// Network location of one Vault instance, fixed for the duration of a tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceAddress {
    pub host: String,
    pub port: u16,
}

impl InstanceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL of the instance's HTTP API for the given scheme.
    pub fn base_url(&self, scheme: &str) -> String {
        format!("{}://{}", scheme, self)
    }
}

/// `host:port`, with IPv6 hosts in brackets.
impl fmt::Display for InstanceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host.parse::<IpAddr>() {
            Ok(ip) => write!(f, "{}", SocketAddr::new(ip, self.port)),
            Err(_) => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Seal state derived from one health probe. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub sealed: bool,
    pub initialized: bool,
}

impl InstanceStatus {
    /// Initialized and unsealed.
    pub fn is_ready(&self) -> bool {
        self.initialized && !self.sealed
    }

    /// `sealed` only gates unsealing once the instance is initialized.
    pub fn needs_unseal(&self) -> bool {
        self.initialized && self.sealed
    }
}

/// Body of `PUT /v1/sys/init`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    pub secret_shares: u32,
    pub secret_threshold: u32,
}

impl Default for InitRequest {
    fn default() -> Self {
        Self {
            secret_shares: SECRET_SHARES,
            secret_threshold: SECRET_THRESHOLD,
        }
    }
}

/// Response of `PUT /v1/sys/init`
#[derive(Debug, Clone, Deserialize)]
pub struct InitResponse {
    pub keys: Vec<String>,
    pub root_token: String,
    #[serde(default)]
    pub keys_base64: Vec<String>,
}

/// Key material produced by a successful initialization.
///
/// Lives only long enough to be persisted and to unseal the initialized
/// instance.
#[derive(Clone)]
pub struct InitResult {
    pub root_credential: String,
    pub key_shares: Vec<String>,
    pub total_shares: u32,
    pub threshold: u32,
}

impl InitResult {
    pub fn from_response(response: InitResponse, request: &InitRequest) -> Self {
        Self {
            root_credential: response.root_token,
            key_shares: response.keys,
            total_shares: request.secret_shares,
            threshold: request.secret_threshold,
        }
    }

    /// The shares needed to unseal, in positional order.
    pub fn threshold_shares(&self) -> &[String] {
        let n = (self.threshold as usize).min(self.key_shares.len());
        &self.key_shares[..n]
    }
}

// Key material must never reach the logs.
impl fmt::Debug for InitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitResult")
            .field("key_shares", &self.key_shares.len())
            .field("total_shares", &self.total_shares)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

/// Body of `POST /v1/sys/unseal`
#[derive(Debug, Serialize)]
pub struct UnsealRequest<'a> {
    pub key: &'a str,
}

/// Response of `POST /v1/sys/unseal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UnsealResponse {
    pub sealed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let addr = InstanceAddress::new("10.0.0.1", 8200);
        assert_eq!(addr.base_url("http"), "http://10.0.0.1:8200");
        assert_eq!(addr.to_string(), "10.0.0.1:8200");
    }

    #[test]
    fn test_base_url_brackets_ipv6() {
        let addr = InstanceAddress::new("fd00::1", 8200);
        assert_eq!(addr.base_url("http"), "http://[fd00::1]:8200");
        assert!(reqwest::Url::parse(&addr.base_url("https")).is_ok());

        let named = InstanceAddress::new("vault-0.vault-internal", 8200);
        assert_eq!(named.base_url("http"), "http://vault-0.vault-internal:8200");
    }

    #[test]
    fn test_uninitialized_never_needs_unseal() {
        let status = InstanceStatus {
            sealed: true,
            initialized: false,
        };
        assert!(!status.needs_unseal());
        assert!(!status.is_ready());
    }

    #[test]
    fn test_threshold_shares() {
        let result = InitResult {
            root_credential: "root".to_string(),
            key_shares: (1..=5).map(|i| format!("k{}", i)).collect(),
            total_shares: 5,
            threshold: 3,
        };
        assert_eq!(result.threshold_shares(), ["k1", "k2", "k3"]);
    }

    #[test]
    fn test_debug_hides_key_material() {
        let result = InitResult {
            root_credential: "s.supersecret".to_string(),
            key_shares: vec!["share-one".to_string()],
            total_shares: 1,
            threshold: 1,
        };
        let printed = format!("{:?}", result);
        assert!(!printed.contains("supersecret"));
        assert!(!printed.contains("share-one"));
    }
}
