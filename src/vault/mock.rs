//! Simulated Vault fleet for testing.
//!
//! Each instance tracks its own seal state and unseal progress the way a real
//! server does: shares accumulate until the threshold is reached, duplicates do
//! not count, and unsealing an unsealed instance is a no-op.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::models::*;
use super::VaultApi;
use crate::types::{InitializationError, ProbeError, UnsealError};

/// A call observed by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultCall {
    Health(InstanceAddress),
    Initialize(InstanceAddress),
    Unseal(InstanceAddress, String),
}

#[derive(Debug, Default)]
struct Instance {
    initialized: bool,
    sealed: bool,
    threshold: usize,
    keys: Vec<String>,
    progress: HashSet<String>,
    fail_health: bool,
    fail_initialize: bool,
    /// 1-based unseal call numbers that fail at the transport level
    failing_unseal_calls: HashSet<usize>,
    unseal_calls: usize,
}

#[derive(Default)]
struct State {
    instances: HashMap<InstanceAddress, Instance>,
    calls: Vec<VaultCall>,
}

/// In-memory Vault fleet.
#[derive(Default)]
pub struct MockVault {
    state: Mutex<State>,
}

impl MockVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fresh, uninitialized instance.
    pub fn with_uninitialized(self, addr: &InstanceAddress) -> Self {
        self.insert(
            addr,
            Instance {
                sealed: true,
                ..Default::default()
            },
        );
        self
    }

    /// Add an initialized, sealed instance that accepts `keys`.
    pub fn with_sealed(self, addr: &InstanceAddress, keys: &[&str], threshold: usize) -> Self {
        self.insert(
            addr,
            Instance {
                initialized: true,
                sealed: true,
                threshold,
                keys: keys.iter().map(|k| k.to_string()).collect(),
                ..Default::default()
            },
        );
        self
    }

    /// Add an initialized, unsealed instance that accepts `keys`.
    pub fn with_unsealed(self, addr: &InstanceAddress, keys: &[&str], threshold: usize) -> Self {
        self.insert(
            addr,
            Instance {
                initialized: true,
                sealed: false,
                threshold,
                keys: keys.iter().map(|k| k.to_string()).collect(),
                ..Default::default()
            },
        );
        self
    }

    /// Health probes of `addr` fail at the transport level.
    pub fn fail_health(self, addr: &InstanceAddress) -> Self {
        self.with_instance(addr, |i| i.fail_health = true);
        self
    }

    /// `sys/init` on `addr` answers with a server error.
    pub fn fail_initialize(self, addr: &InstanceAddress) -> Self {
        self.with_instance(addr, |i| i.fail_initialize = true);
        self
    }

    /// The `call`-th unseal request (1-based) sent to `addr` fails.
    pub fn fail_unseal_call(self, addr: &InstanceAddress, call: usize) -> Self {
        self.with_instance(addr, |i| {
            i.failing_unseal_calls.insert(call);
        });
        self
    }

    /// Seal an instance again, as after a pod restart.
    pub fn reseal(&self, addr: &InstanceAddress) {
        self.with_instance(addr, |i| {
            if i.initialized {
                i.sealed = true;
                i.progress.clear();
            }
        });
    }

    /// Current state of an instance, bypassing failure injection.
    pub fn status(&self, addr: &InstanceAddress) -> Option<InstanceStatus> {
        let state = self.state.lock().unwrap();
        state.instances.get(addr).map(|i| InstanceStatus {
            sealed: i.sealed,
            initialized: i.initialized,
        })
    }

    /// Key shares an instance accepts; set at initialization.
    pub fn keys(&self, addr: &InstanceAddress) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .instances
            .get(addr)
            .map(|i| i.keys.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<VaultCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Keys sent to `addr` via unseal, in order.
    pub fn unseal_keys_sent(&self, addr: &InstanceAddress) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                VaultCall::Unseal(a, key) if &a == addr => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn initialize_count(&self, addr: &InstanceAddress) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, VaultCall::Initialize(a) if a == addr))
            .count()
    }

    fn insert(&self, addr: &InstanceAddress, instance: Instance) {
        self.state
            .lock()
            .unwrap()
            .instances
            .insert(addr.clone(), instance);
    }

    fn with_instance(&self, addr: &InstanceAddress, f: impl FnOnce(&mut Instance)) {
        let mut state = self.state.lock().unwrap();
        let instance = state.instances.entry(addr.clone()).or_insert_with(|| Instance {
            sealed: true,
            ..Default::default()
        });
        f(instance);
    }
}

#[async_trait]
impl VaultApi for MockVault {
    async fn health(&self, addr: &InstanceAddress) -> Result<InstanceStatus, ProbeError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(VaultCall::Health(addr.clone()));

        match state.instances.get(addr) {
            Some(i) if !i.fail_health => Ok(InstanceStatus {
                sealed: i.sealed,
                initialized: i.initialized,
            }),
            _ => Err(ProbeError::Transport(format!("connection refused: {}", addr))),
        }
    }

    async fn initialize(
        &self,
        addr: &InstanceAddress,
        request: &InitRequest,
    ) -> Result<InitResult, InitializationError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(VaultCall::Initialize(addr.clone()));

        let instance = state
            .instances
            .get_mut(addr)
            .ok_or_else(|| InitializationError::Transport(format!("connection refused: {}", addr)))?;

        if instance.fail_initialize {
            return Err(InitializationError::UnexpectedStatus(500));
        }
        if instance.initialized {
            return Err(InitializationError::UnexpectedStatus(400));
        }

        let keys: Vec<String> = (1..=request.secret_shares)
            .map(|i| format!("{}-share-{}", addr.host, i))
            .collect();

        instance.initialized = true;
        instance.sealed = true;
        instance.threshold = request.secret_threshold as usize;
        instance.keys = keys.clone();
        instance.progress.clear();

        Ok(InitResult::from_response(
            InitResponse {
                keys,
                root_token: format!("root-{}", addr.host),
                keys_base64: Vec::new(),
            },
            request,
        ))
    }

    async fn unseal(&self, addr: &InstanceAddress, key: &str) -> Result<UnsealResponse, UnsealError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(VaultCall::Unseal(addr.clone(), key.to_string()));

        let instance = state
            .instances
            .get_mut(addr)
            .ok_or_else(|| UnsealError::Transport(format!("connection refused: {}", addr)))?;

        instance.unseal_calls += 1;
        if instance.failing_unseal_calls.contains(&instance.unseal_calls) {
            return Err(UnsealError::Transport(format!("connection reset: {}", addr)));
        }
        if !instance.initialized {
            return Err(UnsealError::UnexpectedStatus(400));
        }
        if !instance.sealed {
            return Ok(UnsealResponse { sealed: false });
        }
        if !instance.keys.iter().any(|k| k == key) {
            return Err(UnsealError::UnexpectedStatus(400));
        }

        instance.progress.insert(key.to_string());
        if instance.progress.len() >= instance.threshold {
            instance.sealed = false;
            instance.progress.clear();
        }

        Ok(UnsealResponse {
            sealed: instance.sealed,
        })
    }
}
