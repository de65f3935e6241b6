//! In-process collaborators.
//!
//! Fixed-host discovery and a map-backed secret store, used by the test suites.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::{InstanceDiscovery, SecretRecord, SecretStore};
use crate::types::{DiscoveryError, StoreError};

/// Discovery returning a fixed list of hosts.
pub struct StaticDiscovery {
    hosts: Mutex<Vec<String>>,
    failing: Mutex<bool>,
    calls: AtomicU32,
}

impl StaticDiscovery {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: Mutex::new(hosts.into_iter().map(Into::into).collect()),
            failing: Mutex::new(false),
            calls: AtomicU32::new(0),
        }
    }

    /// Make subsequent listings fail.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn set_hosts(&self, hosts: Vec<String>) {
        *self.hosts.lock().unwrap() = hosts;
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstanceDiscovery for StaticDiscovery {
    async fn list_instances(
        &self,
        _namespace: &str,
        _label_selector: &str,
    ) -> Result<Vec<String>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if *self.failing.lock().unwrap() {
            return Err(DiscoveryError::Request("discovery unavailable".to_string()));
        }
        Ok(self.hosts.lock().unwrap().clone())
    }
}

/// Secret store backed by a map keyed by `(namespace, name)`.
#[derive(Default)]
pub struct InMemorySecretStore {
    records: Mutex<HashMap<(String, String), SecretRecord>>,
    /// Names whose writes fail with a request error
    failing_writes: Mutex<HashSet<String>>,
    failing_reads: Mutex<bool>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes (create and update) of `name` fail.
    pub fn fail_writes_to(&self, name: &str) {
        self.failing_writes.lock().unwrap().insert(name.to_string());
    }

    /// All reads fail with a request error.
    pub fn set_failing_reads(&self, failing: bool) {
        *self.failing_reads.lock().unwrap() = failing;
    }

    /// Direct access to a stored record.
    pub fn record(&self, namespace: &str, name: &str) -> Option<SecretRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Seed a record without going through `create`.
    pub fn insert(&self, namespace: &str, record: SecretRecord) {
        self.records
            .lock()
            .unwrap()
            .insert((namespace.to_string(), record.name.clone()), record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_write(&self, name: &str) -> Result<(), StoreError> {
        if self.failing_writes.lock().unwrap().contains(name) {
            return Err(StoreError::Request(format!("write to {} rejected", name)));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn create(&self, namespace: &str, record: &SecretRecord) -> Result<(), StoreError> {
        self.check_write(&record.name)?;

        let mut records = self.records.lock().unwrap();
        let key = (namespace.to_string(), record.name.clone());
        if records.contains_key(&key) {
            return Err(StoreError::AlreadyExists(record.name.clone()));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<SecretRecord, StoreError> {
        if *self.failing_reads.lock().unwrap() {
            return Err(StoreError::Request("secret store unavailable".to_string()));
        }
        self.record(namespace, name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn update(&self, namespace: &str, record: &SecretRecord) -> Result<(), StoreError> {
        self.check_write(&record.name)?;

        let mut records = self.records.lock().unwrap();
        match records.get_mut(&(namespace.to_string(), record.name.clone())) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.name.clone())),
        }
    }
}
