//! Key Store Adapter
//!
//! Converts initialization output into the two persisted records and reads
//! key shares back for unsealing:
//! - `vault-root-token`: single field `token`
//! - `vault-unseal-keys`: fields `key1`..`keyN`, one per share
//!
//! Writes are conditional creates. An existing record is never replaced
//! unless overwriting was explicitly enabled: replacing the key shares of
//! a live fleet destroys the only copy of the old ones.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::kube::{SecretRecord, SecretStore};
use crate::types::{PersistenceError, StoreError};

pub const UNSEAL_KEYS_SECRET: &str = "vault-unseal-keys";
pub const ROOT_TOKEN_SECRET: &str = "vault-root-token";

/// Number of key files read from the local fallback directory.
pub const LOCAL_KEY_COUNT: usize = 3;

const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
const SECRET_TYPE_LABEL: &str = "vault.hashicorp.com/secret-type";

/// Positional key shares, `key1` first.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyRecord {
    shares: Vec<String>,
}

impl KeyRecord {
    pub fn new(shares: Vec<String>) -> Self {
        Self { shares }
    }

    pub fn shares(&self) -> &[String] {
        &self.shares
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    fn to_secret(&self) -> SecretRecord {
        let mut record = SecretRecord::new(UNSEAL_KEYS_SECRET)
            .with_label(COMPONENT_LABEL, "vault-secrets")
            .with_label(SECRET_TYPE_LABEL, "unseal-keys");
        for (i, share) in self.shares.iter().enumerate() {
            record = record.with_data(positional_name(i + 1), share.as_bytes());
        }
        record
    }

    /// Collect every `keyN` field in ascending numeric order; other fields are ignored.
    fn from_secret(record: &SecretRecord) -> Result<Self, PersistenceError> {
        let mut positional = BTreeMap::new();
        for (name, value) in &record.data {
            let Some(index) = parse_positional(name) else {
                debug!(secret = %record.name, field = %name, "Ignoring non-positional field");
                continue;
            };
            let share = String::from_utf8(value.clone()).map_err(|_| PersistenceError::Store {
                record: UNSEAL_KEYS_SECRET,
                source: StoreError::Malformed {
                    name: record.name.clone(),
                    reason: format!("{} is not valid UTF-8", name),
                },
            })?;
            positional.insert(index, share);
        }

        if positional.is_empty() {
            return Err(PersistenceError::NoKeys(UNSEAL_KEYS_SECRET));
        }
        Ok(Self::new(positional.into_values().collect()))
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyRecord({} shares)", self.shares.len())
    }
}

/// The root token issued at initialization.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    token: String,
}

impl CredentialRecord {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn to_secret(&self) -> SecretRecord {
        SecretRecord::new(ROOT_TOKEN_SECRET)
            .with_label(COMPONENT_LABEL, "vault-secrets")
            .with_label(SECRET_TYPE_LABEL, "root-token")
            .with_data("token", self.token.as_bytes())
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialRecord(..)")
    }
}

/// How a record ended up in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Overwritten,
}

fn positional_name(index: usize) -> String {
    format!("key{}", index)
}

fn parse_positional(name: &str) -> Option<usize> {
    name.strip_prefix("key")
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n >= 1)
}

/// Reads and writes key material in one namespace of the secret store.
#[derive(Clone)]
pub struct KeyStore {
    store: Arc<dyn SecretStore>,
    namespace: String,
    overwrite_existing: bool,
}

impl KeyStore {
    pub fn new(store: Arc<dyn SecretStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            overwrite_existing: false,
        }
    }

    /// Fall back to replacing an existing record when create finds one.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn save_credential(
        &self,
        credential: &CredentialRecord,
    ) -> Result<WriteOutcome, PersistenceError> {
        self.write(ROOT_TOKEN_SECRET, credential.to_secret()).await
    }

    pub async fn save_keys(&self, keys: &KeyRecord) -> Result<WriteOutcome, PersistenceError> {
        self.write(UNSEAL_KEYS_SECRET, keys.to_secret()).await
    }

    /// Load the persisted shares, `key1` first.
    pub async fn load_keys(&self) -> Result<KeyRecord, PersistenceError> {
        let record = self
            .store
            .get(&self.namespace, UNSEAL_KEYS_SECRET)
            .await
            .map_err(|source| PersistenceError::Store {
                record: UNSEAL_KEYS_SECRET,
                source,
            })?;
        KeyRecord::from_secret(&record)
    }

    async fn write(
        &self,
        name: &'static str,
        secret: SecretRecord,
    ) -> Result<WriteOutcome, PersistenceError> {
        match self.store.create(&self.namespace, &secret).await {
            Ok(()) => {
                debug!(secret = name, namespace = %self.namespace, "Secret created");
                Ok(WriteOutcome::Created)
            }
            Err(StoreError::AlreadyExists(_)) if self.overwrite_existing => {
                warn!(
                    secret = name,
                    namespace = %self.namespace,
                    "Secret already exists, overwriting it as configured"
                );
                self.store
                    .update(&self.namespace, &secret)
                    .await
                    .map_err(|source| PersistenceError::Store { record: name, source })?;
                Ok(WriteOutcome::Overwritten)
            }
            Err(StoreError::AlreadyExists(_)) => {
                error!(
                    secret = name,
                    namespace = %self.namespace,
                    "Secret already exists and was left untouched; the key material just generated is NOT persisted"
                );
                Err(PersistenceError::Conflict(name))
            }
            Err(source) => Err(PersistenceError::Store { record: name, source }),
        }
    }
}

/// Read `key1`..`key3` from a local directory, in order.
///
/// Each file holds one key; trailing whitespace is stripped.
pub async fn load_local_keys(dir: &Path) -> Result<KeyRecord, PersistenceError> {
    let mut shares = Vec::with_capacity(LOCAL_KEY_COUNT);
    for index in 1..=LOCAL_KEY_COUNT {
        let path = dir.join(positional_name(index));
        debug!(path = %path.display(), "Reading unseal key");

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PersistenceError::KeyFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let key = content.trim_end();
        if key.is_empty() {
            return Err(PersistenceError::KeyFile {
                path: path.display().to_string(),
                reason: "file is empty".to_string(),
            });
        }
        shares.push(key.to_string());
    }
    Ok(KeyRecord::new(shares))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube::InMemorySecretStore;

    fn shares(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("share-{}", i)).collect()
    }

    fn keystore() -> (Arc<InMemorySecretStore>, KeyStore) {
        let store = Arc::new(InMemorySecretStore::new());
        let keystore = KeyStore::new(store.clone(), "vault");
        (store, keystore)
    }

    #[tokio::test]
    async fn test_save_keys_positional_fields() {
        let (store, keystore) = keystore();
        let outcome = keystore.save_keys(&KeyRecord::new(shares(5))).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Created);

        let record = store.record("vault", UNSEAL_KEYS_SECRET).unwrap();
        let names: Vec<_> = record.data.keys().cloned().collect();
        assert_eq!(names, vec!["key1", "key2", "key3", "key4", "key5"]);
        assert_eq!(record.data["key3"], b"share-3");
        assert_eq!(record.labels[SECRET_TYPE_LABEL], "unseal-keys");
    }

    #[tokio::test]
    async fn test_save_credential() {
        let (store, keystore) = keystore();
        keystore
            .save_credential(&CredentialRecord::new("s.root"))
            .await
            .unwrap();

        let record = store.record("vault", ROOT_TOKEN_SECRET).unwrap();
        assert_eq!(record.data.len(), 1);
        assert_eq!(record.data["token"], b"s.root");
    }

    #[tokio::test]
    async fn test_existing_record_not_overwritten() {
        let (store, keystore) = keystore();
        keystore.save_keys(&KeyRecord::new(shares(5))).await.unwrap();

        let replacement = KeyRecord::new(vec!["new".to_string(); 5]);
        let err = keystore.save_keys(&replacement).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Conflict(UNSEAL_KEYS_SECRET)));

        let record = store.record("vault", UNSEAL_KEYS_SECRET).unwrap();
        assert_eq!(record.data["key1"], b"share-1");
    }

    #[tokio::test]
    async fn test_overwrite_when_enabled() {
        let (store, keystore) = keystore();
        let keystore = keystore.with_overwrite(true);
        keystore.save_keys(&KeyRecord::new(shares(5))).await.unwrap();

        let replacement = KeyRecord::new(vec!["new".to_string(); 5]);
        let outcome = keystore.save_keys(&replacement).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Overwritten);
        assert_eq!(
            store.record("vault", UNSEAL_KEYS_SECRET).unwrap().data["key1"],
            b"new"
        );
    }

    #[tokio::test]
    async fn test_write_failure_surfaces() {
        let (store, keystore) = keystore();
        store.fail_writes_to(ROOT_TOKEN_SECRET);

        let err = keystore
            .save_credential(&CredentialRecord::new("s.root"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::Store {
                record: ROOT_TOKEN_SECRET,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_load_keys_numeric_order() {
        let (store, keystore) = keystore();
        let mut record = SecretRecord::new(UNSEAL_KEYS_SECRET).with_data("note", "ignored");
        for i in 1..=10 {
            record = record.with_data(format!("key{}", i), format!("k{}", i));
        }
        store.insert("vault", record);

        let loaded = keystore.load_keys().await.unwrap();
        assert_eq!(loaded.len(), 10);
        assert_eq!(loaded.shares()[8], "k9");
        assert_eq!(loaded.shares()[9], "k10");
    }

    #[tokio::test]
    async fn test_load_keys_missing_record() {
        let (_store, keystore) = keystore();
        let err = keystore.load_keys().await.unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::Store {
                source: StoreError::NotFound(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_load_keys_empty_record() {
        let (store, keystore) = keystore();
        store.insert("vault", SecretRecord::new(UNSEAL_KEYS_SECRET));
        assert!(matches!(
            keystore.load_keys().await,
            Err(PersistenceError::NoKeys(_))
        ));
    }

    #[tokio::test]
    async fn test_load_local_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        for i in 1..=3 {
            std::fs::write(dir.path().join(format!("key{}", i)), format!("local-{}\n", i)).unwrap();
        }

        let keys = load_local_keys(dir.path()).await.unwrap();
        assert_eq!(keys.shares(), ["local-1", "local-2", "local-3"]);
    }

    #[tokio::test]
    async fn test_load_local_keys_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("key1"), "local-1").unwrap();

        let err = load_local_keys(dir.path()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::KeyFile { path, .. } if path.ends_with("key2")));
    }

    #[test]
    fn test_parse_positional() {
        assert_eq!(parse_positional("key1"), Some(1));
        assert_eq!(parse_positional("key12"), Some(12));
        assert_eq!(parse_positional("key0"), None);
        assert_eq!(parse_positional("token"), None);
        assert_eq!(parse_positional("keyx"), None);
    }
}
