//! Kubernetes REST client
//!
//! Just enough of the core/v1 API for the controller: list pods by label
//! selector, and create/get/replace Secrets. Authenticates with the pod's
//! service-account token, which is re-read on every request so rotated tokens
//! are picked up.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{InstanceDiscovery, SecretRecord, SecretStore};
use crate::types::{ClientError, DiscoveryError, StoreError};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

#[derive(Debug, Clone)]
enum Token {
    File(PathBuf),
    Static(String),
}

/// Client for the Kubernetes API server.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    base_url: String,
    token: Token,
}

impl KubeClient {
    /// Build a client from the in-cluster environment.
    ///
    /// `KUBE_API_URL` and `KUBE_TOKEN_FILE` override the service host and the
    /// mounted service-account token for out-of-cluster runs.
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = match std::env::var("KUBE_API_URL") {
            Ok(url) if !url.is_empty() => url,
            _ => {
                let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
                    ClientError::MissingConfig("KUBERNETES_SERVICE_HOST is not set".to_string())
                })?;
                let port = std::env::var("KUBERNETES_SERVICE_PORT").map_err(|_| {
                    ClientError::MissingConfig("KUBERNETES_SERVICE_PORT is not set".to_string())
                })?;
                if host.contains(':') {
                    format!("https://[{}]:{}", host, port)
                } else {
                    format!("https://{}:{}", host, port)
                }
            }
        };

        let sa_dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token_path = std::env::var("KUBE_TOKEN_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| sa_dir.join("token"));
        if !token_path.exists() {
            return Err(ClientError::MissingConfig(format!(
                "service account token not found at {}",
                token_path.display()
            )));
        }

        let mut builder = Client::builder();
        let ca_path = sa_dir.join("ca.crt");
        if ca_path.exists() {
            let pem = std::fs::read(&ca_path).map_err(|e| ClientError::Io {
                path: ca_path.display().to_string(),
                reason: e.to_string(),
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| ClientError::Http(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;

        debug!(api = %base_url, token = %token_path.display(), "Kubernetes client configured");

        Ok(Self {
            client,
            base_url,
            token: Token::File(token_path),
        })
    }

    /// Client for an explicit API server and bearer token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: Token::Static(token.into()),
        }
    }

    async fn bearer(&self) -> Result<String, String> {
        match &self.token {
            Token::Static(token) => Ok(token.clone()),
            Token::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(|t| t.trim().to_string())
                .map_err(|e| format!("failed to read token {}: {}", path.display(), e)),
        }
    }

    fn secrets_url(&self, namespace: &str) -> String {
        format!("{}/api/v1/namespaces/{}/secrets", self.base_url, namespace)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, String> {
        let token = self.bearer().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| e.to_string())
    }
}

// core/v1 wire shapes, reduced to the fields used here

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(default, rename = "podIP")]
    pod_ip: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Secret {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    metadata: ObjectMeta,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    secret_type: Option<String>,
    #[serde(default)]
    data: BTreeMap<String, String>,
}

impl Secret {
    fn from_record(namespace: &str, record: &SecretRecord) -> Self {
        Self {
            api_version: Some("v1".to_string()),
            kind: Some("Secret".to_string()),
            metadata: ObjectMeta {
                name: record.name.clone(),
                namespace: Some(namespace.to_string()),
                labels: record.labels.clone(),
            },
            secret_type: Some("Opaque".to_string()),
            data: record
                .data
                .iter()
                .map(|(k, v)| (k.clone(), STANDARD.encode(v)))
                .collect(),
        }
    }

    fn into_record(self) -> Result<SecretRecord, StoreError> {
        let name = self.metadata.name;
        let mut data = BTreeMap::new();
        for (key, value) in self.data {
            let bytes = STANDARD.decode(value.as_bytes()).map_err(|e| StoreError::Malformed {
                name: name.clone(),
                reason: format!("field {}: {}", key, e),
            })?;
            data.insert(key, bytes);
        }

        Ok(SecretRecord {
            name,
            labels: self.metadata.labels,
            data,
        })
    }
}

async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("{}: {}", status, body)
}

#[async_trait]
impl InstanceDiscovery for KubeClient {
    async fn list_instances(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<String>, DiscoveryError> {
        let url = format!("{}/api/v1/namespaces/{}/pods", self.base_url, namespace);
        let response = self
            .send(self.client.get(url).query(&[("labelSelector", label_selector)]))
            .await
            .map_err(DiscoveryError::Request)?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Request(error_body(response).await));
        }

        let pods: PodList = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Request(e.to_string()))?;

        let mut hosts = Vec::with_capacity(pods.items.len());
        for pod in pods.items {
            match pod.status.pod_ip.filter(|ip| !ip.is_empty()) {
                Some(ip) => {
                    debug!(pod = %pod.metadata.name, ip = %ip, "Found Vault pod");
                    hosts.push(ip);
                }
                None => debug!(pod = %pod.metadata.name, "Skipping Vault pod without IP"),
            }
        }

        Ok(hosts)
    }
}

#[async_trait]
impl SecretStore for KubeClient {
    async fn create(&self, namespace: &str, record: &SecretRecord) -> Result<(), StoreError> {
        let body = Secret::from_record(namespace, record);
        let response = self
            .send(self.client.post(self.secrets_url(namespace)).json(&body))
            .await
            .map_err(StoreError::Request)?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(StoreError::AlreadyExists(record.name.clone())),
            _ => Err(StoreError::Request(error_body(response).await)),
        }
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<SecretRecord, StoreError> {
        let url = format!("{}/{}", self.secrets_url(namespace), name);
        let response = self
            .send(self.client.get(url))
            .await
            .map_err(StoreError::Request)?;

        match response.status() {
            s if s.is_success() => {
                let secret: Secret = response.json().await.map_err(|e| StoreError::Malformed {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
                secret.into_record()
            }
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(name.to_string())),
            _ => Err(StoreError::Request(error_body(response).await)),
        }
    }

    async fn update(&self, namespace: &str, record: &SecretRecord) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.secrets_url(namespace), record.name);
        let body = Secret::from_record(namespace, record);
        let response = self
            .send(self.client.put(url).json(&body))
            .await
            .map_err(StoreError::Request)?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(record.name.clone())),
            _ => Err(StoreError::Request(error_body(response).await)),
        }
    }
}
