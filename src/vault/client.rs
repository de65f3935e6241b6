//! HTTP client for the Vault system endpoints

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::health;
use super::models::*;
use super::VaultApi;
use crate::types::{ClientError, InitializationError, ProbeError, UnsealError};

/// Vault client shared by the loop and the readiness reporter.
///
/// No request timeout is layered on top of the transport; only connecting is
/// bounded.
#[derive(Clone)]
pub struct HttpVault {
    client: Client,
    scheme: String,
}

impl HttpVault {
    pub fn new(scheme: impl Into<String>, connect_timeout: Duration) -> Result<Self, ClientError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .user_agent(concat!("vault-autounseal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;

        Ok(Self::with_client(client, scheme))
    }

    pub fn with_client(client: Client, scheme: impl Into<String>) -> Self {
        Self {
            client,
            scheme: scheme.into(),
        }
    }

    fn url(&self, addr: &InstanceAddress, path: &str) -> String {
        format!("{}{}", addr.base_url(&self.scheme), path)
    }
}

#[async_trait]
impl VaultApi for HttpVault {
    async fn health(&self, addr: &InstanceAddress) -> Result<InstanceStatus, ProbeError> {
        let response = self
            .client
            .get(self.url(addr, "/v1/sys/health"))
            .send()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        let code = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        let status = health::classify(code, &body)?;
        debug!(
            addr = %addr,
            code,
            initialized = status.initialized,
            sealed = status.sealed,
            "Vault status"
        );
        Ok(status)
    }

    async fn initialize(
        &self,
        addr: &InstanceAddress,
        request: &InitRequest,
    ) -> Result<InitResult, InitializationError> {
        let response = self
            .client
            .put(self.url(addr, "/v1/sys/init"))
            .json(request)
            .send()
            .await
            .map_err(|e| InitializationError::Transport(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(InitializationError::UnexpectedStatus(response.status().as_u16()));
        }

        let body: InitResponse = response
            .json()
            .await
            .map_err(|e| InitializationError::Decode(e.to_string()))?;

        Ok(InitResult::from_response(body, request))
    }

    async fn unseal(&self, addr: &InstanceAddress, key: &str) -> Result<UnsealResponse, UnsealError> {
        let response = self
            .client
            .post(self.url(addr, "/v1/sys/unseal"))
            .json(&UnsealRequest { key })
            .send()
            .await
            .map_err(|e| UnsealError::Transport(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(UnsealError::UnexpectedStatus(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| UnsealError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpVault {
        HttpVault::new("http", Duration::from_secs(2)).unwrap()
    }

    fn address_of(server: &MockServer) -> InstanceAddress {
        let addr = server.address();
        InstanceAddress::new(addr.ip().to_string(), addr.port())
    }

    #[tokio::test]
    async fn test_health_sealed_503() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sys/health"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_json(serde_json::json!({"initialized": true, "sealed": true})),
            )
            .mount(&server)
            .await;

        let status = client().health(&address_of(&server)).await.unwrap();
        assert_eq!(
            status,
            InstanceStatus {
                sealed: true,
                initialized: true
            }
        );
    }

    #[tokio::test]
    async fn test_health_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/sys/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client().health(&address_of(&server)).await.unwrap_err();
        assert!(matches!(err, ProbeError::UnexpectedStatus(500)));
    }

    #[tokio::test]
    async fn test_health_unreachable() {
        // Nothing listens on port 1
        let addr = InstanceAddress::new("127.0.0.1", 1);
        let err = client().health(&addr).await.unwrap_err();
        assert!(matches!(err, ProbeError::Transport(_)));
    }

    #[tokio::test]
    async fn test_initialize_sends_fixed_policy() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/sys/init"))
            .and(body_json(serde_json::json!({"secret_shares": 5, "secret_threshold": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": ["k1", "k2", "k3", "k4", "k5"],
                "keys_base64": ["a1", "a2", "a3", "a4", "a5"],
                "root_token": "s.root"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client()
            .initialize(&address_of(&server), &InitRequest::default())
            .await
            .unwrap();

        assert_eq!(result.root_credential, "s.root");
        assert_eq!(result.key_shares.len(), 5);
        assert_eq!(result.total_shares, 5);
        assert_eq!(result.threshold, 3);
    }

    #[tokio::test]
    async fn test_initialize_rejects_non_200() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/sys/init"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let err = client()
            .initialize(&address_of(&server), &InitRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InitializationError::UnexpectedStatus(400)));
    }

    #[tokio::test]
    async fn test_unseal_progress_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sys/unseal"))
            .and(body_json(serde_json::json!({"key": "k1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"sealed": true, "t": 3, "n": 5, "progress": 1})),
            )
            .mount(&server)
            .await;

        let response = client().unseal(&address_of(&server), "k1").await.unwrap();
        assert!(response.sealed);
    }

    #[tokio::test]
    async fn test_unseal_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/sys/unseal"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client().unseal(&address_of(&server), "k1").await.unwrap_err();
        assert!(matches!(err, UnsealError::UnexpectedStatus(500)));
    }
}
