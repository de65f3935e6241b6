//! Health check endpoints
//!
//! - /health, /healthz - Liveness probe, 200 while the process is up
//! - /ready, /readyz - Readiness probe, re-probes the fleet on every request
//!
//! Readiness holds no cached state. Each request enumerates the instances
//! and probes them, so it reflects the fleet at request time even while a
//! reconciliation tick is in progress.
//!
//! An empty pod list is not ready. Zero instances would pass every per-instance
//! check vacuously, but with no instances there is nothing serving, and the
//! reconciliation loop treats the same condition as a failed tick.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tracing::debug;

use crate::fleet::Fleet;
use crate::vault::InstanceStatus;

/// What an instance must satisfy for the controller to report ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReadinessMode {
    /// Every instance is initialized and unsealed.
    #[default]
    Unsealed,
    /// Every instance answers its health probe.
    Reachable,
}

impl ReadinessMode {
    fn accepts(&self, status: &Option<InstanceStatus>) -> bool {
        match (self, status) {
            (_, None) => false,
            (Self::Reachable, Some(_)) => true,
            (Self::Unsealed, Some(s)) => s.is_ready(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InstanceReadiness {
    pub address: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sealed: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub mode: &'static str,
    pub instances: Vec<InstanceReadiness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Evaluates fleet readiness on demand.
#[derive(Clone)]
pub struct ReadinessReporter {
    fleet: Fleet,
    mode: ReadinessMode,
}

impl ReadinessReporter {
    pub fn new(fleet: Fleet, mode: ReadinessMode) -> Self {
        Self { fleet, mode }
    }

    pub async fn check(&self) -> ReadinessResponse {
        let mode = match self.mode {
            ReadinessMode::Unsealed => "unsealed",
            ReadinessMode::Reachable => "reachable",
        };

        let addrs = match self.fleet.addresses().await {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!(error = %e, "Readiness check could not enumerate instances");
                return ReadinessResponse {
                    ready: false,
                    mode,
                    instances: Vec::new(),
                    error: Some(e.to_string()),
                };
            }
        };

        let statuses: Vec<Option<InstanceStatus>> = self
            .fleet
            .probe_all(&addrs)
            .await
            .into_iter()
            .map(Result::ok)
            .collect();

        let ready = statuses.iter().all(|s| self.mode.accepts(s));
        let instances = addrs
            .iter()
            .zip(&statuses)
            .map(|(addr, status)| InstanceReadiness {
                address: addr.to_string(),
                reachable: status.is_some(),
                initialized: status.map(|s| s.initialized),
                sealed: status.map(|s| s.sealed),
            })
            .collect();

        ReadinessResponse {
            ready,
            mode,
            instances,
            error: None,
        }
    }
}

/// Create the probe router
pub fn create_router(reporter: ReadinessReporter) -> Router {
    Router::new()
        .route("/health", get(liveness))
        .route("/healthz", get(liveness))
        .route("/ready", get(readiness))
        .route("/readyz", get(readiness))
        .with_state(reporter)
}

async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness(State(reporter): State<ReadinessReporter>) -> impl IntoResponse {
    let response = reporter.check().await;
    let status = if response.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube::StaticDiscovery;
    use crate::vault::{InstanceAddress, MockVault};
    use std::sync::Arc;

    fn addr(host: &str) -> InstanceAddress {
        InstanceAddress::new(host, 8200)
    }

    fn reporter(vault: MockVault, hosts: &[&str], mode: ReadinessMode) -> (ReadinessReporter, Arc<StaticDiscovery>) {
        let discovery = Arc::new(StaticDiscovery::new(hosts.iter().copied()));
        let fleet = Fleet::new(discovery.clone(), Arc::new(vault), "vault", "sel", 8200);
        (ReadinessReporter::new(fleet, mode), discovery)
    }

    #[tokio::test]
    async fn test_liveness_always_ok() {
        let response = liveness().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_when_all_unsealed() {
        let vault = MockVault::new()
            .with_unsealed(&addr("10.0.0.1"), &["a"], 1)
            .with_unsealed(&addr("10.0.0.2"), &["a"], 1);
        let (reporter, _) = reporter(vault, &["10.0.0.1", "10.0.0.2"], ReadinessMode::Unsealed);

        let response = reporter.check().await;
        assert!(response.ready);
        assert_eq!(response.instances.len(), 2);

        let http = readiness(State(reporter)).await.into_response();
        assert_eq!(http.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_not_ready_when_any_sealed() {
        let vault = MockVault::new()
            .with_unsealed(&addr("10.0.0.1"), &["a"], 1)
            .with_sealed(&addr("10.0.0.2"), &["a"], 1);
        let (reporter, _) = reporter(vault, &["10.0.0.1", "10.0.0.2"], ReadinessMode::Unsealed);

        let response = reporter.check().await;
        assert!(!response.ready);
        assert_eq!(response.instances[1].sealed, Some(true));

        let http = readiness(State(reporter)).await.into_response();
        assert_eq!(http.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_reachable_mode_ignores_seal_state() {
        let vault = MockVault::new()
            .with_sealed(&addr("10.0.0.1"), &["a"], 1)
            .with_uninitialized(&addr("10.0.0.2"));
        let (reporter, _) = reporter(vault, &["10.0.0.1", "10.0.0.2"], ReadinessMode::Reachable);

        assert!(reporter.check().await.ready);
    }

    #[tokio::test]
    async fn test_unreachable_instance_not_ready() {
        let vault = MockVault::new()
            .with_unsealed(&addr("10.0.0.1"), &["a"], 1)
            .fail_health(&addr("10.0.0.2"));
        let (reporter, _) = reporter(vault, &["10.0.0.1", "10.0.0.2"], ReadinessMode::Reachable);

        let response = reporter.check().await;
        assert!(!response.ready);
        assert!(!response.instances[1].reachable);
        assert_eq!(response.instances[1].sealed, None);
    }

    #[tokio::test]
    async fn test_empty_fleet_not_ready() {
        let (reporter, _) = reporter(MockVault::new(), &[], ReadinessMode::Unsealed);

        let response = reporter.check().await;
        assert!(!response.ready);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn test_discovery_failure_not_ready() {
        let vault = MockVault::new().with_unsealed(&addr("10.0.0.1"), &["a"], 1);
        let (reporter, discovery) = reporter(vault, &["10.0.0.1"], ReadinessMode::Unsealed);
        discovery.set_failing(true);

        assert!(!reporter.check().await.ready);
    }
}
