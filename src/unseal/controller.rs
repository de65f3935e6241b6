//! Reconciliation Loop
//!
//! Every tick: enumerate the fleet, probe each instance, elect at most one
//! uninitialized instance for initialization, unseal the sealed ones, sleep.
//! Nothing carries over between ticks; state is re-derived from the probes.
//!
//! Instances are handled one after another. A slow instance delays the ones
//! after it but cannot block the loop forever. Every failure path sleeps the
//! same fixed interval; there is no backoff.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::coordinator::{ElectionPolicy, InitCoordinator};
use super::executor::{KeySource, UnsealExecutor, UnsealOutcome};
use crate::fleet::Fleet;
use crate::types::DiscoveryError;
use crate::vault::InstanceAddress;

/// What the loop did with one instance during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceOutcome {
    /// Probe failed; skipped until the next tick.
    Unreachable,
    /// Initialized by this tick.
    Initialized { fully_persisted: bool, unsealed: bool },
    /// Elected but the remote init call failed.
    InitializationFailed,
    /// Uninitialized but not elected this tick.
    NotElected,
    /// Sealed; key shares were applied.
    Unsealed { source: KeySource, outcome: UnsealOutcome },
    /// Sealed; unsealing failed.
    UnsealFailed,
    /// Initialized and unsealed; nothing to do.
    Healthy,
}

/// Per-instance outcomes of one tick, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub instances: Vec<(InstanceAddress, InstanceOutcome)>,
}

impl TickReport {
    pub fn outcome(&self, addr: &InstanceAddress) -> Option<InstanceOutcome> {
        self.instances
            .iter()
            .find(|(a, _)| a == addr)
            .map(|(_, outcome)| *outcome)
    }

    pub fn initializations(&self) -> usize {
        self.instances
            .iter()
            .filter(|(_, o)| {
                matches!(
                    o,
                    InstanceOutcome::Initialized { .. } | InstanceOutcome::InitializationFailed
                )
            })
            .count()
    }
}

pub struct Controller {
    fleet: Fleet,
    coordinator: InitCoordinator,
    executor: Arc<UnsealExecutor>,
    election: ElectionPolicy,
    interval: Duration,
}

impl Controller {
    pub fn new(
        fleet: Fleet,
        coordinator: InitCoordinator,
        executor: Arc<UnsealExecutor>,
        election: ElectionPolicy,
        interval: Duration,
    ) -> Self {
        Self {
            fleet,
            coordinator,
            executor,
            election,
            interval,
        }
    }

    /// Run ticks forever. Only process termination stops the loop.
    pub async fn run(&self) {
        info!(
            namespace = %self.fleet.namespace(),
            interval_secs = self.interval.as_secs(),
            election = ?self.election,
            "Reconciliation loop started"
        );

        loop {
            match self.tick().await {
                Ok(report) => debug!(instances = report.instances.len(), "Tick complete"),
                Err(DiscoveryError::Empty) => warn!("No Vault pods found"),
                Err(e) => error!(error = %e, "Error getting Vault pods"),
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One reconciliation pass over the fleet.
    pub async fn tick(&self) -> Result<TickReport, DiscoveryError> {
        let addrs = self.fleet.addresses().await?;
        let probes = self.fleet.probe_all(&addrs).await;

        let statuses: Vec<_> = probes.iter().map(|p| p.as_ref().ok().copied()).collect();
        let elected = self.election.elect(&statuses);

        let mut report = TickReport::default();
        for (index, (addr, status)) in addrs.into_iter().zip(statuses).enumerate() {
            let outcome = match status {
                None => InstanceOutcome::Unreachable,
                Some(status) if !status.initialized => {
                    if elected == Some(index) {
                        self.initialize(&addr).await
                    } else {
                        debug!(addr = %addr, "Vault pod not initialized, waiting for election");
                        InstanceOutcome::NotElected
                    }
                }
                Some(status) if status.sealed => self.unseal(&addr).await,
                Some(_) => {
                    debug!(addr = %addr, "Vault pod is unsealed and healthy");
                    InstanceOutcome::Healthy
                }
            };
            report.instances.push((addr, outcome));
        }

        Ok(report)
    }

    async fn initialize(&self, addr: &InstanceAddress) -> InstanceOutcome {
        info!(addr = %addr, "Vault pod is not initialized, attempting initialization");
        match self.coordinator.initialize(addr).await {
            Ok(report) => InstanceOutcome::Initialized {
                fully_persisted: report.fully_persisted(),
                unsealed: matches!(report.unseal, Ok(o) if o.is_unsealed()),
            },
            Err(e) => {
                error!(addr = %addr, error = %e, "Error initializing Vault pod");
                InstanceOutcome::InitializationFailed
            }
        }
    }

    async fn unseal(&self, addr: &InstanceAddress) -> InstanceOutcome {
        info!(addr = %addr, "Vault pod is sealed, attempting to unseal");
        match self.executor.unseal(addr).await {
            Ok((source, outcome)) => InstanceOutcome::Unsealed { source, outcome },
            Err(e) => {
                error!(addr = %addr, error = %e, "Error unsealing Vault pod");
                InstanceOutcome::UnsealFailed
            }
        }
    }
}
