//! Seal-state reconciliation
//!
//! - [`controller`]: the periodic tick over the whole fleet
//! - [`coordinator`]: first-time initialization of one instance
//! - [`executor`]: applying key shares to one sealed instance

pub mod controller;
pub mod coordinator;
pub mod executor;

pub use controller::{Controller, InstanceOutcome, TickReport};
pub use coordinator::{ElectionPolicy, InitCoordinator, InitReport};
pub use executor::{KeySource, UnsealAttemptError, UnsealExecutor, UnsealOutcome};
