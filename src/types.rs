//! Error taxonomy for the unseal controller
//!
//! Every steady-state error is recovered at the tick boundary: the loop logs it
//! with the instance address and operation, then moves on. Only
//! [`ClientError`] is fatal, and only at process startup.

use thiserror::Error;

/// Health probe failed: transport error, unrecognized status code, or a body
/// that does not decode as a health response.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Health request failed: {0}")]
    Transport(String),

    #[error("Unexpected health status code: {0}")]
    UnexpectedStatus(u16),

    #[error("Failed to parse health response: {0}")]
    Decode(String),
}

/// Remote `sys/init` call failed.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Init request failed: {0}")]
    Transport(String),

    #[error("Vault initialization failed with status: {0}")]
    UnexpectedStatus(u16),

    #[error("Failed to parse init response: {0}")]
    Decode(String),
}

/// Key application failed; remaining keys of the sequence are not applied.
#[derive(Debug, Error)]
pub enum UnsealError {
    #[error("Unseal request failed: {0}")]
    Transport(String),

    #[error("Unseal request failed with status: {0}")]
    UnexpectedStatus(u16),

    #[error("Failed to parse unseal response: {0}")]
    Decode(String),

    #[error("Failed to apply key {index}: {source}")]
    KeyRejected {
        index: usize,
        #[source]
        source: Box<UnsealError>,
    },
}

/// Secret store operation failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Secret {0} already exists")]
    AlreadyExists(String),

    #[error("Secret {0} not found")]
    NotFound(String),

    #[error("Secret store request failed: {0}")]
    Request(String),

    #[error("Malformed secret {name}: {reason}")]
    Malformed { name: String, reason: String },
}

/// Key material could not be written or read.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to store {record}: {source}")]
    Store {
        record: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Refusing to overwrite existing {0}; another controller may already have initialized this fleet")]
    Conflict(&'static str),

    #[error("No unseal keys found in secret {0}")]
    NoKeys(&'static str),

    #[error("Failed to read unseal key file {path}: {reason}")]
    KeyFile { path: String, reason: String },
}

/// Instance enumeration failed.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to list Vault pods: {0}")]
    Request(String),

    #[error("No Vault pods found")]
    Empty,
}

/// A collaborator client could not be constructed.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Missing in-cluster configuration: {0}")]
    MissingConfig(String),

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Http(String),
}

/// Crate-level error for callers that don't care about the failure class.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Initialization(#[from] InitializationError),

    #[error(transparent)]
    Unseal(#[from] UnsealError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
