use std::path::PathBuf;

use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
pub type KeyResult<T> = std::result::Result<T, KeyError>;

/// Failures surfaced by the storage contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{key} not found")]
    NotFound { key: String },
    #[error("conflicting write for {key}")]
    Conflict { key: String },
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
    #[error("stored record failed integrity checks: {0}")]
    Integrity(String),
}

/// Failures surfaced by envelope seal/open operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("envelope authentication failed")]
    AuthenticationFailed,
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("encryption algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
    #[error("crypto failure: {0}")]
    Crypto(String),
}

/// Failures surfaced while loading or generating the master key.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("master key file {0} is missing and auto-generation is disabled")]
    Missing(PathBuf),
    #[error("master key file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to access master key file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
