//! Error types for the Tessera vault

use thiserror::Error;

use crate::store::{SecretSlot, StoreError};

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors that can occur in vault operations
#[derive(Debug, Error)]
pub enum VaultError {
    /// No secure material has ever been written
    #[error("Wallet not provisioned - set up a PIN first")]
    NotProvisioned,

    /// Some material is present but unusable
    #[error("Secure material corrupted: {0}")]
    StorageCorrupted(String),

    /// Secure store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Key stretching, hashing or encoding failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Platform attestation is not available on this device
    #[error("Attestation is not supported on this device")]
    FeatureUnsupported,

    /// Platform attestation service failure
    #[error("Attestation error: {0}")]
    Attestation(String),

    /// Provisioning is deriving keys and cannot accept input
    #[error("Provisioning is busy")]
    Busy,

    /// Provisioning action not valid in the current state
    #[error("Cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: String },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// Map a failed read of a required slot
    pub(crate) fn from_required_read(slot: SecretSlot, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => {
                VaultError::StorageCorrupted(format!("{} is missing", slot.name()))
            }
            StoreError::Corrupted { reason, .. } => {
                VaultError::StorageCorrupted(format!("{} is unreadable: {}", slot.name(), reason))
            }
            other => VaultError::Storage(other),
        }
    }
}
