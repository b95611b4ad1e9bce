//! Scoped, encrypted key/value persistence for secure material
//!
//! Every logical key is an independent slot. A write replaces one slot
//! atomically; there is no transaction spanning several slots, so callers
//! that write more than one slot must tolerate a crash in between.
//!
//! Storage is bound to the device and installation. Losing it (reinstall,
//! device transfer) means the wallet must be provisioned again.

mod file;
mod memory;

pub use file::FileSecureStore;
pub(crate) use file::write_atomically;
pub use memory::MemorySecureStore;

use std::fmt;

use thiserror::Error;

/// Logical keys for persisted secure material
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecretSlot {
    PreKey,
    WalletSalt,
    PinSalt,
    PinVerifier,
    AttestationKeyId,
}

impl SecretSlot {
    /// Every slot, in provisioning order
    pub const ALL: [SecretSlot; 5] = [
        SecretSlot::PreKey,
        SecretSlot::WalletSalt,
        SecretSlot::PinSalt,
        SecretSlot::PinVerifier,
        SecretSlot::AttestationKeyId,
    ];

    /// Slots written by wallet provisioning
    pub const WALLET_MATERIAL: [SecretSlot; 4] = [
        SecretSlot::PreKey,
        SecretSlot::WalletSalt,
        SecretSlot::PinSalt,
        SecretSlot::PinVerifier,
    ];

    /// Stable storage name
    pub fn name(&self) -> &'static str {
        match self {
            SecretSlot::PreKey => "preKey",
            SecretSlot::WalletSalt => "walletSalt",
            SecretSlot::PinSalt => "pinSalt",
            SecretSlot::PinVerifier => "pinVerifier",
            SecretSlot::AttestationKeyId => "attestationKeyId",
        }
    }
}

impl fmt::Display for SecretSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Secure store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Secret not found: {0}")]
    NotFound(SecretSlot),

    #[error("Secret {slot} is corrupted: {reason}")]
    Corrupted { slot: SecretSlot, reason: String },

    #[error("Secure store IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Device-and-app scoped secret persistence
pub trait SecureMaterialStore: Send + Sync {
    /// Overwrite one slot
    fn write(&self, slot: SecretSlot, value: &[u8]) -> StoreResult<()>;

    /// Read one slot; `NotFound` if it was never written or was removed
    fn read(&self, slot: SecretSlot) -> StoreResult<Vec<u8>>;

    /// Remove one slot; removing an absent slot succeeds
    fn remove(&self, slot: SecretSlot) -> StoreResult<()>;

    /// Check whether a slot currently holds a value
    fn contains(&self, slot: SecretSlot) -> StoreResult<bool> {
        match self.read(slot) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
