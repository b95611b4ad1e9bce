//! Tessera Vault - Secure material, wallet key derivation and provisioning
//!
//! This crate provides:
//! - Encrypted per-slot secure storage (file and in-memory backends)
//! - PIN stretching and wallet unlock key derivation
//! - Device attestation key management
//! - The PIN provisioning coordinator
//! - Configuration for the `tessera` binary

pub mod attestation;
pub mod config;
pub mod derivation;
pub mod error;
pub mod provisioning;
pub mod store;
pub mod stretch;

pub use attestation::{
    AttestationKeyManager, AttestationObject, AttestationService, KeyId,
    SoftwareAttestationService, UnsupportedAttestationService,
};
pub use config::{PinSettings, VaultConfig};
pub use derivation::{DerivationParams, KeyDerivationPipeline, MaterialStatus, StoredPinVerifier};
pub use error::{Result, VaultError};
pub use provisioning::{
    AttemptPolicy, FailureReason, ProvisioningCoordinator, ProvisioningEvent, ProvisioningState,
    RetryDecision, UnlimitedRetries,
};
pub use store::{FileSecureStore, MemorySecureStore, SecretSlot, SecureMaterialStore, StoreError};
pub use stretch::{Argon2Stretch, KeyStretch, StretchParams};
