//! Attestation backends without platform hardware
//!
//! `SoftwareAttestationService` derives one P-256 key per key id from a
//! local 32-byte seed and signs `key_id || client_data_hash`. It offers no
//! hardware guarantees and exists for desktops, CI and tests.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use zeroize::Zeroizing;

use super::{AttestationService, KeyId};
use crate::error::{Result, VaultError};
use crate::store::write_atomically;

const SEED_SIZE: usize = 32;

/// Domain separator for per-key signing key derivation
const KEY_DOMAIN: &[u8] = b"tessera/attestation-key/v1";

/// Serialized attestation object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareAttestation {
    pub key_id: String,
    /// SEC1 compressed public key, hex
    pub public_key: String,
    /// SHA-256 of the challenge, hex
    pub client_data_hash: String,
    /// DER ECDSA signature over `key_id || client_data_hash`, hex
    pub signature: String,
}

/// Seed-backed P-256 attestation
pub struct SoftwareAttestationService {
    seed: Zeroizing<[u8; SEED_SIZE]>,
}

impl SoftwareAttestationService {
    pub fn from_seed(seed: [u8; SEED_SIZE]) -> Self {
        Self {
            seed: Zeroizing::new(seed),
        }
    }

    /// Load the seed from `path`, generating it on first use
    pub fn load_or_create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut seed = Zeroizing::new([0u8; SEED_SIZE]);

        if path.exists() {
            let bytes = Zeroizing::new(fs::read(&path)?);
            if bytes.len() != SEED_SIZE {
                return Err(VaultError::StorageCorrupted(format!(
                    "attestation seed at {:?} has length {}",
                    path,
                    bytes.len()
                )));
            }
            seed.copy_from_slice(&bytes);
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            rand::rngs::OsRng.fill_bytes(&mut seed[..]);
            write_atomically(&path, &seed[..])?;
            info!("Generated attestation seed at {:?}", path);
        }

        Ok(Self { seed })
    }

    fn signing_key(&self, key_id: &KeyId) -> Result<SigningKey> {
        let mut hasher = Sha256::new();
        hasher.update(KEY_DOMAIN);
        hasher.update(&self.seed[..]);
        hasher.update(key_id.as_str().as_bytes());
        let scalar: Zeroizing<[u8; 32]> = Zeroizing::new(hasher.finalize().into());

        SigningKey::from_slice(&scalar[..])
            .map_err(|e| VaultError::Attestation(format!("Invalid derived key: {}", e)))
    }

    /// Check a serialized attestation against an expected client data hash
    pub fn verify(object: &[u8], client_data_hash: &[u8; 32]) -> Result<SoftwareAttestation> {
        let attestation: SoftwareAttestation = serde_json::from_slice(object)?;

        if attestation.client_data_hash != hex::encode(client_data_hash) {
            return Err(VaultError::Attestation(
                "client data hash does not match".to_string(),
            ));
        }

        let decode = |field: &str, value: &str| {
            hex::decode(value)
                .map_err(|e| VaultError::Attestation(format!("Invalid {} encoding: {}", field, e)))
        };
        let public_key = decode("public key", &attestation.public_key)?;
        let signature = decode("signature", &attestation.signature)?;

        let verifying_key = VerifyingKey::from_sec1_bytes(&public_key)
            .map_err(|e| VaultError::Attestation(format!("Invalid public key: {}", e)))?;
        let signature = Signature::from_der(&signature)
            .map_err(|e| VaultError::Attestation(format!("Invalid signature: {}", e)))?;

        verifying_key
            .verify(
                &signed_message(attestation.key_id.as_bytes(), client_data_hash),
                &signature,
            )
            .map_err(|_| VaultError::Attestation("signature verification failed".to_string()))?;

        Ok(attestation)
    }
}

#[async_trait]
impl AttestationService for SoftwareAttestationService {
    async fn is_supported(&self) -> bool {
        true
    }

    async fn generate_key(&self) -> Result<KeyId> {
        let key_id = KeyId::new(uuid::Uuid::new_v4().to_string());
        // Fail now rather than on the first attestation
        self.signing_key(&key_id)?;
        Ok(key_id)
    }

    async fn attest(&self, key_id: &KeyId, client_data_hash: [u8; 32]) -> Result<Vec<u8>> {
        let signing_key = self.signing_key(key_id)?;
        let message = signed_message(key_id.as_str().as_bytes(), &client_data_hash);
        let signature: Signature = signing_key.sign(&message);

        let attestation = SoftwareAttestation {
            key_id: key_id.to_string(),
            public_key: hex::encode(
                signing_key.verifying_key().to_encoded_point(true).as_bytes(),
            ),
            client_data_hash: hex::encode(client_data_hash),
            signature: hex::encode(signature.to_der().as_bytes()),
        };
        Ok(serde_json::to_vec(&attestation)?)
    }

    fn service_name(&self) -> &'static str {
        "software"
    }
}

/// Backend for platforms with no attestation support
pub struct UnsupportedAttestationService;

#[async_trait]
impl AttestationService for UnsupportedAttestationService {
    async fn is_supported(&self) -> bool {
        false
    }

    async fn generate_key(&self) -> Result<KeyId> {
        Err(VaultError::FeatureUnsupported)
    }

    async fn attest(&self, _key_id: &KeyId, _client_data_hash: [u8; 32]) -> Result<Vec<u8>> {
        Err(VaultError::FeatureUnsupported)
    }

    fn service_name(&self) -> &'static str {
        "unsupported"
    }
}

fn signed_message(key_id: &[u8], client_data_hash: &[u8; 32]) -> Vec<u8> {
    let mut message = Vec::with_capacity(key_id.len() + client_data_hash.len());
    message.extend_from_slice(key_id);
    message.extend_from_slice(client_data_hash);
    message
}
