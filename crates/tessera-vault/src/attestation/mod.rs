//! Device attestation key lifecycle
//!
//! A device-bound attestation key is created once through the platform
//! attestation service, its id persisted in the `attestationKeyId` slot, and
//! reused for every challenge. Attestation objects are computed fresh for
//! each challenge and never cached, so a captured object cannot be replayed
//! against a new challenge.

mod software;

pub use software::{SoftwareAttestationService, UnsupportedAttestationService};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, VaultError};
use crate::store::{SecretSlot, SecureMaterialStore, StoreError};

/// Handle to a device-bound attestation key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform-signed proof binding the device key to one challenge
#[derive(Clone, PartialEq, Eq)]
pub struct AttestationObject(Vec<u8>);

impl AttestationObject {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Standard base64 encoding for transport
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

impl fmt::Debug for AttestationObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttestationObject({} bytes)", self.0.len())
    }
}

/// Platform attestation primitive
#[async_trait]
pub trait AttestationService: Send + Sync {
    /// Whether the device can produce attestations at all
    async fn is_supported(&self) -> bool;

    /// Create a new device-bound key and return its handle
    async fn generate_key(&self) -> Result<KeyId>;

    /// Attest `key_id` over a 32-byte client data hash
    async fn attest(&self, key_id: &KeyId, client_data_hash: [u8; 32]) -> Result<Vec<u8>>;

    /// Backend name for logs and status output
    fn service_name(&self) -> &'static str;
}

/// Creates, persists and uses the device attestation key
pub struct AttestationKeyManager {
    store: Arc<dyn SecureMaterialStore>,
    service: Arc<dyn AttestationService>,
    /// Serializes first-time key creation
    create_lock: Mutex<()>,
}

impl AttestationKeyManager {
    pub fn new(store: Arc<dyn SecureMaterialStore>, service: Arc<dyn AttestationService>) -> Self {
        Self {
            store,
            service,
            create_lock: Mutex::new(()),
        }
    }

    /// Return the persisted key id, creating and persisting one if absent
    pub async fn get_or_create_key_id(&self) -> Result<KeyId> {
        let _guard = self.create_lock.lock().await;

        if let Some(key_id) = self.stored_key_id()? {
            return Ok(key_id);
        }

        if !self.service.is_supported().await {
            return Err(VaultError::FeatureUnsupported);
        }

        let key_id = self.service.generate_key().await?;
        self.store
            .write(SecretSlot::AttestationKeyId, key_id.as_str().as_bytes())?;
        info!(
            "Created attestation key {} via {}",
            key_id,
            self.service.service_name()
        );
        Ok(key_id)
    }

    /// Attest the device key over `challenge`
    pub async fn attest(&self, challenge: &[u8]) -> Result<AttestationObject> {
        let key_id = self.get_or_create_key_id().await?;
        let client_data_hash: [u8; 32] = Sha256::digest(challenge).into();

        let object = self.service.attest(&key_id, client_data_hash).await?;
        debug!("Produced attestation object of {} bytes", object.len());
        Ok(AttestationObject::new(object))
    }

    /// The persisted key id, if any
    pub fn stored_key_id(&self) -> Result<Option<KeyId>> {
        match self.store.read(SecretSlot::AttestationKeyId) {
            Ok(bytes) => {
                let id = String::from_utf8(bytes).map_err(|_| {
                    VaultError::StorageCorrupted("attestationKeyId is not UTF-8".to_string())
                })?;
                Ok(Some(KeyId::new(id)))
            }
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(VaultError::from_required_read(SecretSlot::AttestationKeyId, e)),
        }
    }

    /// Forget the attestation key id
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.create_lock.lock().await;
        self.store.remove(SecretSlot::AttestationKeyId)?;
        info!("Attestation key id removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySecureStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts key generations and echoes inputs back as the attestation
    struct CountingService {
        generated: AtomicUsize,
    }

    #[async_trait]
    impl AttestationService for CountingService {
        async fn is_supported(&self) -> bool {
            true
        }

        async fn generate_key(&self) -> Result<KeyId> {
            let n = self.generated.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(KeyId::new(format!("key-{n}")))
        }

        async fn attest(&self, key_id: &KeyId, client_data_hash: [u8; 32]) -> Result<Vec<u8>> {
            let mut out = key_id.as_str().as_bytes().to_vec();
            out.extend_from_slice(&client_data_hash);
            Ok(out)
        }

        fn service_name(&self) -> &'static str {
            "counting"
        }
    }

    fn manager() -> (Arc<CountingService>, AttestationKeyManager) {
        let service = Arc::new(CountingService {
            generated: AtomicUsize::new(0),
        });
        let manager =
            AttestationKeyManager::new(Arc::new(MemorySecureStore::new()), service.clone());
        (service, manager)
    }

    #[tokio::test]
    async fn test_key_created_once_and_reused() {
        let (service, manager) = manager();

        let first = manager.get_or_create_key_id().await.unwrap();
        let second = manager.get_or_create_key_id().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.generated.load(Ordering::SeqCst), 1);
        assert_eq!(manager.stored_key_id().unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_concurrent_first_use_creates_single_key() {
        let (service, manager) = manager();
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_or_create_key_id().await.unwrap() })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        assert_eq!(service.generated.load(Ordering::SeqCst), 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_attest_hashes_challenge() {
        let (_, manager) = manager();
        let object = manager.attest(b"challenge").await.unwrap();

        let expected_hash: [u8; 32] = Sha256::digest(b"challenge").into();
        assert!(object.as_bytes().ends_with(&expected_hash));
    }

    #[tokio::test]
    async fn test_distinct_challenges_distinct_objects() {
        let (_, manager) = manager();
        let a = manager.attest(b"challenge-a").await.unwrap();
        let b = manager.attest(b"challenge-b").await.unwrap();
        assert_ne!(a, b);
        assert_ne!(a.to_base64(), b.to_base64());
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let manager = AttestationKeyManager::new(
            Arc::new(MemorySecureStore::new()),
            Arc::new(UnsupportedAttestationService),
        );
        assert!(matches!(
            manager.attest(b"challenge").await,
            Err(VaultError::FeatureUnsupported)
        ));
        assert_eq!(manager.stored_key_id().unwrap(), None);
    }

    #[tokio::test]
    async fn test_reset_forces_new_key() {
        let (service, manager) = manager();
        let first = manager.get_or_create_key_id().await.unwrap();
        manager.reset().await.unwrap();
        let second = manager.get_or_create_key_id().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(service.generated.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reset_leaves_wallet_material() {
        let store = Arc::new(MemorySecureStore::new());
        for slot in SecretSlot::WALLET_MATERIAL {
            store.write(slot, b"material").unwrap();
        }
        let manager = AttestationKeyManager::new(
            store.clone(),
            Arc::new(CountingService {
                generated: AtomicUsize::new(0),
            }),
        );
        manager.get_or_create_key_id().await.unwrap();

        manager.reset().await.unwrap();
        manager.reset().await.unwrap();

        assert_eq!(manager.stored_key_id().unwrap(), None);
        for slot in SecretSlot::WALLET_MATERIAL {
            assert_eq!(store.read(slot).unwrap(), b"material");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reset_serializes_with_key_creation() {
        for _ in 0..32 {
            let (_, manager) = manager();
            let manager = Arc::new(manager);

            let creating = {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_or_create_key_id().await })
            };
            let resetting = {
                let manager = manager.clone();
                tokio::spawn(async move { manager.reset().await })
            };

            let created = creating.await.unwrap().unwrap();
            resetting.await.unwrap().unwrap();

            // Either the reset ran last and nothing is stored, or the
            // returned key is exactly the stored one
            match manager.stored_key_id().unwrap() {
                None => {}
                Some(stored) => assert_eq!(stored, created),
            }
            let next = manager.get_or_create_key_id().await.unwrap();
            assert_eq!(manager.stored_key_id().unwrap(), Some(next));
        }
    }

    #[test]
    fn test_attestation_object_debug_is_opaque() {
        let object = AttestationObject::new(vec![1, 2, 3]);
        assert_eq!(format!("{:?}", object), "AttestationObject(3 bytes)");
        assert_eq!(object.to_base64(), "AQID");
    }
}
