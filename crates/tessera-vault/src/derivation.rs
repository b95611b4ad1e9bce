//! Wallet unlock key derivation
//!
//! Provisioning (`save`) writes four independent slots:
//!
//! 1. `preKey`     = stretch(pin)
//! 2. `walletSalt` = random
//! 3. `pinSalt`    = random
//! 4. `pinVerifier`= PBKDF2-HMAC-SHA256(pin, pinSalt)
//!
//! Slots 1-2 and 3-4 are written as two separate steps with no rollback.
//! A crash in between leaves the wallet half-provisioned; `material_status`
//! reports this as `Partial`, and nothing here attempts a repair.
//!
//! The unlock key is `base58(SHA256(PBKDF2-HMAC-SHA256(pin, walletSalt) || preKey))`
//! and is recomputed on every call.

use std::sync::Arc;

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tessera_core::{PinSecret, WalletUnlockKey};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};
use crate::store::{SecretSlot, SecureMaterialStore, StoreError};
use crate::stretch::KeyStretch;

/// PBKDF2 and salt parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationParams {
    /// PBKDF2-HMAC-SHA256 iteration count
    pub pbkdf2_iterations: u32,
    /// PBKDF2 output length in bytes
    pub key_length: usize,
    /// Length of freshly generated salts in bytes
    pub salt_length: usize,
}

impl Default for DerivationParams {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: 100_000,
            key_length: 32,
            salt_length: 32,
        }
    }
}

/// Salt and verifier written for an external PIN-correctness check
pub struct StoredPinVerifier {
    pub salt: Zeroizing<Vec<u8>>,
    pub verifier: Zeroizing<Vec<u8>>,
}

/// How much wallet material is currently persisted
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MaterialStatus {
    /// Nothing has been written
    Unprovisioned,
    /// Some slots are present, some missing (e.g. an interrupted save)
    Partial { missing: Vec<SecretSlot> },
    /// All wallet slots present
    Provisioned,
}

/// Turns a confirmed PIN into a wallet unlock key
pub struct KeyDerivationPipeline {
    store: Arc<dyn SecureMaterialStore>,
    stretch: Arc<dyn KeyStretch>,
    params: DerivationParams,
}

impl KeyDerivationPipeline {
    pub fn new(
        store: Arc<dyn SecureMaterialStore>,
        stretch: Arc<dyn KeyStretch>,
        params: DerivationParams,
    ) -> Self {
        Self {
            store,
            stretch,
            params,
        }
    }

    pub fn params(&self) -> &DerivationParams {
        &self.params
    }

    /// Provision secure material for `pin` and return its unlock key
    pub fn save(&self, pin: &PinSecret) -> Result<WalletUnlockKey> {
        info!("Provisioning wallet material");

        let pre_key = self.stretch.stretch(pin.as_bytes())?;
        if pre_key.is_empty() {
            return Err(VaultError::Crypto("Key stretching produced no output".to_string()));
        }

        let wallet_salt = self.random_salt();
        self.store.write(SecretSlot::PreKey, &pre_key)?;
        self.store.write(SecretSlot::WalletSalt, &wallet_salt)?;

        let pin_salt = self.random_salt();
        let pin_verifier = self.pbkdf2(pin, &pin_salt);
        self.store.write(SecretSlot::PinSalt, &pin_salt)?;
        self.store.write(SecretSlot::PinVerifier, &pin_verifier)?;

        debug!("Wallet material written");
        self.get_wallet_key(pin)
    }

    /// Recompute the unlock key for `pin` from stored material
    pub fn get_wallet_key(&self, pin: &PinSecret) -> Result<WalletUnlockKey> {
        let (pre_key, wallet_salt) = self.read_wallet_material()?;
        Ok(self.derive_wallet_key(pin, &pre_key, &wallet_salt))
    }

    /// Read-only accessor for an external PIN-correctness check
    pub fn get_stored_password(&self) -> Result<StoredPinVerifier> {
        let salt = self.read_pin_slot(SecretSlot::PinSalt)?;
        let verifier = self.read_pin_slot(SecretSlot::PinVerifier)?;
        Ok(StoredPinVerifier { salt, verifier })
    }

    /// Inspect which wallet slots are present
    pub fn material_status(&self) -> Result<MaterialStatus> {
        let mut missing = Vec::new();
        for slot in SecretSlot::WALLET_MATERIAL {
            if !self.store.contains(slot)? {
                missing.push(slot);
            }
        }

        Ok(match missing.len() {
            0 => MaterialStatus::Provisioned,
            n if n == SecretSlot::WALLET_MATERIAL.len() => MaterialStatus::Unprovisioned,
            _ => {
                warn!("Wallet material is partially provisioned: {:?}", missing);
                MaterialStatus::Partial { missing }
            }
        })
    }

    fn read_wallet_material(&self) -> Result<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>)> {
        let pre_key = self.store.read(SecretSlot::PreKey);
        let wallet_salt = self.store.read(SecretSlot::WalletSalt);

        match (pre_key, wallet_salt) {
            (Ok(pre_key), Ok(wallet_salt)) => {
                if pre_key.is_empty() || wallet_salt.is_empty() {
                    return Err(VaultError::StorageCorrupted(
                        "wallet material is empty".to_string(),
                    ));
                }
                Ok((Zeroizing::new(pre_key), Zeroizing::new(wallet_salt)))
            }
            (Err(StoreError::NotFound(_)), Err(StoreError::NotFound(_))) => {
                Err(VaultError::NotProvisioned)
            }
            (Err(e), _) => Err(VaultError::from_required_read(SecretSlot::PreKey, e)),
            (_, Err(e)) => Err(VaultError::from_required_read(SecretSlot::WalletSalt, e)),
        }
    }

    fn read_pin_slot(&self, slot: SecretSlot) -> Result<Zeroizing<Vec<u8>>> {
        match self.store.read(slot) {
            Ok(value) => Ok(Zeroizing::new(value)),
            Err(StoreError::NotFound(_)) if !self.store.contains(SecretSlot::PreKey)? => {
                Err(VaultError::NotProvisioned)
            }
            Err(e) => Err(VaultError::from_required_read(slot, e)),
        }
    }

    fn derive_wallet_key(
        &self,
        pin: &PinSecret,
        pre_key: &[u8],
        wallet_salt: &[u8],
    ) -> WalletUnlockKey {
        let derivat = self.pbkdf2(pin, wallet_salt);

        let mut hasher = Sha256::new();
        hasher.update(derivat.as_slice());
        hasher.update(pre_key);
        let digest = hasher.finalize();

        WalletUnlockKey::new(bs58::encode(digest).into_string())
    }

    fn pbkdf2(&self, pin: &PinSecret, salt: &[u8]) -> Zeroizing<Vec<u8>> {
        let mut output = Zeroizing::new(vec![0u8; self.params.key_length]);
        pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt, self.params.pbkdf2_iterations, &mut output);
        output
    }

    fn random_salt(&self) -> Zeroizing<Vec<u8>> {
        let mut salt = Zeroizing::new(vec![0u8; self.params.salt_length]);
        rand::rngs::OsRng.fill_bytes(&mut salt);
        salt
    }
}
