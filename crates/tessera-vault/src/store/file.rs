//! Encrypted file-backed secure store
//!
//! Each slot lives in its own file under the store directory:
//!
//! - 12-byte nonce
//! - ChaCha20-Poly1305 ciphertext of the slot value
//! - 16-byte authentication tag (appended by ChaCha20-Poly1305)
//!
//! The slot name is bound as associated data, so a file renamed onto
//! another slot fails to decrypt. The 32-byte device key is generated on
//! first use and kept in `device.key` next to the slots; without it the
//! slots are unreadable.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::{SecretSlot, SecureMaterialStore, StoreError, StoreResult};

/// Size of the nonce for ChaCha20-Poly1305
const NONCE_SIZE: usize = 12;

/// Size of the device key
const DEVICE_KEY_SIZE: usize = 32;

const DEVICE_KEY_FILE: &str = "device.key";

/// Secure store persisting each slot as an encrypted file
pub struct FileSecureStore {
    /// Directory holding the slot files and device key
    base_path: PathBuf,
    /// Device key (zeroized on drop)
    device_key: Zeroizing<[u8; DEVICE_KEY_SIZE]>,
}

impl FileSecureStore {
    /// Open the store at `base_path`, creating the directory and device key if needed
    pub fn open(base_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        let device_key = Self::load_or_create_device_key(&base_path)?;
        Ok(Self {
            base_path,
            device_key,
        })
    }

    /// Get the default store path
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tessera")
            .join("secure")
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn load_or_create_device_key(
        base_path: &Path,
    ) -> StoreResult<Zeroizing<[u8; DEVICE_KEY_SIZE]>> {
        let path = base_path.join(DEVICE_KEY_FILE);
        let mut key = Zeroizing::new([0u8; DEVICE_KEY_SIZE]);

        if path.exists() {
            let bytes = Zeroizing::new(fs::read(&path)?);
            if bytes.len() != DEVICE_KEY_SIZE {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "device key has unexpected length",
                )));
            }
            key.copy_from_slice(&bytes);
            return Ok(key);
        }

        rand::rngs::OsRng.fill_bytes(&mut key[..]);
        write_atomically(&path, &key[..])?;
        info!("Generated new device key at {:?}", path);
        Ok(key)
    }

    fn slot_path(&self, slot: SecretSlot) -> PathBuf {
        self.base_path.join(format!("{}.enc", slot.name()))
    }

    fn cipher(&self) -> StoreResult<ChaCha20Poly1305> {
        ChaCha20Poly1305::new_from_slice(&self.device_key[..]).map_err(|e| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid key: {}", e),
            ))
        })
    }
}

impl SecureMaterialStore for FileSecureStore {
    fn write(&self, slot: SecretSlot, value: &[u8]) -> StoreResult<()> {
        // Generate random nonce
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(
                nonce,
                Payload {
                    msg: value,
                    aad: slot.name().as_bytes(),
                },
            )
            .map_err(|_| StoreError::Corrupted {
                slot,
                reason: "encryption failed".to_string(),
            })?;

        // Combine nonce + ciphertext
        let mut encrypted = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        encrypted.extend_from_slice(&nonce_bytes);
        encrypted.extend_from_slice(&ciphertext);

        write_atomically(&self.slot_path(slot), &encrypted)?;
        debug!("Wrote secure slot {}", slot);
        Ok(())
    }

    fn read(&self, slot: SecretSlot) -> StoreResult<Vec<u8>> {
        let path = self.slot_path(slot);
        if !path.exists() {
            return Err(StoreError::NotFound(slot));
        }

        let encrypted = fs::read(&path)?;
        if encrypted.len() < NONCE_SIZE {
            return Err(StoreError::Corrupted {
                slot,
                reason: "encrypted file too short".to_string(),
            });
        }

        // Extract nonce and ciphertext
        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
        self.cipher()?
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: slot.name().as_bytes(),
                },
            )
            .map_err(|_| StoreError::Corrupted {
                slot,
                reason: "decryption failed".to_string(),
            })
    }

    fn remove(&self, slot: SecretSlot) -> StoreResult<()> {
        match fs::remove_file(self.slot_path(slot)) {
            Ok(()) => {
                debug!("Removed secure slot {}", slot);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write via a temp file created owner-only, then rename over `path`
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("tmp");

    // Left behind by an interrupted write
    match fs::remove_file(&temp_path) {
        Ok(()) => debug!("Removed stale temp file {:?}", temp_path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)
}
