//! Vault configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tessera_core::PinPolicy;
use tracing::info;

use crate::derivation::DerivationParams;
use crate::error::{Result, VaultError};
use crate::stretch::StretchParams;

/// Shortest salt `validate` accepts
const MIN_SALT_LENGTH: usize = 16;

/// PIN entry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinSettings {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,

    /// Reject repeated and sequential digit runs
    pub reject_trivial: bool,

    /// Attempt bound handed to the attempt policy (no lockout by default)
    pub max_attempts: Option<u32>,

    /// Show entered digits instead of masking them
    pub reveal_digits: bool,

    /// Draw slots between the minimum and maximum length
    pub show_optional_slots: bool,
}

impl Default for PinSettings {
    fn default() -> Self {
        let policy = PinPolicy::default();
        Self {
            min_length: policy.min_length,
            max_length: policy.max_length,
            reject_trivial: policy.reject_trivial,
            max_attempts: None,
            reveal_digits: false,
            show_optional_slots: false,
        }
    }
}

impl PinSettings {
    pub fn policy(&self) -> PinPolicy {
        PinPolicy {
            min_length: self.min_length,
            max_length: self.max_length,
            reject_trivial: self.reject_trivial,
        }
    }
}

/// Vault configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory holding the secure store and attestation seed
    pub data_dir: PathBuf,

    /// PBKDF2-HMAC-SHA256 iteration count
    pub pbkdf2_iterations: u32,

    /// PBKDF2 output length in bytes
    pub key_length: usize,

    /// Random salt length in bytes
    pub salt_length: usize,

    pub pin: PinSettings,

    /// Argon2id cost for pre-key stretching
    pub stretch: StretchParams,
}

impl Default for VaultConfig {
    fn default() -> Self {
        let derivation = DerivationParams::default();
        Self {
            data_dir: Self::default_data_dir(),
            pbkdf2_iterations: derivation.pbkdf2_iterations,
            key_length: derivation.key_length,
            salt_length: derivation.salt_length,
            pin: PinSettings::default(),
            stretch: StretchParams::default(),
        }
    }
}

impl VaultConfig {
    fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tessera")
    }

    /// Config file location: `TESSERA_CONFIG`, else the platform config dir
    pub fn default_path() -> PathBuf {
        std::env::var_os("TESSERA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("tessera")
                    .join("config.json")
            })
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `path` if it exists, otherwise write and return the defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let config = Self::default();
        config.save(path)?;
        info!("Created default config at {:?}", path);
        Ok(config)
    }

    /// Create directories if they don't exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(self.store_path())?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pbkdf2_iterations == 0 {
            return Err(VaultError::Config("pbkdf2_iterations must be non-zero".to_string()));
        }
        if self.key_length == 0 {
            return Err(VaultError::Config("key_length must be non-zero".to_string()));
        }
        if self.salt_length < MIN_SALT_LENGTH {
            return Err(VaultError::Config(format!(
                "salt_length must be at least {} bytes",
                MIN_SALT_LENGTH
            )));
        }
        if let (Some(min), Some(max)) = (self.pin.min_length, self.pin.max_length) {
            if min > max {
                return Err(VaultError::Config(format!(
                    "pin.min_length ({}) exceeds pin.max_length ({})",
                    min, max
                )));
            }
        }
        Ok(())
    }

    /// Directory of the encrypted secure store
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("secure")
    }

    /// Seed file of the software attestation backend
    pub fn attestation_seed_path(&self) -> PathBuf {
        self.data_dir.join("attestation.seed")
    }

    pub fn derivation_params(&self) -> DerivationParams {
        DerivationParams {
            pbkdf2_iterations: self.pbkdf2_iterations,
            key_length: self.key_length,
            salt_length: self.salt_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.pbkdf2_iterations, 100_000);
        assert_eq!(config.key_length, 32);
        assert_eq!(config.salt_length, 32);
        assert_eq!(config.pin.policy(), PinPolicy::exact(6));
        assert_eq!(config.pin.max_attempts, None);
        assert!(!config.pin.reveal_digits);
        config.validate().unwrap();
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = VaultConfig::default();
        config.data_dir = dir.path().join("data");
        config.pin.max_attempts = Some(3);
        config.save(&path).unwrap();

        assert_eq!(VaultConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_or_default_writes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = VaultConfig::load_or_default(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, VaultConfig::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"pbkdf2_iterations": 5000, "pin": {"max_length": 8}}"#).unwrap();

        let config = VaultConfig::load(&path).unwrap();
        assert_eq!(config.pbkdf2_iterations, 5000);
        assert_eq!(config.pin.min_length, Some(6));
        assert_eq!(config.pin.max_length, Some(8));
        assert_eq!(config.salt_length, 32);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases: Vec<Box<dyn Fn(&mut VaultConfig)>> = vec![
            Box::new(|c| c.pbkdf2_iterations = 0),
            Box::new(|c| c.key_length = 0),
            Box::new(|c| c.salt_length = 8),
            Box::new(|c| {
                c.pin.min_length = Some(8);
                c.pin.max_length = Some(4);
            }),
        ];

        for mutate in cases {
            let mut config = VaultConfig::default();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(VaultError::Config(_))));
        }
    }

    #[test]
    fn test_invalid_file_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"salt_length": 4}"#).unwrap();
        assert!(matches!(VaultConfig::load(&path), Err(VaultError::Config(_))));
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempdir().unwrap();
        let config = VaultConfig {
            data_dir: dir.path().join("vault"),
            ..Default::default()
        };
        config.ensure_directories().unwrap();
        assert!(config.store_path().is_dir());
    }
}
