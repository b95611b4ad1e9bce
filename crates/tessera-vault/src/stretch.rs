//! PIN stretching into the wallet pre-key
//!
//! The pre-key is deterministic in the PIN and deliberately expensive to
//! compute. Implementations must not use per-call randomness: the same PIN
//! always stretches to the same bytes.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

/// Fixed domain-separation salt for pre-key stretching
const PRE_KEY_DOMAIN: &[u8] = b"tessera/pre-key/v1";

/// Deterministic, expensive PIN stretching
pub trait KeyStretch: Send + Sync {
    fn stretch(&self, pin: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// Argon2id cost parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StretchParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
    /// Output length in bytes
    pub output_len: usize,
}

impl Default for StretchParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
            output_len: 32,
        }
    }
}

impl StretchParams {
    /// Cheap parameters for tests
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST.max(64),
            iterations: 1,
            parallelism: 1,
            output_len: 32,
        }
    }
}

/// Argon2id with a fixed salt
pub struct Argon2Stretch {
    params: StretchParams,
}

impl Argon2Stretch {
    pub fn new(params: StretchParams) -> Result<Self> {
        // Reject bad parameters up front rather than on first use
        Self::argon2(&params)?;
        Ok(Self { params })
    }

    fn argon2(params: &StretchParams) -> Result<Argon2<'static>> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(params.output_len),
        )
        .map_err(|e| VaultError::Config(format!("Invalid stretch parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Stretch {
    fn default() -> Self {
        Self {
            params: StretchParams::default(),
        }
    }
}

impl KeyStretch for Argon2Stretch {
    fn stretch(&self, pin: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let mut output = Zeroizing::new(vec![0u8; self.params.output_len]);
        Self::argon2(&self.params)?
            .hash_password_into(pin, PRE_KEY_DOMAIN, &mut output)
            .map_err(|e| VaultError::Crypto(format!("Key stretching failed: {}", e)))?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Argon2Stretch {
        Argon2Stretch::new(StretchParams::insecure_fast()).unwrap()
    }

    #[test]
    fn test_stretch_is_deterministic() {
        let stretch = fast();
        let a = stretch.stretch(b"123456").unwrap();
        let b = stretch.stretch(b"123456").unwrap();
        assert_eq!(*a, *b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_stretch_depends_on_pin() {
        let stretch = fast();
        assert_ne!(*stretch.stretch(b"123456").unwrap(), *stretch.stretch(b"123457").unwrap());
    }

    #[test]
    fn test_stretch_depends_on_params() {
        let mut params = StretchParams::insecure_fast();
        let a = Argon2Stretch::new(params.clone()).unwrap().stretch(b"1").unwrap();
        params.iterations = 2;
        let b = Argon2Stretch::new(params).unwrap().stretch(b"1").unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = StretchParams {
            parallelism: 0,
            ..StretchParams::insecure_fast()
        };
        assert!(matches!(Argon2Stretch::new(params), Err(VaultError::Config(_))));
    }
}
