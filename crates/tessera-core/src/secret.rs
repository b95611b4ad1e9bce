//! Zeroizing wrappers for secret values
//!
//! Neither type prints its contents through `Debug`, and both wipe their
//! backing memory on drop.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Clear-text PIN produced by a committed capture session
#[derive(Clone)]
pub struct PinSecret(Zeroizing<String>);

impl PinSecret {
    /// Wrap a clear-text PIN
    pub fn new(pin: String) -> Self {
        Self(Zeroizing::new(pin))
    }

    /// Borrow the clear-text PIN
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Borrow the PIN as UTF-8 bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Number of characters in the PIN
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for PinSecret {
    fn from(pin: &str) -> Self {
        Self::new(pin.to_string())
    }
}

impl PartialEq for PinSecret {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes().ct_eq(other.as_bytes()).into()
    }
}

impl Eq for PinSecret {}

impl fmt::Debug for PinSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PinSecret([REDACTED])")
    }
}

/// Base58-encoded key that unlocks the local credential store.
///
/// Recomputed on demand from the PIN and stored material; never persisted.
#[derive(Clone)]
pub struct WalletUnlockKey(Zeroizing<String>);

impl WalletUnlockKey {
    pub fn new(encoded: String) -> Self {
        Self(Zeroizing::new(encoded))
    }

    /// Borrow the encoded key for handing to the credential store
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl PartialEq for WalletUnlockKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl Eq for WalletUnlockKey {}

impl fmt::Debug for WalletUnlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletUnlockKey([REDACTED])")
    }
}
