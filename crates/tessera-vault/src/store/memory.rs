//! In-memory secure store
//!
//! Nothing is persisted. Intended for tests and for ephemeral sessions
//! where the platform store is unavailable.

use std::collections::HashMap;
use std::sync::RwLock;

use zeroize::Zeroizing;

use super::{SecretSlot, SecureMaterialStore, StoreError, StoreResult};

#[derive(Default)]
pub struct MemorySecureStore {
    slots: RwLock<HashMap<SecretSlot, Zeroizing<Vec<u8>>>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecureMaterialStore for MemorySecureStore {
    fn write(&self, slot: SecretSlot, value: &[u8]) -> StoreResult<()> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots.insert(slot, Zeroizing::new(value.to_vec()));
        Ok(())
    }

    fn read(&self, slot: SecretSlot) -> StoreResult<Vec<u8>> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots
            .get(&slot)
            .map(|value| value.to_vec())
            .ok_or(StoreError::NotFound(slot))
    }

    fn remove(&self, slot: SecretSlot) -> StoreResult<()> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots.remove(&slot);
        Ok(())
    }
}
