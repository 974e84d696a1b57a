//! In-process store backend.

use rand::{Rng, RngCore};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Key, KeyValueStore, StoreError};

/// A namespace held in memory. Keys iterate in ascending order, so a seeded
/// generator always draws the same `random_key`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Key, Vec<u8>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<Key, Vec<u8>>>, StoreError> {
        self.entries.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<Key, Vec<u8>>>, StoreError> {
        self.entries.write().map_err(|_| StoreError::Poisoned)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: Key) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.read()?.get(&key).cloned())
    }

    fn set(&self, key: Key, value: &[u8]) -> Result<(), StoreError> {
        self.write()?.insert(key, value.to_vec());
        Ok(())
    }

    fn exists(&self, key: Key) -> Result<bool, StoreError> {
        Ok(self.read()?.contains_key(&key))
    }

    fn delete(&self, key: Key) -> Result<(), StoreError> {
        self.write()?.remove(&key);
        Ok(())
    }

    fn random_key(&self, rng: &mut dyn RngCore) -> Result<Option<Key>, StoreError> {
        let entries = self.read()?;
        if entries.is_empty() {
            return Ok(None);
        }
        let offset = rng.gen_range(0..entries.len());
        Ok(entries.keys().nth(offset).copied())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.write()?.clear();
        Ok(())
    }

    fn set_many(&self, entries: &[(Key, Vec<u8>)]) -> Result<(), StoreError> {
        let mut map = self.write()?;
        for (key, value) in entries {
            map.insert(*key, value.clone());
        }
        Ok(())
    }
}
