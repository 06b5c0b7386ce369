//! In-memory key-value store for tests and embedding.

use crate::storage::kv::{Entries, KvStore, StoreError, WriteSet};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// `BTreeMap` behind a mutex. Writes are applied under one lock, so a
/// [`WriteSet`] is atomic with respect to readers.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        // a poisoned map is still consistent: writes never unwind half-way
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Overwrites a raw entry, bypassing any batch.
    ///
    /// Used to simulate external corruption of persisted state.
    pub fn put_raw(&self, key: Vec<u8>, value: Vec<u8>) {
        self.lock().insert(key, value);
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn write(&self, writes: WriteSet) -> Result<(), StoreError> {
        self.lock().extend(writes);
        Ok(())
    }

    fn scan(&self, prefix: &[u8]) -> Result<Entries, StoreError> {
        Ok(self
            .lock()
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
