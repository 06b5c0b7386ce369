//! Key-value collaborator: the store trait, table namespaces and staged batches.
//!
//! Every write goes through a [`Batch`]. A batch reads through its own pending
//! writes before falling back to the store, so the trie and the ledger run
//! unchanged against staged state. Nothing becomes visible until
//! [`Batch::commit`] hands the whole write set to the store in one call.

use ledger_derive::Error;
use std::collections::BTreeMap;

/// Errors raised by key-value backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend failed to read or write.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// Stored bytes could not be interpreted.
    #[error("corrupted record under {0}")]
    Corrupted(String),
}

/// Key namespaces. The discriminant is the first byte of every stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Table {
    Blocks = 0x01,
    Txs = 0x02,
    ChainTrie = 0x03,
    StateTrie = 0x04,
    Meta = 0x05,
    TxIndex = 0x10,
    /// `(asset, tx uid, value index, address)` → balance
    AssetHistory = 0x11,
    /// `(asset, address, tx uid, value index)` → balance
    AddressHistory = 0x12,
    /// `(asset, address, tag, tx uid, value index)` → balance
    TagHistory = 0x13,
    Users = 0x14,
    /// `(asset, source id, tx uid)` → tx uid
    Sources = 0x15,
    Nicks = 0x16,
}

impl Table {
    /// Full store key for `key` inside this table.
    pub fn key(self, key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + key.len());
        out.push(self as u8);
        out.extend_from_slice(key);
        out
    }
}

/// Pending writes, ordered by key so every backend applies them identically.
pub type WriteSet = BTreeMap<Vec<u8>, Vec<u8>>;

/// Key/value pairs in ascending key order.
pub type Entries = Vec<(Vec<u8>, Vec<u8>)>;

/// Persistent byte-keyed storage.
///
/// Implementations must apply a [`WriteSet`] atomically: either every entry
/// becomes visible or none does.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn write(&self, writes: WriteSet) -> Result<(), StoreError>;

    /// Every entry whose key starts with `prefix`, in ascending key order.
    fn scan(&self, prefix: &[u8]) -> Result<Entries, StoreError>;
}

/// Staged writes over a store, with read-your-writes semantics.
pub struct Batch<'s> {
    store: &'s dyn KvStore,
    writes: WriteSet,
}

impl<'s> Batch<'s> {
    pub fn new(store: &'s dyn KvStore) -> Self {
        Self {
            store,
            writes: WriteSet::new(),
        }
    }

    /// Reads `key` from the pending writes, then from the store.
    pub fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let full = table.key(key);
        match self.writes.get(&full) {
            Some(value) => Ok(Some(value.clone())),
            None => self.store.get(&full),
        }
    }

    /// Entries of `table` under `prefix`, pending writes included, in key
    /// order. Returned keys have the table byte stripped.
    pub fn scan(&self, table: Table, prefix: &[u8]) -> Result<Entries, StoreError> {
        let full = table.key(prefix);
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self.store.scan(&full)?.into_iter().collect();
        for (key, value) in self.writes.range(full.clone()..) {
            if !key.starts_with(&full) {
                break;
            }
            merged.insert(key.clone(), value.clone());
        }
        Ok(merged
            .into_iter()
            .map(|(mut key, value)| {
                key.remove(0);
                (key, value)
            })
            .collect())
    }

    pub fn put(&mut self, table: Table, key: &[u8], value: Vec<u8>) {
        self.writes.insert(table.key(key), value);
    }

    /// Number of staged entries.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Applies every staged write to the store atomically.
    pub fn commit(self) -> Result<(), StoreError> {
        if self.writes.is_empty() {
            return Ok(());
        }
        self.store.write(self.writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    #[test]
    fn table_prefixes_keys() {
        assert_eq!(Table::Blocks.key(b"ab"), vec![0x01, b'a', b'b']);
        assert_eq!(Table::Nicks.key(&[]), vec![0x16]);
    }

    #[test]
    fn batch_reads_its_own_writes() {
        let store = MemoryStore::new();
        let mut batch = Batch::new(&store);
        batch.put(Table::Meta, b"k", b"v".to_vec());

        assert_eq!(batch.get(Table::Meta, b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.get(&Table::Meta.key(b"k")).unwrap(), None);
    }

    #[test]
    fn same_key_in_different_tables_is_distinct() {
        let store = MemoryStore::new();
        let mut batch = Batch::new(&store);
        batch.put(Table::Txs, b"k", vec![1]);
        batch.put(Table::Users, b"k", vec![2]);

        assert_eq!(batch.get(Table::Txs, b"k").unwrap(), Some(vec![1]));
        assert_eq!(batch.get(Table::Users, b"k").unwrap(), Some(vec![2]));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn scan_merges_pending_writes_in_key_order() {
        let store = MemoryStore::new();
        let mut batch = Batch::new(&store);
        batch.put(Table::Sources, b"a2", vec![2]);
        batch.put(Table::Sources, b"b1", vec![9]);
        batch.commit().unwrap();

        let mut batch = Batch::new(&store);
        batch.put(Table::Sources, b"a1", vec![1]);
        batch.put(Table::Sources, b"a2", vec![3]);
        batch.put(Table::Nicks, b"a0", vec![0]);

        assert_eq!(
            batch.scan(Table::Sources, b"a").unwrap(),
            vec![(b"a1".to_vec(), vec![1]), (b"a2".to_vec(), vec![3])]
        );
        assert_eq!(batch.scan(Table::Sources, b"").unwrap().len(), 3);
        assert!(batch.scan(Table::Sources, b"c").unwrap().is_empty());
    }

    #[test]
    fn commit_makes_writes_visible() {
        let store = MemoryStore::new();
        let mut batch = Batch::new(&store);
        batch.put(Table::Meta, b"k", vec![7]);
        batch.commit().unwrap();

        let fresh = Batch::new(&store);
        assert_eq!(fresh.get(Table::Meta, b"k").unwrap(), Some(vec![7]));
    }

    #[test]
    fn dropped_batch_leaves_store_untouched() {
        let store = MemoryStore::new();
        {
            let mut batch = Batch::new(&store);
            batch.put(Table::Meta, b"k", vec![7]);
        }
        assert!(store.is_empty());
    }
}
