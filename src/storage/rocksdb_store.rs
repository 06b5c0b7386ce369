//! RocksDB-backed key-value store.
//!
//! Uses the default column family only; tables are separated by the key
//! prefix byte from [`Table`](crate::storage::kv::Table). Write sets go
//! through a single `WriteBatch`, which RocksDB applies atomically.

use crate::info;
use crate::storage::kv::{Entries, KvStore, StoreError, WriteSet};
use rocksdb::{DB, Direction, IteratorMode, Options, WriteBatch};
use std::path::Path;

pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Opens (or creates) a database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path).map_err(|e| StoreError::Backend(e.to_string()))?;
        info!("opened rocksdb store at {}", path.display());
        Ok(Self { db })
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get(key)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn write(&self, writes: WriteSet) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        for (key, value) in writes {
            batch.put(key, value);
        }
        self.db
            .write(batch)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn scan(&self, prefix: &[u8]) -> Result<Entries, StoreError> {
        let mut entries = Entries::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.into_vec(), value.into_vec()));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            let mut writes = WriteSet::new();
            writes.insert(b"key".to_vec(), b"value".to_vec());
            store.write(writes).unwrap();
        }
        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert_eq!(store.get(b"missing").unwrap(), None);
    }

    #[test]
    fn scan_returns_prefixed_keys_in_order() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let mut writes = WriteSet::new();
        for key in [&b"\x11b"[..], b"\x11a", b"\x12a", b"\x10z"] {
            writes.insert(key.to_vec(), vec![key[1]]);
        }
        store.write(writes).unwrap();

        assert_eq!(
            store.scan(&[0x11]).unwrap(),
            vec![(b"\x11a".to_vec(), vec![b'a']), (b"\x11b".to_vec(), vec![b'b'])]
        );
        assert!(store.scan(&[0x13]).unwrap().is_empty());
    }
}
