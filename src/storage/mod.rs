//! Ledger storage subsystem.
//!
//! - [`kv`]: the [`KvStore`](kv::KvStore) trait, table namespaces and staged batches
//! - [`memory`]: in-memory store for tests and embedding
//! - [`rocksdb_store`]: RocksDB-backed store
//! - [`chain_store`]: block history, indexes and atomic block commit
//! - [`statistic`]: running totals kept with the chain

pub mod chain_store;
pub mod kv;
pub mod memory;
pub mod rocksdb_store;
pub mod statistic;
