//! Radix-16 Merkle-Patricia trie over a key-value table.

pub mod node;
pub mod patricia;

use crate::storage::kv::StoreError;
use ledger_derive::Error;

pub use patricia::PatriciaTrie;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrieError {
    #[error("trie storage: {0}")]
    Store(#[from] StoreError),
    #[error("malformed trie node at path {0}")]
    MalformedNode(String),
    /// Descent ran past the last nibble of a key: one key is a prefix of
    /// another.
    #[error("key exhausted at depth {0}")]
    KeyExhausted(usize),
}
