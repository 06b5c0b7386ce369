//! Single-authority ledger library.
//!
//! Provides signed transactions over an account-balance state, committed
//! into a binary Merkle tree and a radix-16 Merkle-Patricia trie so that any
//! block can be re-verified from its header.

pub mod core;
pub mod crypto;
pub mod state;
pub mod storage;
pub mod trie;
pub mod types;
pub mod utils;
