//! Core type definitions for ledger primitives.
//!
//! This module provides the fundamental types used throughout the ledger:
//! - `encoding`: Canonical binary codec shared by hashing, storage and the wire
//! - `Hash`: Fixed-size 32-byte SHA3-256 hashes
//! - `MerkleTree`: Binary Merkle roots and inclusion proofs
//! - `Address`, `Asset`, `Number`: ledger slot identifiers and balances

pub mod address;
pub mod asset;
pub mod encoding;
pub mod hash;
pub mod merkle_tree;
pub mod number;
