//! Binary Merkle tree over 32-byte hashes.
//!
//! Behavior:
//! - An empty list of leaves yields [`Hash::EMPTY`], which no proof verifies against.
//! - A single leaf is its own root and has an empty proof.
//! - Adjacent nodes are paired as `SHA3(left || right)`.
//! - When a level has an odd count, the last node is carried up unchanged
//!   and contributes no proof step at that level.

use crate::types::hash::Hash;
use ledger_derive::BinaryCodec;

/// Position of the sibling relative to the node being proven.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec)]
pub enum Side {
    /// Sibling sits to the right: `hash(node || sibling)`.
    Right = 0,
    /// Sibling sits to the left: `hash(sibling || node)`.
    Left = 1,
}

/// One level of an inclusion proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec)]
pub struct ProofStep {
    pub side: Side,
    pub sibling: Hash,
}

/// Ordered sibling path from a leaf up to the root.
pub type Proof = Vec<ProofStep>;

/// Root, proof and verification functions.
pub struct MerkleTree;

impl MerkleTree {
    /// Hashes two byte strings as a parent node.
    ///
    /// Also serves as the root of any two-leaf tree, e.g. `[key, value]`.
    pub fn hash_pair(left: &[u8], right: &[u8]) -> Hash {
        Hash::sha3().chain(left).chain(right).finalize()
    }

    fn next_level(level: &[Hash]) -> Vec<Hash> {
        level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => Self::hash_pair(left.as_slice(), right.as_slice()),
                [carried] => *carried,
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect()
    }

    /// Computes the Merkle root of `leaves`.
    pub fn root(leaves: &[Hash]) -> Hash {
        match leaves {
            [] => Hash::EMPTY,
            [single] => *single,
            _ => {
                let mut level = Self::next_level(leaves);
                while level.len() > 1 {
                    level = Self::next_level(&level);
                }
                level[0]
            }
        }
    }

    /// Builds the inclusion proof of `leaves[index]`.
    ///
    /// Returns `None` when `index` is out of range.
    pub fn proof(leaves: &[Hash], index: usize) -> Option<Proof> {
        if index >= leaves.len() {
            return None;
        }

        let mut proof = Vec::new();
        let mut level = leaves.to_vec();
        let mut idx = index;

        while level.len() > 1 {
            let carried = idx + 1 == level.len() && level.len() % 2 == 1;
            if !carried {
                let step = if idx % 2 == 0 {
                    ProofStep {
                        side: Side::Right,
                        sibling: level[idx + 1],
                    }
                } else {
                    ProofStep {
                        side: Side::Left,
                        sibling: level[idx - 1],
                    }
                };
                proof.push(step);
            }
            level = Self::next_level(&level);
            idx /= 2;
        }

        Some(proof)
    }

    /// Replays `proof` from `leaf` and compares the result with `root`.
    pub fn verify(leaf: Hash, root: Hash, proof: &[ProofStep]) -> bool {
        if root.is_empty() {
            return false;
        }
        Self::fold(leaf, proof) == root
    }

    /// Hash obtained by applying every proof step to `leaf`.
    pub fn fold(leaf: Hash, proof: &[ProofStep]) -> Hash {
        proof.iter().fold(leaf, |node, step| match step.side {
            Side::Right => Self::hash_pair(node.as_slice(), step.sibling.as_slice()),
            Side::Left => Self::hash_pair(step.sibling.as_slice(), node.as_slice()),
        })
    }
}
