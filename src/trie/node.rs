//! Trie nodes and their stored encoding.
//!
//! Stored layout: a big-endian `u16` flag word (bit `i` set when child `i`
//! is present) followed by the present child hashes in index order. A zero
//! flag word marks a leaf, followed by the length-prefixed key and value.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, read_bytes};
use crate::types::hash::Hash;
use crate::types::merkle_tree::{MerkleTree, Proof};

/// Branching factor: one child per nibble value.
pub const RADIX: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf { key: Vec<u8>, value: Vec<u8> },
    Branch { children: [Option<Hash>; RADIX] },
}

impl Node {
    pub fn leaf(key: &[u8], value: &[u8]) -> Node {
        Node::Leaf {
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    /// Leaf: Merkle root of `[key, value]`. Branch: Merkle root of the
    /// present child hashes.
    pub fn hash(&self) -> Hash {
        match self {
            Node::Leaf { key, value } => MerkleTree::hash_pair(key, value),
            Node::Branch { children } => MerkleTree::root(&present(children)),
        }
    }

    /// Proof of child `index` among this branch's present children.
    ///
    /// Empty for leaves and for absent children.
    pub fn child_proof(&self, index: usize) -> Proof {
        let Node::Branch { children } = self else {
            return Proof::new();
        };
        if children.get(index).copied().flatten().is_none() {
            return Proof::new();
        }
        let position = children[..index].iter().filter(|c| c.is_some()).count();
        MerkleTree::proof(&present(children), position).unwrap_or_default()
    }
}

fn present(children: &[Option<Hash>; RADIX]) -> Vec<Hash> {
    children.iter().flatten().copied().collect()
}

impl Encode for Node {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            Node::Leaf { key, value } => {
                out.write(&0u16.to_be_bytes());
                key.encode(out);
                value.encode(out);
            }
            Node::Branch { children } => {
                let flags = children
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.is_some())
                    .fold(0u16, |acc, (i, _)| acc | (1 << i));
                out.write(&flags.to_be_bytes());
                for hash in children.iter().flatten() {
                    hash.encode(out);
                }
            }
        }
    }
}

impl Decode for Node {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let raw = read_bytes(input, 2)?;
        let flags = u16::from_be_bytes([raw[0], raw[1]]);
        if flags == 0 {
            let key = Vec::<u8>::decode(input)?;
            let value = Vec::<u8>::decode(input)?;
            return Ok(Node::Leaf { key, value });
        }
        let mut children = [None; RADIX];
        for (i, child) in children.iter_mut().enumerate() {
            if flags & (1 << i) != 0 {
                *child = Some(Hash::decode(input)?);
            }
        }
        Ok(Node::Branch { children })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(slots: &[(usize, Hash)]) -> Node {
        let mut children = [None; RADIX];
        for (i, h) in slots {
            children[*i] = Some(*h);
        }
        Node::Branch { children }
    }

    #[test]
    fn leaf_hash_is_two_leaf_merkle_root() {
        let node = Node::leaf(b"key", b"value");
        assert_eq!(node.hash(), MerkleTree::hash_pair(b"key", b"value"));
    }

    #[test]
    fn branch_hash_skips_empty_slots() {
        let a = Hash::digest(b"a");
        let b = Hash::digest(b"b");
        let node = branch(&[(3, a), (12, b)]);
        assert_eq!(node.hash(), MerkleTree::root(&[a, b]));
    }

    #[test]
    fn leaf_encoding_starts_with_zero_flags() {
        let bytes = Node::leaf(b"k", b"v").to_bytes();
        assert_eq!(&bytes[..2], &[0, 0]);
        assert_eq!(Node::from_bytes(&bytes).unwrap(), Node::leaf(b"k", b"v"));
    }

    #[test]
    fn branch_encoding_carries_flags_and_hashes() {
        let a = Hash::digest(b"a");
        let b = Hash::digest(b"b");
        let node = branch(&[(0, a), (15, b)]);
        let bytes = node.to_bytes();
        assert_eq!(&bytes[..2], &[0x80, 0x01]);
        assert_eq!(bytes.len(), 2 + 64);
        assert_eq!(Node::from_bytes(&bytes).unwrap(), node);
    }

    #[test]
    fn truncated_branch_fails() {
        let node = branch(&[(1, Hash::digest(b"a"))]);
        let bytes = node.to_bytes();
        assert!(Node::from_bytes(&bytes[..20]).is_err());
    }

    #[test]
    fn child_proof_verifies_against_branch_hash() {
        let hashes: Vec<Hash> = (0u8..5).map(|i| Hash::digest(&[i])).collect();
        let node = branch(&[
            (1, hashes[0]),
            (4, hashes[1]),
            (7, hashes[2]),
            (9, hashes[3]),
            (14, hashes[4]),
        ]);
        let proof = node.child_proof(9);
        assert!(MerkleTree::verify(hashes[3], node.hash(), &proof));
        assert!(node.child_proof(2).is_empty());
    }
}
