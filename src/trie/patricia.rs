//! Authenticated key-value map addressed by nibble paths.
//!
//! Every node lives in the trie's table under its path from the root, one
//! byte per nibble. Writes are staged in a pending map and only copied into
//! the batch once the whole insertion has succeeded.

use crate::storage::kv::{Batch, Table};
use crate::trie::TrieError;
use crate::trie::node::{Node, RADIX};
use crate::types::encoding::{Decode, Encode};
use crate::types::hash::Hash;
use crate::types::merkle_tree::{MerkleTree, Proof, ProofStep};
use std::collections::HashMap;

type Pending = HashMap<Vec<u8>, Node>;

/// Nibble `depth` of `key`: high half of the byte for even depths, low half
/// for odd ones.
fn nibble(key: &[u8], depth: usize) -> Option<usize> {
    let byte = *key.get(depth / 2)?;
    Some(if depth % 2 == 0 {
        (byte >> 4) as usize
    } else {
        (byte & 0x0f) as usize
    })
}

fn nibble_or_exhausted(key: &[u8], depth: usize) -> Result<usize, TrieError> {
    nibble(key, depth).ok_or(TrieError::KeyExhausted(depth))
}

/// Merkle-Patricia trie bound to one table.
///
/// Holds no storage handle: every call takes the [`Batch`] to read from or
/// stage into, so the same trie runs against committed or staged state.
pub struct PatriciaTrie {
    table: Table,
    root: Option<Hash>,
}

impl PatriciaTrie {
    pub fn new(table: Table) -> Self {
        Self { table, root: None }
    }

    /// Hash of the leaf storing `key` and `value`.
    pub fn leaf_hash(key: &[u8], value: &[u8]) -> Hash {
        Node::leaf(key, value).hash()
    }

    /// Checks a proof from [`get_proof`](Self::get_proof) or
    /// [`appending_proof`](Self::appending_proof).
    pub fn verify(leaf_hash: Hash, proof: &[ProofStep], root: Hash) -> bool {
        MerkleTree::verify(leaf_hash, root, proof)
    }

    /// Current root, or [`Hash::EMPTY`] for an empty trie.
    pub fn root(&mut self, batch: &Batch) -> Result<Hash, TrieError> {
        if let Some(root) = self.root {
            return Ok(root);
        }
        let root = self
            .load(batch, &Pending::new(), &[])?
            .map(|node| node.hash())
            .unwrap_or(Hash::EMPTY);
        self.root = Some(root);
        Ok(root)
    }

    /// Inserts or overwrites `key` and returns the new root.
    pub fn put(&mut self, batch: &mut Batch, key: &[u8], value: &[u8]) -> Result<Hash, TrieError> {
        self.root = None;
        let mut pending = Pending::new();
        let root = self.insert(batch, &mut pending, &mut Vec::new(), key, value)?;
        for (path, node) in pending {
            batch.put(self.table, &path, node.to_bytes());
        }
        self.root = Some(root);
        Ok(root)
    }

    pub fn get(&self, batch: &Batch, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(self
            .prove(batch, &Pending::new(), &mut Vec::new(), key)?
            .map(|(value, _)| value))
    }

    /// Value, inclusion proof and root for `key`.
    ///
    /// The proof runs from the leaf upwards. A missing key yields no value
    /// and an empty proof.
    pub fn get_proof(
        &mut self,
        batch: &Batch,
        key: &[u8],
    ) -> Result<(Option<Vec<u8>>, Proof, Hash), TrieError> {
        let found = self.prove(batch, &Pending::new(), &mut Vec::new(), key)?;
        let root = self.root(batch)?;
        Ok(match found {
            Some((value, proof)) => (Some(value), proof, root),
            None => (None, Proof::new(), root),
        })
    }

    /// Proof and root `key` would have after `put(key, value)`, without
    /// touching the batch.
    pub fn appending_proof(
        &self,
        batch: &Batch,
        key: &[u8],
        value: &[u8],
    ) -> Result<(Proof, Hash), TrieError> {
        let mut pending = Pending::new();
        let root = self.insert(batch, &mut pending, &mut Vec::new(), key, value)?;
        let proof = self
            .prove(batch, &pending, &mut Vec::new(), key)?
            .map(|(_, proof)| proof)
            .unwrap_or_default();
        Ok((proof, root))
    }

    fn load(&self, batch: &Batch, pending: &Pending, path: &[u8]) -> Result<Option<Node>, TrieError> {
        if let Some(node) = pending.get(path) {
            return Ok(Some(node.clone()));
        }
        match batch.get(self.table, path)? {
            None => Ok(None),
            Some(bytes) => Node::from_bytes(&bytes)
                .map(Some)
                .map_err(|e| TrieError::MalformedNode(format!("{} ({e})", hex::encode(path)))),
        }
    }

    fn insert(
        &self,
        batch: &Batch,
        pending: &mut Pending,
        path: &mut Vec<u8>,
        key: &[u8],
        value: &[u8],
    ) -> Result<Hash, TrieError> {
        let depth = path.len();
        let node = match self.load(batch, pending, path)? {
            None => Node::leaf(key, value),
            Some(Node::Leaf { key: stored, .. }) if stored == key => Node::leaf(key, value),
            Some(Node::Leaf {
                key: old_key,
                value: old_value,
            }) => {
                // split: push the old leaf one level down, then add the new key
                let mut children = [None; RADIX];
                let i = nibble_or_exhausted(&old_key, depth)?;
                children[i] = Some(self.descend(batch, pending, path, i, &old_key, &old_value)?);
                let j = nibble_or_exhausted(key, depth)?;
                children[j] = Some(self.descend(batch, pending, path, j, key, value)?);
                Node::Branch { children }
            }
            Some(Node::Branch { mut children }) => {
                let j = nibble_or_exhausted(key, depth)?;
                children[j] = Some(self.descend(batch, pending, path, j, key, value)?);
                Node::Branch { children }
            }
        };
        let hash = node.hash();
        pending.insert(path.clone(), node);
        Ok(hash)
    }

    fn descend(
        &self,
        batch: &Batch,
        pending: &mut Pending,
        path: &mut Vec<u8>,
        index: usize,
        key: &[u8],
        value: &[u8],
    ) -> Result<Hash, TrieError> {
        path.push(index as u8);
        let hash = self.insert(batch, pending, path, key, value);
        path.pop();
        hash
    }

    fn prove(
        &self,
        batch: &Batch,
        pending: &Pending,
        path: &mut Vec<u8>,
        key: &[u8],
    ) -> Result<Option<(Vec<u8>, Proof)>, TrieError> {
        match self.load(batch, pending, path)? {
            None => Ok(None),
            Some(Node::Leaf { key: stored, value }) => {
                Ok((stored == key).then(|| (value, Proof::new())))
            }
            Some(branch @ Node::Branch { .. }) => {
                let Some(i) = nibble(key, path.len()) else {
                    return Ok(None);
                };
                path.push(i as u8);
                let found = self.prove(batch, pending, path, key);
                path.pop();
                Ok(found?.map(|(value, mut proof)| {
                    proof.extend(branch.child_proof(i));
                    (value, proof)
                }))
            }
        }
    }
}
