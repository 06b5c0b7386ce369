//! Recorded ledger writes and their commitments.

use crate::types::address::Address;
use crate::types::asset::Asset;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use crate::types::merkle_tree::MerkleTree;
use crate::types::number::{Number, number_bytes};
use ledger_derive::BinaryCodec;
use std::fmt;

/// One write to a ledger slot.
///
/// `balance` is the slot's balance after the write, so replaying values in
/// order reproduces the state. `tag` labels the sub-balance bucket the write
/// belongs to (a transfer tag or a recipient memo).
#[derive(Clone, PartialEq, Eq, BinaryCodec)]
pub struct Value {
    pub chain_id: u64,
    pub asset: Asset,
    pub address: Address,
    pub tag: u64,
    pub balance: Number,
}

impl Value {
    pub fn hash(&self) -> Hash {
        Hash::keyed(b"STATE_VALUE", self)
    }

    /// State trie key of the slot this value writes.
    pub fn state_key(&self) -> Vec<u8> {
        state_key(&self.asset, &self.address)
    }

    /// State trie value: the balance bytes.
    pub fn state_value(&self) -> Vec<u8> {
        number_bytes(&self.balance)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Value(chain={} {} {} tag={} balance={})",
            self.chain_id, self.asset, self.address, self.tag, self.balance
        )
    }
}

/// Encoded `(asset, address)` slot key. Prefix-free because the asset is
/// length-prefixed and the address has a fixed size.
pub fn state_key(asset: &Asset, address: &Address) -> Vec<u8> {
    (asset, address).to_bytes()
}

/// Merkle root over the hashes of `values`, in order.
pub fn values_hash(values: &[Value]) -> Hash {
    let hashes: Vec<Hash> = values.iter().map(Value::hash).collect();
    MerkleTree::root(&hashes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::Decode;

    fn value(balance: i64, tag: u64) -> Value {
        Value {
            chain_id: 1,
            asset: Asset::like(),
            address: Address::from_hash(&Hash::digest(b"a")),
            tag,
            balance: Number::from(balance),
        }
    }

    #[test]
    fn hash_covers_every_field() {
        let base = value(10, 0);
        let mut other_chain = base.clone();
        other_chain.chain_id = 2;
        assert_ne!(base.hash(), value(11, 0).hash());
        assert_ne!(base.hash(), value(10, 1).hash());
        assert_ne!(base.hash(), other_chain.hash());
        assert_eq!(base.hash(), value(10, 0).hash());
    }

    #[test]
    fn codec_round_trip() {
        let v = value(-5, 9);
        assert_eq!(Value::from_bytes(&v.to_bytes()).unwrap(), v);
    }

    #[test]
    fn values_hash_is_ordered_merkle_root() {
        let a = value(1, 0);
        let b = value(2, 0);
        assert_eq!(values_hash(&[]), Hash::EMPTY);
        assert_eq!(values_hash(std::slice::from_ref(&a)), a.hash());
        assert_eq!(
            values_hash(&[a.clone(), b.clone()]),
            MerkleTree::root(&[a.hash(), b.hash()])
        );
        assert_ne!(values_hash(&[a.clone(), b.clone()]), values_hash(&[b, a]));
    }

    #[test]
    fn state_key_ignores_chain_and_tag() {
        let a = value(1, 0);
        let mut b = value(2, 7);
        b.chain_id = 9;
        assert_eq!(a.state_key(), b.state_key());
        assert_eq!(a.state_value(), vec![1]);
    }
}
