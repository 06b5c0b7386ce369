//! 32-byte SHA3-256 digests and the keyed structural hash built on them.

use crate::types::encoding::{Encode, EncodeSink};
use ledger_derive::BinaryCodec;
use sha3::{Digest, Sha3_256};
use std::fmt;

/// SHA3-256 hash length in bytes.
pub const HASH_LEN: usize = 32;

/// Fixed-size digest used for every commitment in the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec, Default, Hash, Ord, PartialOrd)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// Reserved "no data" value: the Merkle root of an empty list.
    ///
    /// Never a valid commitment; proof verification rejects it.
    pub const EMPTY: Hash = Hash([0u8; HASH_LEN]);

    pub const fn zero() -> Hash {
        Self::EMPTY
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Builds a hash from a 32-byte slice.
    pub fn from_slice(bytes: &[u8]) -> Option<Hash> {
        <[u8; HASH_LEN]>::try_from(bytes).ok().map(Hash)
    }

    /// Creates a new SHA3-256 hash builder for incremental hashing.
    pub fn sha3() -> HashBuilder {
        HashBuilder::new()
    }

    /// Plain SHA3-256 of raw bytes.
    pub fn digest(data: &[u8]) -> Hash {
        let mut h = Hash::sha3();
        h.update(data);
        h.finalize()
    }

    /// Keyed structural hash: SHA3-256 of a domain tag followed by the
    /// canonical encoding of `fields`.
    ///
    /// Pass a tuple to hash several fields in order.
    pub fn keyed<T: Encode + ?Sized>(domain: &[u8], fields: &T) -> Hash {
        let mut h = Hash::sha3();
        h.update(domain);
        fields.encode(&mut h);
        h.finalize()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Incremental SHA3-256 hash builder.
///
/// Implements [`EncodeSink`] so encodable values are hashed in place.
pub struct HashBuilder {
    hasher: Sha3_256,
}

impl HashBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Sha3_256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Chained variant of [`update`](Self::update).
    pub fn chain(mut self, data: &[u8]) -> Self {
        self.update(data);
        self
    }

    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for HashBuilder {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}
