//! 24-byte ledger addresses and their checksummed `Like…` string form.
//!
//! String layout: `"Like" + base58(version ‖ address ‖ varint(memo) ‖ checksum)`
//! where the checksum is the first 3 bytes of
//! `SHA3-256("Like" ‖ version ‖ address ‖ memo as u64 big-endian)`.

use crate::types::encoding::{read_uvarint, write_uvarint};
use crate::types::hash::Hash;
use ledger_derive::{BinaryCodec, Error};
use std::fmt;
use std::str::FromStr;

/// Address length in bytes.
pub const ADDRESS_SIZE: usize = 24;

/// Prefix of every address string.
pub const ADDRESS_PREFIX: &str = "Like";

const ADDRESS_VERSION: u8 = 0x01;
const CHECKSUM_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address must start with \"Like\"")]
    InvalidPrefix,
    #[error("address is not valid base58")]
    InvalidBase58,
    #[error("address has invalid length {0}")]
    InvalidLength(usize),
    #[error("unsupported address version {0}")]
    UnsupportedVersion(u8),
    #[error("address memo is malformed")]
    InvalidMemo,
    #[error("address checksum mismatch")]
    InvalidChecksum,
}

/// Account identifier derived from a public key (or from a counter id for
/// counter assets).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BinaryCodec)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    /// The all-zero address, treated as "no address".
    pub const NIL: Address = Address([0u8; ADDRESS_SIZE]);

    pub fn is_empty(&self) -> bool {
        *self == Self::NIL
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Takes the first 24 bytes of a digest.
    pub fn from_hash(hash: &Hash) -> Address {
        let mut addr = [0u8; ADDRESS_SIZE];
        addr.copy_from_slice(&hash.0[..ADDRESS_SIZE]);
        Address(addr)
    }

    fn checksum(&self, memo: u64) -> [u8; CHECKSUM_LEN] {
        let digest = Hash::sha3()
            .chain(ADDRESS_PREFIX.as_bytes())
            .chain(&[ADDRESS_VERSION])
            .chain(&self.0)
            .chain(&memo.to_be_bytes())
            .finalize();
        let mut sum = [0u8; CHECKSUM_LEN];
        sum.copy_from_slice(&digest.0[..CHECKSUM_LEN]);
        sum
    }

    /// String form of this address carrying a sub-account memo.
    pub fn memo_string(&self, memo: u64) -> String {
        let mut raw = Vec::with_capacity(1 + ADDRESS_SIZE + 10 + CHECKSUM_LEN);
        raw.push(ADDRESS_VERSION);
        raw.extend_from_slice(&self.0);
        write_uvarint(memo, &mut raw);
        raw.extend_from_slice(&self.checksum(memo));
        format!("{ADDRESS_PREFIX}{}", bs58::encode(raw).into_string())
    }

    /// Parses an address string, returning the address and its memo.
    pub fn parse_with_memo(s: &str) -> Result<(Address, u64), AddressError> {
        let encoded = s
            .strip_prefix(ADDRESS_PREFIX)
            .ok_or(AddressError::InvalidPrefix)?;
        let raw = bs58::decode(encoded)
            .into_vec()
            .map_err(|_| AddressError::InvalidBase58)?;

        if raw.len() < 1 + ADDRESS_SIZE + 1 + CHECKSUM_LEN {
            return Err(AddressError::InvalidLength(raw.len()));
        }
        if raw[0] != ADDRESS_VERSION {
            return Err(AddressError::UnsupportedVersion(raw[0]));
        }

        let (body, sum) = raw.split_at(raw.len() - CHECKSUM_LEN);
        let mut addr = [0u8; ADDRESS_SIZE];
        addr.copy_from_slice(&body[1..1 + ADDRESS_SIZE]);
        let address = Address(addr);

        let mut memo_bytes = &body[1 + ADDRESS_SIZE..];
        let memo = read_uvarint(&mut memo_bytes).map_err(|_| AddressError::InvalidMemo)?;
        if !memo_bytes.is_empty() {
            return Err(AddressError::InvalidMemo);
        }

        if sum != address.checksum(memo) {
            return Err(AddressError::InvalidChecksum);
        }
        Ok((address, memo))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.memo_string(0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Parses an address string; any memo is accepted and discarded.
impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse_with_memo(s).map(|(address, _)| address)
    }
}
