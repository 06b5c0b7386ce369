//! Asset tags: coins, external counters and registered names.

use crate::types::address::Address;
use crate::types::hash::Hash;
use ledger_derive::BinaryCodec;
use std::fmt;

/// Asset kind, stored in byte 0 of the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Coin = 0,
    Counter = 1,
    Name = 2,
}

/// Id of the native coin.
pub const LIKE_COIN_ID: u8 = 0;

/// Variable-length asset tag.
///
/// - Coin: `[0, coin_id]`
/// - Counter: `[1, counter_type] ‖ counter id`
/// - Name: `[2] ‖ username`
///
/// Assets compare by exact byte equality.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, BinaryCodec)]
pub struct Asset(Vec<u8>);

impl Asset {
    pub fn coin(id: u8) -> Asset {
        Asset(vec![AssetKind::Coin as u8, id])
    }

    /// The native coin.
    pub fn like() -> Asset {
        Self::coin(LIKE_COIN_ID)
    }

    pub fn counter(counter_type: u8, id: &str) -> Asset {
        let mut raw = Vec::with_capacity(2 + id.len());
        raw.push(AssetKind::Counter as u8);
        raw.push(counter_type);
        raw.extend_from_slice(id.as_bytes());
        Asset(raw)
    }

    pub fn name(nick: &str) -> Asset {
        let mut raw = Vec::with_capacity(1 + nick.len());
        raw.push(AssetKind::Name as u8);
        raw.extend_from_slice(nick.as_bytes());
        Asset(raw)
    }

    /// Wraps raw tag bytes without checking them.
    pub fn from_raw(raw: Vec<u8>) -> Asset {
        Asset(raw)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn kind(&self) -> Option<AssetKind> {
        match self.0.first()? {
            0 => Some(AssetKind::Coin),
            1 => Some(AssetKind::Counter),
            2 => Some(AssetKind::Name),
            _ => None,
        }
    }

    pub fn is_coin(&self) -> bool {
        self.kind() == Some(AssetKind::Coin) && self.0.len() == 2
    }

    pub fn is_counter(&self) -> bool {
        self.kind() == Some(AssetKind::Counter)
    }

    pub fn is_name(&self) -> bool {
        self.kind() == Some(AssetKind::Name)
    }

    /// Coin id for coin assets, counter type for counter assets.
    pub fn id(&self) -> Option<u8> {
        match self.kind()? {
            AssetKind::Coin | AssetKind::Counter => self.0.get(1).copied(),
            AssetKind::Name => None,
        }
    }

    /// Counter tracking an external emission source of this coin.
    pub fn source_counter(&self, source_id: &str) -> Asset {
        Asset::counter(self.id().unwrap_or(LIKE_COIN_ID), source_id)
    }
}

/// Ledger slot address of an external counter id.
///
/// Counter slots are keyed by an opaque identifier rather than a key pair,
/// so the id is hashed down to address size.
pub fn counter_address(id: &str) -> Address {
    Address::from_hash(&Hash::keyed(b"COUNTER", id))
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind(), self.0.as_slice()) {
            (Some(AssetKind::Coin), [_, LIKE_COIN_ID]) => f.write_str("LIKE"),
            (Some(AssetKind::Coin), [_, id]) => write!(f, "coin:{id}"),
            (Some(AssetKind::Counter), [_, typ, id @ ..]) => {
                write!(f, "counter:{typ}:{}", String::from_utf8_lossy(id))
            }
            (Some(AssetKind::Name), [_, nick @ ..]) => {
                write!(f, "@{}", String::from_utf8_lossy(nick))
            }
            _ => write!(f, "0x{}", hex::encode(&self.0)),
        }
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Asset({self})")
    }
}
