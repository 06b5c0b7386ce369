//! Signed transaction envelope.
//!
//! The envelope carries routing metadata and an opaque payload. Its hash
//! covers everything the sender controls; the signature and the state
//! updates recorded by the block producer are excluded.

use crate::core::config::ChainConfig;
use crate::core::payload::{Payload, TX_EMISSION, TxObject, TxType};
use crate::core::registry::Registry;
use crate::crypto::key_pair::{PrivateKey, PublicKey, Signature};
use crate::state::{StateError, StateLedger, Value, values_hash};
use crate::types::address::Address;
use crate::types::encoding::{DecodeError, Encode};
use crate::types::hash::Hash;
use crate::types::merkle_tree::MerkleTree;
use crate::utils::log::Timestamp;
use ledger_derive::{BinaryCodec, Error};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("invalid network id: expected {expected}, got {actual}")]
    InvalidNetwork { expected: u8, actual: u8 },
    #[error("invalid chain id: expected {expected}, got {actual}")]
    InvalidChainId { expected: u64, actual: u64 },
    #[error("empty transaction data")]
    EmptyData,
    #[error("transaction data too long: {size} bytes, limit {limit}")]
    DataTooLong { size: usize, limit: usize },
    #[error("invalid sender signature")]
    InvalidSignature,
    #[error("unsupported transaction type {0}")]
    UnsupportedTxType(TxType),
    #[error("invalid transaction data: {0}")]
    InvalidTxData(#[from] DecodeError),
    #[error("sender is not allowed to send this transaction")]
    IncorrectSender,
    #[error("asset type is not allowed here")]
    IncorrectAssetType,
    #[error("emission rate must not be negative")]
    IncorrectRate,
    #[error("emission delta must lie between 0 and the source value")]
    IncorrectDelta,
    #[error("emission output has an empty source id")]
    EmptySourceId,
    #[error("emission output with a positive delta needs an address")]
    EmptyAddress,
    #[error("transfer has no outputs")]
    NoOutputs,
    #[error("transfer output address is empty or the sender's own")]
    IncorrectOutAddress,
    #[error("transfer amount must be positive")]
    IncorrectAmount,
    #[error("invalid nickname {0:?}")]
    InvalidNickname(String),
    #[error("user data too long: {size} bytes, limit {limit}")]
    UserDataTooLong { size: usize, limit: usize },
    #[error("state: {0}")]
    State(#[from] StateError),
    #[error("unknown transaction id format {0:?}")]
    InvalidTxId(String),
}

/// Short transaction identifier: the first 8 bytes of the envelope hash,
/// read big-endian.
///
/// Two envelopes may share an id; history lookups treat the first one as
/// the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BinaryCodec)]
pub struct TxId(pub u64);

impl TxId {
    pub fn from_hash(hash: &Hash) -> TxId {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.0[..8]);
        TxId(u64::from_be_bytes(prefix))
    }

    /// Fixed-width key for index tables.
    pub fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

static TX_ID_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:0x)?([0-9a-f]{16})(?:[0-9a-f]{48})?$").expect("static pattern compiles")
});

/// Accepts an id (16 hex chars) or a full hash (64), optionally `0x`-prefixed.
impl FromStr for TxId {
    type Err = TxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TX_ID_FORMAT
            .captures(s)
            .and_then(|caps| caps.get(1))
            .and_then(|id| u64::from_str_radix(id.as_str(), 16).ok())
            .map(TxId)
            .ok_or_else(|| TxError::InvalidTxId(s.to_string()))
    }
}

static LAST_NONCE: AtomicU64 = AtomicU64::new(0);

/// Current time in microseconds, strictly increasing across calls.
pub fn next_nonce() -> u64 {
    let now = Timestamp::now().0.max(0) as u64;
    let previous = LAST_NONCE
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(previous + 1)
}

#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct Envelope {
    pub tx_type: TxType,
    pub version: u32,
    pub network: u8,
    pub chain_id: u64,
    /// Client timestamp in microseconds; also makes repeated payloads unique.
    pub nonce: u64,
    /// Encoded payload.
    pub data: Vec<u8>,
    pub reserved1: Vec<u8>,
    pub reserved2: Vec<u8>,
    pub sender: PublicKey,
    pub sig: Signature,
    /// Values produced by executing this envelope, filled by the block
    /// producer.
    pub state_updates: Vec<Value>,
}

impl Envelope {
    /// Builds and signs an envelope for `payload` with a fresh nonce.
    pub fn new(cfg: &ChainConfig, key: &PrivateKey, payload: &Payload) -> Envelope {
        Self::with_nonce(cfg, key, payload, next_nonce())
    }

    pub fn with_nonce(cfg: &ChainConfig, key: &PrivateKey, payload: &Payload, nonce: u64) -> Envelope {
        let mut tx = Envelope {
            tx_type: payload.tx_type(),
            version: 0,
            network: cfg.network,
            chain_id: cfg.chain_id,
            nonce,
            data: payload.to_bytes(),
            reserved1: Vec::new(),
            reserved2: Vec::new(),
            sender: key.public_key(),
            // placeholder, replaced below once the hash is known
            sig: key.sign(&[]),
            state_updates: Vec::new(),
        };
        tx.sig = key.sign(tx.hash().as_slice());
        tx
    }

    pub fn hash(&self) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"TX");
        self.tx_type.encode(&mut h);
        self.version.encode(&mut h);
        self.network.encode(&mut h);
        self.chain_id.encode(&mut h);
        self.nonce.encode(&mut h);
        self.data.encode(&mut h);
        self.reserved1.encode(&mut h);
        self.reserved2.encode(&mut h);
        self.sender.encode(&mut h);
        h.finalize()
    }

    pub fn id(&self) -> TxId {
        TxId::from_hash(&self.hash())
    }

    /// Commitment to the envelope together with the values it produced.
    pub fn item_hash(&self) -> Hash {
        MerkleTree::root(&[self.hash(), values_hash(&self.state_updates)])
    }

    pub fn sender_address(&self) -> Address {
        self.sender.address()
    }

    /// Checks routing fields, decodes the payload, runs its business rules
    /// and finally the sender signature. Returns the decoded payload.
    pub fn verify(&self, cfg: &ChainConfig, registry: &Registry) -> Result<Payload, TxError> {
        if self.network != cfg.network {
            return Err(TxError::InvalidNetwork {
                expected: cfg.network,
                actual: self.network,
            });
        }
        if self.chain_id != cfg.chain_id {
            return Err(TxError::InvalidChainId {
                expected: cfg.chain_id,
                actual: self.chain_id,
            });
        }
        if self.data.is_empty() {
            return Err(TxError::EmptyData);
        }
        // emissions batch many outputs and are exempt from the size limit
        if self.tx_type != TX_EMISSION && self.data.len() > cfg.max_tx_data_size {
            return Err(TxError::DataTooLong {
                size: self.data.len(),
                limit: cfg.max_tx_data_size,
            });
        }

        let payload = registry.decode_payload(self.tx_type, &self.data)?;
        payload.verify(self, cfg)?;

        if !self.sender.verify(self.hash().as_slice(), &self.sig) {
            return Err(TxError::InvalidSignature);
        }
        Ok(payload)
    }

    /// Verifies and executes on a sub-state of `ledger`. The produced values
    /// are applied to `ledger` and returned only if everything succeeds.
    pub fn execute(
        &self,
        cfg: &ChainConfig,
        registry: &Registry,
        ledger: &mut StateLedger<'_>,
    ) -> Result<Vec<Value>, TxError> {
        let payload = self.verify(cfg, registry)?;
        ledger.execute(|state| payload.execute(self, cfg, state))
    }
}
