//! Typed transaction bodies carried in an envelope's `data`.
//!
//! Every payload encoding starts with a version varint so fields can be
//! added later without changing the transaction type.

pub mod emission;
pub mod transfer;
pub mod user;

use crate::core::config::ChainConfig;
use crate::core::transaction::{Envelope, TxError};
use crate::state::StateLedger;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};

pub use emission::{Emission, EmissionOut};
pub use transfer::{Transfer, TransferOut};
pub use user::User;

/// Envelope type tag.
pub type TxType = u8;

pub const TX_EMISSION: TxType = 0;
pub const TX_TRANSFER: TxType = 1;
pub const TX_USER: TxType = 2;

/// Current payload encoding version.
pub(crate) const PAYLOAD_VERSION: u32 = 0;

/// Business rules of one payload kind.
///
/// `verify` is a pure function of the envelope and configuration;
/// `execute` mutates the ledger it is given and reports failure as an
/// error, leaving rollback to the caller.
pub trait TxObject {
    fn tx_type(&self) -> TxType;

    fn verify(&self, tx: &Envelope, cfg: &ChainConfig) -> Result<(), TxError>;

    fn execute(
        &self,
        tx: &Envelope,
        cfg: &ChainConfig,
        state: &mut StateLedger<'_>,
    ) -> Result<(), TxError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Emission(Emission),
    Transfer(Transfer),
    User(User),
    /// Stored transaction of a type this build does not know. The raw bytes
    /// are kept so the record survives until support is added.
    Unknown { tx_type: TxType, data: Vec<u8> },
}

impl TxObject for Payload {
    fn tx_type(&self) -> TxType {
        match self {
            Payload::Emission(p) => p.tx_type(),
            Payload::Transfer(p) => p.tx_type(),
            Payload::User(p) => p.tx_type(),
            Payload::Unknown { tx_type, .. } => *tx_type,
        }
    }

    fn verify(&self, tx: &Envelope, cfg: &ChainConfig) -> Result<(), TxError> {
        match self {
            Payload::Emission(p) => p.verify(tx, cfg),
            Payload::Transfer(p) => p.verify(tx, cfg),
            Payload::User(p) => p.verify(tx, cfg),
            Payload::Unknown { tx_type, .. } => Err(TxError::UnsupportedTxType(*tx_type)),
        }
    }

    fn execute(
        &self,
        tx: &Envelope,
        cfg: &ChainConfig,
        state: &mut StateLedger<'_>,
    ) -> Result<(), TxError> {
        match self {
            Payload::Emission(p) => p.execute(tx, cfg, state),
            Payload::Transfer(p) => p.execute(tx, cfg, state),
            Payload::User(p) => p.execute(tx, cfg, state),
            Payload::Unknown { tx_type, .. } => Err(TxError::UnsupportedTxType(*tx_type)),
        }
    }
}

/// Writes the payload body only; the type lives in the envelope.
impl Encode for Payload {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            Payload::Emission(p) => p.encode(out),
            Payload::Transfer(p) => p.encode(out),
            Payload::User(p) => p.encode(out),
            Payload::Unknown { data, .. } => out.write(data),
        }
    }
}

impl From<Emission> for Payload {
    fn from(p: Emission) -> Self {
        Payload::Emission(p)
    }
}

impl From<Transfer> for Payload {
    fn from(p: Transfer) -> Self {
        Payload::Transfer(p)
    }
}

impl From<User> for Payload {
    fn from(p: User) -> Self {
        Payload::User(p)
    }
}

/// Reads the leading version varint and rejects versions this build cannot
/// decode.
pub(crate) fn read_version(input: &mut &[u8]) -> Result<u32, DecodeError> {
    match u32::decode(input)? {
        PAYLOAD_VERSION => Ok(PAYLOAD_VERSION),
        _ => Err(DecodeError::InvalidValue),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::asset::Asset;
    use crate::types::number::Number;
    use crate::utils::test_utils::utils::{TestChain, key};

    #[test]
    fn encoding_omits_the_type_tag() {
        let user = User::new("alice", 3, vec![1, 2]);
        let payload = Payload::from(user.clone());
        assert_eq!(payload.to_bytes(), user.to_bytes());
        assert_eq!(payload.tx_type(), TX_USER);
    }

    #[test]
    fn unknown_payload_keeps_raw_bytes_and_refuses_to_run() {
        let chain = TestChain::new();
        let payload = Payload::Unknown {
            tx_type: 77,
            data: vec![9, 8, 7],
        };
        assert_eq!(payload.to_bytes(), vec![9, 8, 7]);

        let tx = Envelope::new(
            &chain.cfg,
            &key(1),
            &Transfer::single(Asset::like(), Number::from(1), key(2).public_key().address(), 1)
                .into(),
        );
        assert_eq!(
            payload.verify(&tx, &chain.cfg),
            Err(TxError::UnsupportedTxType(77))
        );
    }

    #[test]
    fn future_versions_are_rejected() {
        let mut bytes = User::new("alice", 0, Vec::new()).to_bytes();
        bytes[0] = 1;
        assert_eq!(User::from_bytes(&bytes), Err(DecodeError::InvalidValue));
    }
}
