//! Transaction type → payload decoder table.
//!
//! Built once at startup and passed by reference into every decode path.

use crate::core::payload::{
    Emission, Payload, TX_EMISSION, TX_TRANSFER, TX_USER, Transfer, TxType, User,
};
use crate::core::transaction::{Envelope, TxError};
use crate::types::encoding::{Decode, DecodeError};
use ledger_derive::Error;
use std::collections::HashMap;

/// Decodes payload bytes into a typed payload.
pub type PayloadDecoder = fn(&[u8]) -> Result<Payload, DecodeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("transaction type {0} is already registered")]
    AlreadyRegistered(TxType),
}

#[derive(Clone, Default)]
pub struct Registry {
    decoders: HashMap<TxType, PayloadDecoder>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with emission, transfer and user registration.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.decoders.insert(TX_EMISSION, |data| {
            Emission::from_bytes(data).map(Payload::Emission)
        });
        registry.decoders.insert(TX_TRANSFER, |data| {
            Transfer::from_bytes(data).map(Payload::Transfer)
        });
        registry
            .decoders
            .insert(TX_USER, |data| User::from_bytes(data).map(Payload::User));
        registry
    }

    pub fn register(&mut self, tx_type: TxType, decoder: PayloadDecoder) -> Result<(), RegistryError> {
        if self.decoders.contains_key(&tx_type) {
            return Err(RegistryError::AlreadyRegistered(tx_type));
        }
        self.decoders.insert(tx_type, decoder);
        Ok(())
    }

    pub fn is_registered(&self, tx_type: TxType) -> bool {
        self.decoders.contains_key(&tx_type)
    }

    pub fn decode_payload(&self, tx_type: TxType, data: &[u8]) -> Result<Payload, TxError> {
        let decoder = self
            .decoders
            .get(&tx_type)
            .ok_or(TxError::UnsupportedTxType(tx_type))?;
        Ok(decoder(data)?)
    }

    /// Decodes envelope bytes and the payload they carry.
    pub fn decode(&self, bytes: &[u8]) -> Result<(Envelope, Payload), TxError> {
        let tx = Envelope::from_bytes(bytes)?;
        let payload = self.decode_payload(tx.tx_type, &tx.data)?;
        Ok((tx, payload))
    }

    /// Like [`Registry::decode`], but keeps transactions of unregistered
    /// types as [`Payload::Unknown`] instead of failing.
    pub fn decode_stored(&self, bytes: &[u8]) -> Result<(Envelope, Payload), TxError> {
        let tx = Envelope::from_bytes(bytes)?;
        let payload = match self.decode_payload(tx.tx_type, &tx.data) {
            Err(TxError::UnsupportedTxType(tx_type)) => Payload::Unknown {
                tx_type,
                data: tx.data.clone(),
            },
            other => other?,
        };
        Ok((tx, payload))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.decoders.keys().collect();
        types.sort();
        f.debug_struct("Registry").field("types", &types).finish()
    }
}
