//! Nickname registration.

use crate::core::config::ChainConfig;
use crate::core::payload::{PAYLOAD_VERSION, TX_USER, TxObject, TxType, read_version};
use crate::core::transaction::{Envelope, TxError};
use crate::state::StateLedger;
use crate::types::asset::Asset;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::number::Number;
use regex::Regex;
use std::sync::LazyLock;

static NICKNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9\-]{2,20}$").expect("static pattern compiles"));

/// True for 3 to 21 characters of lowercase letters, digits and dashes,
/// starting with a letter.
pub fn is_valid_nickname(nick: &str) -> bool {
    NICKNAME.is_match(nick)
}

/// Binds `nick` to the sender's address by setting the `Name(nick)` slot
/// of that address to 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub nick: String,
    pub referrer_id: u64,
    pub data: Vec<u8>,
}

impl User {
    pub fn new(nick: impl Into<String>, referrer_id: u64, data: Vec<u8>) -> Self {
        Self {
            nick: nick.into(),
            referrer_id,
            data,
        }
    }
}

impl TxObject for User {
    fn tx_type(&self) -> TxType {
        TX_USER
    }

    fn verify(&self, _tx: &Envelope, cfg: &ChainConfig) -> Result<(), TxError> {
        if !is_valid_nickname(&self.nick) {
            return Err(TxError::InvalidNickname(self.nick.clone()));
        }
        if self.data.len() > cfg.max_user_data_size {
            return Err(TxError::UserDataTooLong {
                size: self.data.len(),
                limit: cfg.max_user_data_size,
            });
        }
        Ok(())
    }

    fn execute(
        &self,
        tx: &Envelope,
        _cfg: &ChainConfig,
        state: &mut StateLedger<'_>,
    ) -> Result<(), TxError> {
        state.set(&Asset::name(&self.nick), &tx.sender_address(), Number::from(1), 0)?;
        Ok(())
    }
}

impl Encode for User {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        PAYLOAD_VERSION.encode(out);
        self.nick.encode(out);
        self.referrer_id.encode(out);
        self.data.encode(out);
    }
}

impl Decode for User {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        read_version(input)?;
        Ok(Self {
            nick: String::decode(input)?,
            referrer_id: u64::decode(input)?,
            data: Vec::decode(input)?,
        })
    }
}
