//! Minting against external sources.
//!
//! Each output reports the current value of an external source counter and
//! the part of it (`delta`) not yet paid out. The counter slot is set to the
//! reported value, which leaves an audit trail, and the recipient is credited
//! `delta × rate` coins.

use crate::core::config::ChainConfig;
use crate::core::payload::{PAYLOAD_VERSION, TX_EMISSION, TxObject, TxType, read_version};
use crate::core::transaction::{Envelope, TxError};
use crate::state::StateLedger;
use crate::types::address::Address;
use crate::types::asset::{Asset, counter_address};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::number::{Number, is_negative};
use ledger_derive::BinaryCodec;

#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct EmissionOut {
    /// Recipient; may be empty when `delta` is zero.
    pub address: Address,
    pub delta: i64,
    pub source_id: String,
    pub source_value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub asset: Asset,
    /// Coins minted per unit of `delta`.
    pub rate: Number,
    pub comment: String,
    pub outs: Vec<EmissionOut>,
}

impl Emission {
    pub fn new(asset: Asset, rate: Number, comment: impl Into<String>) -> Self {
        Self {
            asset,
            rate,
            comment: comment.into(),
            outs: Vec::new(),
        }
    }

    /// Adds an output crediting `address` with `delta` units of `source_id`.
    pub fn with_out(
        mut self,
        address: Address,
        delta: i64,
        source_id: impl Into<String>,
        source_value: i64,
    ) -> Self {
        self.outs.push(EmissionOut {
            address,
            delta,
            source_id: source_id.into(),
            source_value,
        });
        self
    }

    pub fn total_delta(&self) -> i64 {
        self.outs.iter().map(|out| out.delta).sum()
    }

    /// Coins minted over all outputs.
    pub fn total_amount(&self) -> Number {
        Number::from(self.total_delta()) * &self.rate
    }

    pub fn out_by_source(&self, source_id: &str) -> Option<&EmissionOut> {
        self.outs.iter().find(|out| out.source_id == source_id)
    }
}

impl TxObject for Emission {
    fn tx_type(&self) -> TxType {
        TX_EMISSION
    }

    fn verify(&self, tx: &Envelope, cfg: &ChainConfig) -> Result<(), TxError> {
        if tx.sender != cfg.emission {
            return Err(TxError::IncorrectSender);
        }
        if !self.asset.is_coin() {
            return Err(TxError::IncorrectAssetType);
        }
        if is_negative(&self.rate) {
            return Err(TxError::IncorrectRate);
        }
        for out in &self.outs {
            if out.delta < 0 || out.source_value < 0 || out.delta > out.source_value {
                return Err(TxError::IncorrectDelta);
            }
            if out.source_id.is_empty() {
                return Err(TxError::EmptySourceId);
            }
            if out.address.is_empty() && out.delta > 0 {
                return Err(TxError::EmptyAddress);
            }
        }
        Ok(())
    }

    fn execute(
        &self,
        _tx: &Envelope,
        _cfg: &ChainConfig,
        state: &mut StateLedger<'_>,
    ) -> Result<(), TxError> {
        for out in &self.outs {
            state.set(
                &self.asset.source_counter(&out.source_id),
                &counter_address(&out.source_id),
                Number::from(out.source_value),
                0,
            )?;
            if !out.address.is_empty() && out.delta > 0 {
                let amount = Number::from(out.delta) * &self.rate;
                state.increment(&self.asset, &out.address, &amount, 0)?;
            }
        }
        Ok(())
    }
}

impl Encode for Emission {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        PAYLOAD_VERSION.encode(out);
        self.asset.encode(out);
        self.rate.encode(out);
        self.comment.encode(out);
        self.outs.encode(out);
    }
}

impl Decode for Emission {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        read_version(input)?;
        Ok(Self {
            asset: Asset::decode(input)?,
            rate: Number::decode(input)?,
            comment: String::decode(input)?,
            outs: Vec::decode(input)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payload::Payload;
    use crate::state::EmptyView;
    use crate::utils::test_utils::utils::{TestChain, key};
    use num_traits::Zero;

    fn emit(chain: &TestChain, emission: Emission) -> Result<Vec<crate::state::Value>, TxError> {
        let tx = Envelope::new(&chain.cfg, &chain.emission_key, &Payload::from(emission));
        let mut ledger = StateLedger::new(chain.cfg.chain_id, &EmptyView);
        tx.execute(&chain.cfg, &chain.registry, &mut ledger)
    }

    fn alice() -> Address {
        key(10).public_key().address()
    }

    #[test]
    fn credits_recipient_and_sets_source_counter() {
        let chain = TestChain::new();
        let emission = Emission::new(Asset::like(), Number::from(2), "payout")
            .with_out(alice(), 50, "post-1", 120);
        let values = emit(&chain, emission).unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(values[0].asset, Asset::like().source_counter("post-1"));
        assert_eq!(values[0].address, counter_address("post-1"));
        assert_eq!(values[0].balance, Number::from(120));
        assert_eq!(values[1].asset, Asset::like());
        assert_eq!(values[1].address, alice());
        assert_eq!(values[1].balance, Number::from(100));
    }

    #[test]
    fn totals_and_source_lookup() {
        let emission = Emission::new(Asset::like(), Number::from(3), "")
            .with_out(alice(), 4, "a", 10)
            .with_out(Address::NIL, 0, "b", 7)
            .with_out(alice(), 6, "c", 6);
        assert_eq!(emission.total_delta(), 10);
        assert_eq!(emission.total_amount(), Number::from(30));
        assert_eq!(emission.out_by_source("b").map(|out| out.source_value), Some(7));
        assert!(emission.out_by_source("d").is_none());
    }

    #[test]
    fn zero_delta_only_touches_the_counter() {
        let chain = TestChain::new();
        let emission =
            Emission::new(Asset::like(), Number::from(1), "").with_out(Address::NIL, 0, "src", 5);
        let values = emit(&chain, emission).unwrap();
        assert_eq!(values.len(), 1);
        assert!(values[0].asset.is_counter());
    }

    #[test]
    fn only_the_emission_key_may_emit() {
        let chain = TestChain::new();
        let emission =
            Emission::new(Asset::like(), Number::from(1), "").with_out(alice(), 1, "s", 1);
        let tx = Envelope::new(&chain.cfg, &key(3), &Payload::from(emission));
        assert_eq!(
            tx.verify(&chain.cfg, &chain.registry),
            Err(TxError::IncorrectSender)
        );
    }

    #[test]
    fn rejects_invalid_outputs() {
        let chain = TestChain::new();
        let base = || Emission::new(Asset::like(), Number::from(1), "");

        let cases = [
            (base().with_out(alice(), -1, "s", 5), TxError::IncorrectDelta),
            (base().with_out(alice(), 6, "s", 5), TxError::IncorrectDelta),
            (base().with_out(alice(), 0, "s", -1), TxError::IncorrectDelta),
            (base().with_out(alice(), 1, "", 5), TxError::EmptySourceId),
            (base().with_out(Address::NIL, 1, "s", 5), TxError::EmptyAddress),
        ];
        for (emission, expected) in cases {
            assert_eq!(emit(&chain, emission), Err(expected));
        }
    }

    #[test]
    fn rejects_negative_rate_and_non_coin_asset() {
        let chain = TestChain::new();
        let negative = Emission::new(Asset::like(), Number::from(-1), "").with_out(alice(), 1, "s", 1);
        assert_eq!(emit(&chain, negative), Err(TxError::IncorrectRate));

        let name = Emission::new(Asset::name("bob"), Number::zero(), "").with_out(alice(), 1, "s", 1);
        assert_eq!(emit(&chain, name), Err(TxError::IncorrectAssetType));
    }

    #[test]
    fn emission_is_exempt_from_the_size_limit() {
        let mut chain = TestChain::new();
        chain.cfg.max_tx_data_size = 8;
        let emission =
            Emission::new(Asset::like(), Number::from(1), "a long comment").with_out(alice(), 1, "s", 1);
        assert!(emit(&chain, emission).is_ok());
    }

    #[test]
    fn codec_round_trip() {
        let emission = Emission::new(Asset::like(), Number::from(1_000_000), "c")
            .with_out(alice(), 3, "x", 4)
            .with_out(Address::NIL, 0, "y", 0);
        assert_eq!(Emission::from_bytes(&emission.to_bytes()).unwrap(), emission);
    }
}
