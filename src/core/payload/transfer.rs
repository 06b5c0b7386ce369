//! Value transfers from the envelope sender to one or more recipients.

use crate::core::config::ChainConfig;
use crate::core::payload::{PAYLOAD_VERSION, TX_TRANSFER, TxObject, TxType, read_version};
use crate::core::transaction::{Envelope, TxError};
use crate::state::StateLedger;
use crate::types::address::Address;
use crate::types::asset::Asset;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::number::{Number, is_positive};
use ledger_derive::BinaryCodec;

#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct TransferOut {
    pub asset: Asset,
    pub amount: Number,
    /// Sender sub-balance the amount is taken from.
    pub tag: u64,
    pub to: Address,
    /// Recipient memo, recorded as the tag of the credit.
    pub to_memo: u64,
    /// Recipient chain. Outputs to another chain are recorded for settlement
    /// there instead of being credited locally.
    pub to_chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub outs: Vec<TransferOut>,
    pub comment: String,
}

impl Transfer {
    /// One untagged output on `to_chain_id`.
    pub fn single(asset: Asset, amount: Number, to: Address, to_chain_id: u64) -> Self {
        Self {
            outs: vec![TransferOut {
                asset,
                amount,
                tag: 0,
                to,
                to_memo: 0,
                to_chain_id,
            }],
            comment: String::new(),
        }
    }
}

impl TxObject for Transfer {
    fn tx_type(&self) -> TxType {
        TX_TRANSFER
    }

    fn verify(&self, tx: &Envelope, _cfg: &ChainConfig) -> Result<(), TxError> {
        if self.outs.is_empty() {
            return Err(TxError::NoOutputs);
        }
        let sender = tx.sender_address();
        for out in &self.outs {
            if out.to.is_empty() || out.to == sender {
                return Err(TxError::IncorrectOutAddress);
            }
            // counters track external metrics and never move between accounts
            if out.asset.is_counter() {
                return Err(TxError::IncorrectAssetType);
            }
            if !is_positive(&out.amount) {
                return Err(TxError::IncorrectAmount);
            }
        }
        Ok(())
    }

    fn execute(
        &self,
        tx: &Envelope,
        _cfg: &ChainConfig,
        state: &mut StateLedger<'_>,
    ) -> Result<(), TxError> {
        let sender = tx.sender_address();
        for out in &self.outs {
            state.decrement(&out.asset, &sender, &out.amount, out.tag)?;
            if out.to_chain_id == tx.chain_id {
                state.increment(&out.asset, &out.to, &out.amount, out.to_memo)?;
            } else {
                state.cross_chain_set(
                    out.to_chain_id,
                    &out.asset,
                    &out.to,
                    out.amount.clone(),
                    out.to_memo,
                )?;
            }
        }
        Ok(())
    }
}

impl Encode for Transfer {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        PAYLOAD_VERSION.encode(out);
        self.outs.encode(out);
        self.comment.encode(out);
    }
}

impl Decode for Transfer {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        read_version(input)?;
        Ok(Self {
            outs: Vec::decode(input)?,
            comment: String::decode(input)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payload::Payload;
    use crate::state::{StateError, StateView, Value};
    use crate::crypto::key_pair::PrivateKey;
    use crate::utils::test_utils::utils::{TestChain, key};

    /// Every slot starts with 100.
    struct Funded;

    impl StateView for Funded {
        fn balance(&self, _asset: &Asset, _address: &Address) -> Result<Number, StateError> {
            Ok(Number::from(100))
        }
    }

    fn run(chain: &TestChain, sender: &PrivateKey, transfer: Transfer) -> Result<Vec<Value>, TxError> {
        let tx = Envelope::new(&chain.cfg, sender, &Payload::from(transfer));
        let mut ledger = StateLedger::new(chain.cfg.chain_id, &Funded);
        tx.execute(&chain.cfg, &chain.registry, &mut ledger)
    }

    fn bob() -> Address {
        key(11).public_key().address()
    }

    #[test]
    fn local_transfer_debits_and_credits() {
        let chain = TestChain::new();
        let alice = key(10);
        let values = run(
            &chain,
            &alice,
            Transfer::single(Asset::like(), Number::from(30), bob(), chain.cfg.chain_id),
        )
        .unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(values[0].address, alice.public_key().address());
        assert_eq!(values[0].balance, Number::from(70));
        assert_eq!(values[1].address, bob());
        assert_eq!(values[1].balance, Number::from(130));
    }

    #[test]
    fn tags_and_memos_label_the_values() {
        let chain = TestChain::new();
        let mut transfer = Transfer::single(Asset::like(), Number::from(1), bob(), chain.cfg.chain_id);
        transfer.outs[0].tag = 4;
        transfer.outs[0].to_memo = 9;
        let values = run(&chain, &key(10), transfer).unwrap();
        assert_eq!(values[0].tag, 4);
        assert_eq!(values[1].tag, 9);
    }

    #[test]
    fn foreign_chain_output_is_recorded_not_credited() {
        let chain = TestChain::new();
        let foreign = chain.cfg.chain_id + 1;
        let values = run(
            &chain,
            &key(10),
            Transfer::single(Asset::like(), Number::from(30), bob(), foreign),
        )
        .unwrap();

        assert_eq!(values[1].chain_id, foreign);
        assert_eq!(values[1].balance, Number::from(30));
    }

    #[test]
    fn overdraft_is_rejected() {
        let chain = TestChain::new();
        let result = run(
            &chain,
            &key(10),
            Transfer::single(Asset::like(), Number::from(101), bob(), chain.cfg.chain_id),
        );
        assert!(matches!(
            result,
            Err(TxError::State(StateError::InsufficientFunds { .. }))
        ));
    }

    #[test]
    fn later_outputs_see_earlier_debits() {
        let chain = TestChain::new();
        let mut transfer = Transfer::single(Asset::like(), Number::from(60), bob(), chain.cfg.chain_id);
        transfer.outs.push(transfer.outs[0].clone());
        assert!(matches!(
            run(&chain, &key(10), transfer),
            Err(TxError::State(StateError::InsufficientFunds { .. }))
        ));
    }

    #[test]
    fn rejects_invalid_outputs() {
        let chain = TestChain::new();
        let alice = key(10);
        let id = chain.cfg.chain_id;

        let empty = Transfer {
            outs: Vec::new(),
            comment: String::new(),
        };
        assert_eq!(run(&chain, &alice, empty), Err(TxError::NoOutputs));

        let to_self = Transfer::single(Asset::like(), Number::from(1), alice.public_key().address(), id);
        assert_eq!(run(&chain, &alice, to_self), Err(TxError::IncorrectOutAddress));

        let to_nil = Transfer::single(Asset::like(), Number::from(1), Address::NIL, id);
        assert_eq!(run(&chain, &alice, to_nil), Err(TxError::IncorrectOutAddress));

        let zero = Transfer::single(Asset::like(), Number::from(0), bob(), id);
        assert_eq!(run(&chain, &alice, zero), Err(TxError::IncorrectAmount));

        let negative = Transfer::single(Asset::like(), Number::from(-5), bob(), id);
        assert_eq!(run(&chain, &alice, negative), Err(TxError::IncorrectAmount));

        let counter = Transfer::single(Asset::counter(0, "src"), Number::from(1), bob(), id);
        assert_eq!(run(&chain, &alice, counter), Err(TxError::IncorrectAssetType));
    }

    #[test]
    fn codec_round_trip() {
        let mut transfer = Transfer::single(Asset::like(), Number::from(12), bob(), 3);
        transfer.comment = "rent".into();
        assert_eq!(Transfer::from_bytes(&transfer.to_bytes()).unwrap(), transfer);
    }
}
