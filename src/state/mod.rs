//! Account-balance state: the execution overlay and the values it records.

pub mod ledger;
pub mod value;

use crate::trie::TrieError;
use crate::types::address::Address;
use crate::types::asset::Asset;
use crate::types::number::Number;
use ledger_derive::Error;

pub use ledger::{EmptyView, StateLedger, StateView};
pub use value::{Value, state_key, values_hash};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("amount must not be negative, got {0}")]
    InvalidAmount(Number),
    #[error("insufficient funds: {address} holds {balance} {asset}, needs {amount}")]
    InsufficientFunds {
        asset: Asset,
        address: Address,
        balance: Number,
        amount: Number,
    },
    #[error("negative balance {balance} for {asset}")]
    NegativeBalance { asset: Asset, balance: Number },
    #[error("state lookup failed: {0}")]
    Lookup(#[from] TrieError),
}
