//! Balance overlay used while executing transactions.
//!
//! A [`StateLedger`] reads untouched slots through a [`StateView`] and keeps
//! every write in memory. Nested ledgers from [`StateLedger::sub_state`] read
//! through their parent; the parent only sees their writes once the caller
//! passes them to [`StateLedger::apply`].

use crate::state::StateError;
use crate::state::value::Value;
use crate::types::address::Address;
use crate::types::asset::Asset;
use crate::types::number::{Number, is_negative};
use num_traits::Zero;
use std::collections::HashMap;

/// Read-only balance lookup for slots a ledger has not touched yet.
pub trait StateView {
    fn balance(&self, asset: &Asset, address: &Address) -> Result<Number, StateError>;
}

/// View over no history: every balance is zero.
pub struct EmptyView;

impl StateView for EmptyView {
    fn balance(&self, _asset: &Asset, _address: &Address) -> Result<Number, StateError> {
        Ok(Number::zero())
    }
}

type Slot = (Asset, Address);

pub struct StateLedger<'v> {
    chain_id: u64,
    view: &'v dyn StateView,
    vals: HashMap<Slot, Number>,
    sets: Vec<Value>,
}

impl<'v> StateLedger<'v> {
    pub fn new(chain_id: u64, view: &'v dyn StateView) -> Self {
        Self {
            chain_id,
            view,
            vals: HashMap::new(),
            sets: Vec::new(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Current balance of a slot. Lookups are cached in the overlay.
    pub fn get(&mut self, asset: &Asset, address: &Address) -> Result<Number, StateError> {
        let slot = (asset.clone(), *address);
        if let Some(balance) = self.vals.get(&slot) {
            return Ok(balance.clone());
        }
        let balance = self.view.balance(asset, address)?;
        self.vals.insert(slot, balance.clone());
        Ok(balance)
    }

    pub fn increment(
        &mut self,
        asset: &Asset,
        address: &Address,
        amount: &Number,
        tag: u64,
    ) -> Result<(), StateError> {
        if is_negative(amount) {
            return Err(StateError::InvalidAmount(amount.clone()));
        }
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self.get(asset, address)? + amount;
        self.set(asset, address, balance, tag)
    }

    /// Subtracts `amount`. Counter assets may go negative; everything else
    /// fails with [`StateError::InsufficientFunds`] and leaves the overlay
    /// untouched.
    pub fn decrement(
        &mut self,
        asset: &Asset,
        address: &Address,
        amount: &Number,
        tag: u64,
    ) -> Result<(), StateError> {
        if is_negative(amount) {
            return Err(StateError::InvalidAmount(amount.clone()));
        }
        if amount.is_zero() {
            return Ok(());
        }
        let current = self.get(asset, address)?;
        if &current < amount && !asset.is_counter() {
            return Err(StateError::InsufficientFunds {
                asset: asset.clone(),
                address: *address,
                balance: current,
                amount: amount.clone(),
            });
        }
        self.set(asset, address, current - amount, tag)
    }

    /// Overwrites a local slot.
    pub fn set(
        &mut self,
        asset: &Asset,
        address: &Address,
        balance: Number,
        tag: u64,
    ) -> Result<(), StateError> {
        self.cross_chain_set(self.chain_id, asset, address, balance, tag)
    }

    /// Records a write for `chain_id`. Writes for other chains are kept for
    /// settlement there and leave local balances alone.
    pub fn cross_chain_set(
        &mut self,
        chain_id: u64,
        asset: &Asset,
        address: &Address,
        balance: Number,
        tag: u64,
    ) -> Result<(), StateError> {
        if is_negative(&balance) && !asset.is_counter() {
            return Err(StateError::NegativeBalance {
                asset: asset.clone(),
                balance,
            });
        }
        self.record(Value {
            chain_id,
            asset: asset.clone(),
            address: *address,
            tag,
            balance,
        });
        Ok(())
    }

    fn record(&mut self, value: Value) {
        if value.chain_id == self.chain_id {
            self.vals
                .insert((value.asset.clone(), value.address), value.balance.clone());
        }
        self.sets.push(value);
    }

    /// Nested ledger reading through this one.
    pub fn sub_state(&self) -> StateLedger<'_> {
        StateLedger::new(self.chain_id, self)
    }

    /// Merges values produced by a sub-state.
    pub fn apply(&mut self, values: &[Value]) {
        for value in values {
            self.record(value.clone());
        }
    }

    /// Runs `f` on a sub-state. On success its values are applied here and
    /// returned; on failure nothing is applied.
    pub fn execute<E>(
        &mut self,
        f: impl FnOnce(&mut StateLedger<'_>) -> Result<(), E>,
    ) -> Result<Vec<Value>, E> {
        let values = {
            let mut sub = self.sub_state();
            f(&mut sub)?;
            sub.into_values()
        };
        self.apply(&values);
        Ok(values)
    }

    /// Recorded values in write order.
    pub fn values(&self) -> &[Value] {
        &self.sets
    }

    pub fn into_values(self) -> Vec<Value> {
        self.sets
    }
}

impl StateView for StateLedger<'_> {
    fn balance(&self, asset: &Asset, address: &Address) -> Result<Number, StateError> {
        match self.vals.get(&(asset.clone(), *address)) {
            Some(balance) => Ok(balance.clone()),
            None => self.view.balance(asset, address),
        }
    }
}
