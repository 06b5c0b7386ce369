//! Running chain totals, updated with every committed block.

use crate::core::payload::{Emission, Payload};
use crate::types::asset::Asset;
use crate::types::number::Number;
use ledger_derive::BinaryCodec;

#[derive(Debug, Clone, Default, PartialEq, Eq, BinaryCodec)]
pub struct Statistic {
    /// Height of the last counted block.
    pub blocks: u64,
    pub txs: u64,
    pub users: u64,
    pub coins: Vec<CoinStatistic>,
}

/// Emission totals of one coin.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct CoinStatistic {
    pub asset: Asset,
    /// Source units paid out so far.
    pub likes: i64,
    /// Rate of the latest emission.
    pub rate: Number,
    pub supply: Number,
}

impl CoinStatistic {
    fn empty(asset: &Asset) -> Self {
        Self {
            asset: asset.clone(),
            likes: 0,
            rate: Number::default(),
            supply: Number::default(),
        }
    }
}

impl Statistic {
    pub fn coin(&self, asset: &Asset) -> CoinStatistic {
        self.coins
            .iter()
            .find(|c| &c.asset == asset)
            .cloned()
            .unwrap_or_else(|| CoinStatistic::empty(asset))
    }

    fn coin_mut(&mut self, asset: &Asset) -> &mut CoinStatistic {
        match self.coins.iter().position(|c| &c.asset == asset) {
            Some(i) => &mut self.coins[i],
            None => {
                self.coins.push(CoinStatistic::empty(asset));
                let last = self.coins.len() - 1;
                &mut self.coins[last]
            }
        }
    }

    pub fn refresh(&mut self, emission: &Emission) {
        let coin = self.coin_mut(&emission.asset);
        coin.rate = emission.rate.clone();
        coin.likes += emission.total_delta();
        coin.supply += emission.total_amount();
    }

    /// Counts one committed transaction.
    pub fn record(&mut self, payload: &Payload) {
        self.txs += 1;
        match payload {
            Payload::Emission(emission) => self.refresh(emission),
            Payload::User(_) => self.users += 1,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payload::{Transfer, User};
    use crate::types::address::Address;
    use crate::types::encoding::{Decode, Encode};

    #[test]
    fn emissions_accumulate_per_coin() {
        let mut stat = Statistic::default();
        let first = Emission::new(Asset::like(), Number::from(2), "").with_out(Address::NIL, 0, "a", 3);
        let second = Emission::new(Asset::like(), Number::from(5), "")
            .with_out(Address([1; 24]), 4, "b", 4)
            .with_out(Address([2; 24]), 1, "c", 9);
        stat.record(&Payload::from(first));
        stat.record(&Payload::from(second));

        let like = stat.coin(&Asset::like());
        assert_eq!(like.likes, 5);
        assert_eq!(like.rate, Number::from(5));
        assert_eq!(like.supply, Number::from(25));
        assert_eq!(stat.txs, 2);
        assert_eq!(stat.coins.len(), 1);

        let other = stat.coin(&Asset::coin(9));
        assert_eq!(other.supply, Number::from(0));
    }

    #[test]
    fn users_and_transfers_are_counted() {
        let mut stat = Statistic::default();
        stat.record(&Payload::from(User::new("alice", 0, Vec::new())));
        stat.record(&Payload::from(Transfer::single(
            Asset::like(),
            Number::from(1),
            Address([3; 24]),
            1,
        )));
        assert_eq!((stat.txs, stat.users), (2, 1));

        let bytes = stat.to_bytes();
        assert_eq!(Statistic::from_bytes(&bytes).unwrap(), stat);
    }
}
