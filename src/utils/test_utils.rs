//! Test utilities for ledger testing.

#[cfg(test)]
pub mod utils {
    use crate::core::blockchain::Blockchain;
    use crate::core::config::ChainConfig;
    use crate::core::payload::{Emission, Payload, Transfer, User};
    use crate::core::registry::Registry;
    use crate::core::transaction::Envelope;
    use crate::crypto::key_pair::PrivateKey;
    use crate::state::{EmptyView, StateLedger, Value};
    use crate::storage::chain_store::ChainStore;
    use crate::storage::memory::MemoryStore;
    use crate::types::address::Address;
    use crate::types::asset::Asset;
    use crate::types::number::Number;
    use std::sync::atomic::{AtomicU64, Ordering};

    static SOURCE_COUNTER: AtomicU64 = AtomicU64::new(0);

    /// Deterministic key from a non-zero seed byte.
    pub fn key(seed: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[seed; 32]).expect("seed must be non-zero and below 0xff")
    }

    /// Dev configuration with fixed authority and emission keys, plus
    /// helpers for building signed transactions against it.
    pub struct TestChain {
        pub cfg: ChainConfig,
        pub registry: Registry,
        pub authority: PrivateKey,
        pub emission_key: PrivateKey,
    }

    impl TestChain {
        pub fn new() -> Self {
            Self::with_authority(key(200))
        }

        pub fn with_authority(authority: PrivateKey) -> Self {
            let emission_key = key(201);
            Self {
                cfg: ChainConfig::dev(authority.public_key(), emission_key.public_key()),
                registry: Registry::standard(),
                authority,
                emission_key,
            }
        }

        pub fn chain_store(&self) -> ChainStore<MemoryStore> {
            ChainStore::open(MemoryStore::new(), self.cfg.clone(), self.registry.clone())
                .expect("memory store opens")
        }

        pub fn blockchain(&self) -> Blockchain<MemoryStore> {
            Blockchain::new(self.chain_store())
        }

        /// Emission of `amount` coins to `to` at rate 1, from a fresh source.
        pub fn emission_tx(&self, to: Address, amount: i64) -> Envelope {
            let source = format!("source-{}", SOURCE_COUNTER.fetch_add(1, Ordering::Relaxed));
            let emission =
                Emission::new(Asset::like(), Number::from(1), "test").with_out(to, amount, source, amount);
            Envelope::new(&self.cfg, &self.emission_key, &Payload::from(emission))
        }

        pub fn transfer_tx(&self, from: &PrivateKey, to: Address, amount: i64) -> Envelope {
            let transfer = Transfer::single(Asset::like(), Number::from(amount), to, self.cfg.chain_id);
            Envelope::new(&self.cfg, from, &Payload::from(transfer))
        }

        /// Registration of `nick` by `key(seed)`.
        pub fn user_tx(&self, seed: u8, nick: &str) -> Envelope {
            Envelope::new(&self.cfg, &key(seed), &Payload::from(User::new(nick, 0, Vec::new())))
        }

        /// Values `tx` produces against an empty state.
        pub fn execute(&self, tx: &Envelope) -> Vec<Value> {
            let mut ledger = StateLedger::new(self.cfg.chain_id, &EmptyView);
            tx.execute(&self.cfg, &self.registry, &mut ledger)
                .expect("transaction executes")
        }
    }
}
