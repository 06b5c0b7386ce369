//! Block production on top of a [`ChainStore`].

use crate::core::block::{Block, BlockItem, Header};
use crate::core::transaction::Envelope;
use crate::crypto::key_pair::PrivateKey;
use crate::storage::chain_store::{ChainError, ChainStore};
use crate::storage::kv::{KvStore, Table};
use crate::trie::PatriciaTrie;
use crate::{debug, info, warn};
use crate::utils::log::Timestamp;

/// The single-authority chain: committed history plus the block producer.
pub struct Blockchain<S: KvStore> {
    store: ChainStore<S>,
}

impl<S: KvStore> Blockchain<S> {
    pub fn new(store: ChainStore<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ChainStore<S> {
        &self.store
    }

    pub fn into_store(self) -> ChainStore<S> {
        self.store
    }

    /// Height of the chain tip.
    pub fn height(&self) -> u64 {
        self.store.last_block().num()
    }

    /// Builds and signs the next block from `candidates`, in order.
    ///
    /// Candidates whose id is already in history (or earlier in the list),
    /// that fail verification or execution, or that register a taken user or
    /// nickname are dropped. Returns `None` when no candidate survives.
    ///
    /// All trie writes go to a throw-away batch; the block only becomes part
    /// of the chain through [`Blockchain::append`].
    pub fn generate_new_block(
        &self,
        candidates: &[Envelope],
        signer: &PrivateKey,
        nonce: u64,
    ) -> Result<Option<Block>, ChainError> {
        let prev = &self.store.last_block().header;
        let num = prev.num + 1;
        let mut batch = self.store.batch();
        let mut state_trie = PatriciaTrie::new(Table::StateTrie);

        let mut items = Vec::with_capacity(candidates.len());
        for tx in candidates {
            match self
                .store
                .apply_tx(&mut batch, &mut state_trie, num, items.len(), tx)
            {
                Ok((values, _)) => {
                    let mut tx = tx.clone();
                    tx.state_updates = values;
                    items.push(BlockItem::from(tx));
                }
                Err(err) if err.is_tx_rejection() => {
                    warn!("Dropped transaction {} from block {}: {}", tx.id(), num, err);
                }
                Err(err) => return Err(err),
            }
        }
        if items.is_empty() {
            debug!("No transaction survived for block {}", num);
            return Ok(None);
        }

        let mut header = Header::child_of(prev, Timestamp::now().0.max(prev.timestamp));
        header.nonce = nonce;
        header.tx_root = Block::tx_root(&items);
        header.state_root = state_trie.root(&batch)?;
        // the miner is hashed, so it must be in place before the chain trie entry
        header.miner = Some(signer.public_key());
        let mut chain_trie = PatriciaTrie::new(Table::ChainTrie);
        header.chain_root = chain_trie.put(&mut batch, &num.to_be_bytes(), header.hash().as_slice())?;
        header.sign(signer);

        info!(
            "Generated block {} ({}) with {} of {} transactions",
            num,
            header.hash(),
            items.len(),
            candidates.len()
        );
        Ok(Some(Block { header, items }))
    }

    /// Verifies and commits `block` as the new tip.
    pub fn append(&mut self, block: Block) -> Result<(), ChainError> {
        self.store.put_block(block)
    }

    /// Generates the next block from `candidates` and commits it.
    pub fn produce(
        &mut self,
        candidates: &[Envelope],
        signer: &PrivateKey,
    ) -> Result<Option<Block>, ChainError> {
        let Some(block) = self.generate_new_block(candidates, signer, 0)? else {
            return Ok(None);
        };
        self.append(block.clone())?;
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::BlockError;
    use crate::types::asset::Asset;
    use crate::types::number::Number;
    use crate::utils::test_utils::utils::{TestChain, key};

    #[test]
    fn produced_block_verifies_against_tip() {
        let chain = TestChain::new();
        let bc = chain.blockchain();
        let a = key(10).public_key().address();
        let block = bc
            .generate_new_block(&[chain.emission_tx(a, 100)], &chain.authority, 42)
            .unwrap()
            .unwrap();

        assert_eq!(block.num(), 1);
        assert_eq!(block.header.nonce, 42);
        assert_eq!(block.header.miner, Some(chain.authority.public_key()));
        assert_eq!(
            block.verify(Some(&bc.store().last_block().header), &chain.cfg),
            Ok(())
        );
        // generating does not touch the store
        assert_eq!(bc.height(), 0);
        assert_eq!(bc.store().balance(&Asset::like(), &a).unwrap(), Number::from(0));
    }

    #[test]
    fn generated_block_commits_under_its_signed_hash() {
        let chain = TestChain::new();
        let mut bc = chain.blockchain();
        let a = key(10).public_key().address();
        let block = bc
            .generate_new_block(&[chain.emission_tx(a, 100)], &chain.authority, 0)
            .unwrap()
            .unwrap();

        assert_eq!(bc.append(block.clone()), Ok(()));
        assert_eq!(bc.height(), 1);
        let (hash, _, root) = bc.store().block_proof(1).unwrap();
        assert_eq!(hash, Some(block.hash()));
        assert_eq!(root, block.header.chain_root);
    }

    #[test]
    fn failing_transactions_are_dropped() {
        let chain = TestChain::new();
        let mut bc = chain.blockchain();
        let a = key(10).public_key().address();
        let b = key(11).public_key().address();

        let block = bc
            .produce(
                &[
                    chain.transfer_tx(&key(10), b, 1),
                    chain.emission_tx(a, 5),
                    chain.transfer_tx(&key(10), b, 6),
                    chain.transfer_tx(&key(10), b, 5),
                ],
                &chain.authority,
            )
            .unwrap()
            .unwrap();

        // the first transfer runs before the emission, the third overdraws
        assert_eq!(block.items.len(), 2);
        assert_eq!(bc.store().balance(&Asset::like(), &a).unwrap(), Number::from(0));
        assert_eq!(bc.store().balance(&Asset::like(), &b).unwrap(), Number::from(5));
    }

    #[test]
    fn nothing_to_include_yields_no_block() {
        let chain = TestChain::new();
        let mut bc = chain.blockchain();
        let b = key(11).public_key().address();
        assert_eq!(bc.produce(&[], &chain.authority), Ok(None));
        assert_eq!(
            bc.produce(&[chain.transfer_tx(&key(10), b, 1)], &chain.authority),
            Ok(None)
        );
        assert_eq!(bc.height(), 0);
    }

    #[test]
    fn duplicate_ids_are_excluded() {
        let chain = TestChain::new();
        let mut bc = chain.blockchain();
        let a = key(10).public_key().address();
        let emission = chain.emission_tx(a, 100);

        let first = bc
            .produce(&[emission.clone(), emission.clone()], &chain.authority)
            .unwrap()
            .unwrap();
        assert_eq!(first.items.len(), 1);

        let b = key(11).public_key().address();
        let second = bc
            .produce(&[emission, chain.transfer_tx(&key(10), b, 1)], &chain.authority)
            .unwrap()
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(bc.store().balance(&Asset::like(), &a).unwrap(), Number::from(99));
    }

    #[test]
    fn blocks_chain_by_height_and_time() {
        let chain = TestChain::new();
        let mut bc = chain.blockchain();
        let a = key(10).public_key().address();
        let first = bc
            .produce(&[chain.emission_tx(a, 1)], &chain.authority)
            .unwrap()
            .unwrap();
        let second = bc
            .produce(&[chain.emission_tx(a, 2)], &chain.authority)
            .unwrap()
            .unwrap();

        assert_eq!(second.num(), 2);
        assert_eq!(second.header.prev_hash, first.hash());
        assert!(second.header.timestamp >= first.header.timestamp);
        assert_eq!(bc.height(), 2);
    }

    #[test]
    fn block_signed_by_another_key_is_rejected() {
        let chain = TestChain::new();
        let mut bc = chain.blockchain();
        let a = key(10).public_key().address();
        let block = bc
            .generate_new_block(&[chain.emission_tx(a, 1)], &key(99), 0)
            .unwrap()
            .unwrap();
        assert_eq!(
            bc.append(block),
            Err(ChainError::Block(BlockError::InvalidMinerKey))
        );
    }
}
