//! Block history, indexes and the two authenticated tries over a [`KvStore`].
//!
//! A block is committed in one [`Batch`]: every transaction is re-executed
//! against the staged state and must reproduce the values recorded in the
//! block, after which both trie roots are recomputed and compared with the
//! header. Any failure drops the batch, so a rejected block leaves no trace.
//!
//! Alongside the blocks the store keeps per-asset balance history (by asset,
//! by address and by tagged address), the latest emission of every external
//! source and a running [`Statistic`].

use crate::core::block::{Block, BlockError, BlockItem, Header};
use crate::core::config::ChainConfig;
use crate::core::payload::{EmissionOut, Payload, TxObject};
use crate::core::registry::Registry;
use crate::core::transaction::{Envelope, TxError, TxId};
use crate::state::{StateError, StateLedger, StateView, Value, state_key};
use crate::storage::kv::{Batch, KvStore, StoreError, Table};
use crate::storage::statistic::Statistic;
use crate::trie::{PatriciaTrie, TrieError};
use crate::types::address::Address;
use crate::types::asset::Asset;
use crate::types::encoding::{Decode, DecodeError, Encode};
use crate::types::hash::Hash;
use crate::types::merkle_tree::Proof;
use crate::types::number::{Number, number_from_bytes};
use crate::{info, warn};
use ledger_derive::Error;

const LAST_BLOCK_KEY: &[u8] = b"last_block";
const STATISTIC_KEY: &[u8] = b"statistic";

/// Page size of history queries given a zero limit.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("storage: {0}")]
    Store(#[from] StoreError),
    #[error("trie: {0}")]
    Trie(#[from] TrieError),
    #[error("stored record is malformed: {0}")]
    Decode(#[from] DecodeError),
    #[error("block: {0}")]
    Block(#[from] BlockError),
    #[error("transaction: {0}")]
    Tx(#[from] TxError),
    #[error("transaction {0} is already registered")]
    TxAlreadyRegistered(TxId),
    #[error("state updates of transaction {index} do not match re-execution")]
    StateMismatch { index: usize },
    #[error("user {0} is already registered")]
    UserAlreadyRegistered(Address),
    #[error("nickname {0:?} is taken")]
    NameTaken(String),
    #[error("state root mismatch: computed {expected}, header has {actual}")]
    InvalidStateRoot { expected: Hash, actual: Hash },
    #[error("chain root mismatch: computed {expected}, header has {actual}")]
    InvalidChainRoot { expected: Hash, actual: Hash },
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("stored genesis block does not match the configuration")]
    GenesisMismatch,
}

impl From<StateError> for ChainError {
    fn from(err: StateError) -> Self {
        ChainError::Tx(TxError::State(err))
    }
}

impl ChainError {
    /// True for errors caused by the transaction itself rather than by the
    /// storage underneath. The block producer drops such transactions.
    pub fn is_tx_rejection(&self) -> bool {
        matches!(
            self,
            ChainError::Tx(_)
                | ChainError::TxAlreadyRegistered(_)
                | ChainError::UserAlreadyRegistered(_)
                | ChainError::NameTaken(_)
        )
    }
}

/// Position of a transaction in history: block number in the high 32 bits,
/// index inside the block in the low 32.
pub fn tx_uid(block_num: u64, index: usize) -> u64 {
    (block_num << 32) | (index as u64 & 0xffff_ffff)
}

/// Splits a [`tx_uid`] back into block number and index.
pub fn split_tx_uid(uid: u64) -> (u64, usize) {
    (uid >> 32, (uid & 0xffff_ffff) as usize)
}

fn read_u64(bytes: &[u8]) -> Result<u64, DecodeError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| DecodeError::InvalidValue)?;
    Ok(u64::from_be_bytes(raw))
}

/// Key tail shared by the history indexes.
fn history_suffix(uid: u64, value_index: u32) -> Vec<u8> {
    [&uid.to_be_bytes()[..], &value_index.to_be_bytes()[..]].concat()
}

/// Stages the asset, address and tag history records of a local value.
fn stage_history(batch: &mut Batch, value: &Value, uid: u64, value_index: u32) {
    let balance = value.state_value();
    let slot = value.state_key();
    let suffix = history_suffix(uid, value_index);
    batch.put(
        Table::AssetHistory,
        &[&value.asset.to_bytes()[..], &suffix[..], value.address.as_slice()].concat(),
        balance.clone(),
    );
    batch.put(Table::AddressHistory, &[&slot[..], &suffix[..]].concat(), balance.clone());
    if value.tag != 0 {
        batch.put(
            Table::TagHistory,
            &[&slot[..], &value.tag.to_be_bytes()[..], &suffix[..]].concat(),
            balance,
        );
    }
}

fn source_prefix(asset: &Asset, source_id: &str) -> Vec<u8> {
    (asset, source_id).to_bytes()
}

/// Which history index a query walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryScope {
    /// Every write to the asset, across addresses.
    Asset,
    Address(Address),
    /// Writes to the address carrying this tag.
    Tagged(Address, u64),
}

/// One recorded write with the transaction that made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub tx: Envelope,
    pub block_num: u64,
    pub address: Address,
    /// Balance after the write.
    pub balance: Number,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    pub address: Address,
    /// Address string with the tag as memo.
    pub tagged_address: String,
    pub tag: u64,
    pub asset: Asset,
    /// Balance of the untagged address.
    pub balance: Number,
    /// Hash of the latest transaction writing the (tagged) address.
    pub last_tx: Option<Hash>,
}

/// Balances as staged in `batch`.
struct StagedState<'a, 's> {
    trie: &'a PatriciaTrie,
    batch: &'a Batch<'s>,
}

impl StateView for StagedState<'_, '_> {
    fn balance(&self, asset: &Asset, address: &Address) -> Result<Number, StateError> {
        Ok(self
            .trie
            .get(self.batch, &state_key(asset, address))?
            .map(|bytes| number_from_bytes(&bytes))
            .unwrap_or_default())
    }
}

/// Read-only view of the committed balances.
pub struct Snapshot<'s> {
    trie: PatriciaTrie,
    batch: Batch<'s>,
}

impl StateView for Snapshot<'_> {
    fn balance(&self, asset: &Asset, address: &Address) -> Result<Number, StateError> {
        StagedState {
            trie: &self.trie,
            batch: &self.batch,
        }
        .balance(asset, address)
    }
}

pub struct ChainStore<S: KvStore> {
    store: S,
    cfg: ChainConfig,
    registry: Registry,
    last: Block,
}

impl<S: KvStore> ChainStore<S> {
    /// Opens the chain kept in `store`, writing the genesis block on first use.
    pub fn open(store: S, cfg: ChainConfig, registry: Registry) -> Result<Self, ChainError> {
        let genesis = Block::genesis(&cfg);
        let mut chain = Self {
            store,
            cfg,
            registry,
            last: genesis.clone(),
        };

        match chain.stored_tip()? {
            None => {
                let mut batch = Batch::new(&chain.store);
                Self::stage_header(&mut batch, &genesis.header);
                batch.commit()?;
                info!(
                    "Initialized chain {} on network {} with genesis {}",
                    chain.cfg.chain_id,
                    chain.cfg.network,
                    genesis.hash()
                );
            }
            Some(num) => {
                if chain.block(0)? != genesis {
                    return Err(ChainError::GenesisMismatch);
                }
                chain.last = chain.block(num)?;
                info!("Opened chain {} at block {}", chain.cfg.chain_id, num);
            }
        }
        Ok(chain)
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    pub fn config(&self) -> &ChainConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn last_block(&self) -> &Block {
        &self.last
    }

    /// Number of blocks including genesis.
    pub fn block_count(&self) -> u64 {
        self.last.num() + 1
    }

    /// Empty batch over the committed state.
    pub fn batch(&self) -> Batch<'_> {
        Batch::new(&self.store)
    }

    fn stored_tip(&self) -> Result<Option<u64>, ChainError> {
        match self.batch().get(Table::Meta, LAST_BLOCK_KEY)? {
            Some(bytes) => Ok(Some(read_u64(&bytes)?)),
            None => Ok(None),
        }
    }

    fn stage_header(batch: &mut Batch, header: &Header) {
        batch.put(Table::Blocks, &header.num.to_be_bytes(), header.to_bytes());
        batch.put(Table::Meta, LAST_BLOCK_KEY, header.num.to_be_bytes().to_vec());
    }

    pub fn header(&self, num: u64) -> Result<Header, ChainError> {
        let bytes = self
            .batch()
            .get(Table::Blocks, &num.to_be_bytes())?
            .ok_or(ChainError::BlockNotFound(num))?;
        Ok(Header::from_bytes(&bytes)?)
    }

    pub fn block(&self, num: u64) -> Result<Block, ChainError> {
        let header = self.header(num)?;
        let batch = self.batch();
        let mut items = Vec::new();
        while let Some(bytes) = batch.get(Table::Txs, &tx_uid(num, items.len()).to_be_bytes())? {
            items.push(BlockItem::from(Envelope::from_bytes(&bytes)?));
        }
        Ok(Block { header, items })
    }

    /// Read-only view of the committed balances, for building a [`StateLedger`].
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            trie: PatriciaTrie::new(Table::StateTrie),
            batch: self.batch(),
        }
    }

    pub fn balance(&self, asset: &Asset, address: &Address) -> Result<Number, ChainError> {
        Ok(self.snapshot().balance(asset, address)?)
    }

    /// Committed balance bytes with their inclusion proof and the state root.
    pub fn state_proof(
        &self,
        asset: &Asset,
        address: &Address,
    ) -> Result<(Option<Vec<u8>>, Proof, Hash), ChainError> {
        let mut trie = PatriciaTrie::new(Table::StateTrie);
        Ok(trie.get_proof(&self.batch(), &state_key(asset, address))?)
    }

    /// Hash of block `num` with its inclusion proof under the latest chain root.
    pub fn block_proof(&self, num: u64) -> Result<(Option<Hash>, Proof, Hash), ChainError> {
        let mut trie = PatriciaTrie::new(Table::ChainTrie);
        let (value, proof, root) = trie.get_proof(&self.batch(), &num.to_be_bytes())?;
        let hash = value
            .map(|bytes| Hash::from_slice(&bytes).ok_or(DecodeError::InvalidValue))
            .transpose()?;
        Ok((hash, proof, root))
    }

    pub fn has_tx(&self, id: TxId) -> Result<bool, ChainError> {
        Ok(self.batch().get(Table::TxIndex, &id.to_key())?.is_some())
    }

    fn tx_by_uid(&self, uid: u64) -> Result<Envelope, ChainError> {
        let bytes = self
            .batch()
            .get(Table::Txs, &uid.to_be_bytes())?
            .ok_or_else(|| StoreError::Corrupted(format!("missing transaction {uid:#x}")))?;
        Ok(Envelope::from_bytes(&bytes)?)
    }

    fn uid_in(&self, table: Table, key: &[u8]) -> Result<Option<u64>, ChainError> {
        match self.batch().get(table, key)? {
            Some(bytes) => Ok(Some(read_u64(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The first committed transaction with this id and its block number.
    pub fn tx_by_id(&self, id: TxId) -> Result<Option<(Envelope, u64)>, ChainError> {
        match self.uid_in(Table::TxIndex, &id.to_key())? {
            Some(uid) => Ok(Some((self.tx_by_uid(uid)?, split_tx_uid(uid).0))),
            None => Ok(None),
        }
    }

    /// Registration transaction of the user at `address`.
    pub fn user_tx(&self, address: &Address) -> Result<Option<Envelope>, ChainError> {
        self.uid_in(Table::Users, address.as_slice())?
            .map(|uid| self.tx_by_uid(uid))
            .transpose()
    }

    pub fn name_owner(&self, nick: &str) -> Result<Option<Address>, ChainError> {
        match self.batch().get(Table::Nicks, nick.as_bytes())? {
            Some(bytes) => Ok(Some(Address::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Committed writes to `asset` within `scope`, oldest first unless
    /// `desc`. A zero `limit` means [`DEFAULT_HISTORY_LIMIT`].
    pub fn history(
        &self,
        asset: &Asset,
        scope: HistoryScope,
        offset: usize,
        limit: usize,
        desc: bool,
    ) -> Result<Vec<HistoryEntry>, ChainError> {
        let (table, prefix) = match scope {
            HistoryScope::Asset => (Table::AssetHistory, asset.to_bytes()),
            HistoryScope::Address(address) => (Table::AddressHistory, state_key(asset, &address)),
            HistoryScope::Tagged(address, tag) => (
                Table::TagHistory,
                [&state_key(asset, &address)[..], &tag.to_be_bytes()[..]].concat(),
            ),
        };
        let mut records = self.batch().scan(table, &prefix)?;
        if desc {
            records.reverse();
        }
        let limit = if limit == 0 { DEFAULT_HISTORY_LIMIT } else { limit };

        records
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(key, balance)| -> Result<HistoryEntry, ChainError> {
                let rest = &key[prefix.len()..];
                if rest.len() < 12 {
                    return Err(DecodeError::UnexpectedEof.into());
                }
                let uid = read_u64(&rest[..8])?;
                let address = match scope {
                    HistoryScope::Asset => Address::from_bytes(&rest[12..])?,
                    HistoryScope::Address(address) | HistoryScope::Tagged(address, _) => address,
                };
                Ok(HistoryEntry {
                    tx: self.tx_by_uid(uid)?,
                    block_num: split_tx_uid(uid).0,
                    address,
                    balance: number_from_bytes(&balance),
                })
            })
            .collect()
    }

    /// Latest transaction writing `asset` at `address`, restricted to
    /// writes tagged `tag` unless it is zero.
    pub fn last_tx(&self, address: &Address, tag: u64, asset: &Asset) -> Result<Option<Envelope>, ChainError> {
        let scope = match tag {
            0 => HistoryScope::Address(*address),
            tag => HistoryScope::Tagged(*address, tag),
        };
        Ok(self
            .history(asset, scope, 0, 1, true)?
            .into_iter()
            .next()
            .map(|entry| entry.tx))
    }

    pub fn address_info(&self, address: &Address, tag: u64, asset: &Asset) -> Result<AddressInfo, ChainError> {
        Ok(AddressInfo {
            address: *address,
            tagged_address: address.memo_string(tag),
            tag,
            asset: asset.clone(),
            balance: self.balance(asset, address)?,
            last_tx: self.last_tx(address, tag, asset)?.map(|tx| tx.hash()),
        })
    }

    /// Latest emission reporting `source_id` for `asset`, with its output.
    pub fn last_source_emission(
        &self,
        asset: &Asset,
        source_id: &str,
    ) -> Result<Option<(Envelope, EmissionOut)>, ChainError> {
        let records = self.batch().scan(Table::Sources, &source_prefix(asset, source_id))?;
        let Some((_, uid)) = records.last() else {
            return Ok(None);
        };
        let bytes = self
            .batch()
            .get(Table::Txs, uid)?
            .ok_or_else(|| StoreError::Corrupted(format!("missing emission for source {source_id:?}")))?;
        let (tx, payload) = self.registry.decode_stored(&bytes)?;
        let out = match &payload {
            Payload::Emission(emission) => emission.out_by_source(source_id).cloned(),
            _ => None,
        };
        Ok(out.map(|out| (tx, out)))
    }

    pub fn statistic(&self) -> Result<Statistic, ChainError> {
        match self.batch().get(Table::Meta, STATISTIC_KEY)? {
            Some(bytes) => Ok(Statistic::from_bytes(&bytes)?),
            None => Ok(Statistic::default()),
        }
    }

    /// Transactions committed after genesis.
    pub fn count_txs(&self) -> Result<u64, ChainError> {
        Ok(self.statistic()?.txs)
    }

    /// Coins of `asset` minted so far.
    pub fn total_supply(&self, asset: &Asset) -> Result<Number, ChainError> {
        Ok(self.statistic()?.coin(asset).supply)
    }

    /// Admits `tx` as item `index` of block `num` on top of `batch`: checks it
    /// against history, executes it on the staged state, stages its indexes
    /// and writes its local-chain values into `state_trie`.
    ///
    /// Returns the produced values with the decoded payload. The envelope
    /// record itself is not staged.
    pub(crate) fn apply_tx(
        &self,
        batch: &mut Batch,
        state_trie: &mut PatriciaTrie,
        num: u64,
        index: usize,
        tx: &Envelope,
    ) -> Result<(Vec<Value>, Payload), ChainError> {
        let id = tx.id();
        if batch.get(Table::TxIndex, &id.to_key())?.is_some() {
            return Err(ChainError::TxAlreadyRegistered(id));
        }
        let payload = tx.verify(&self.cfg, &self.registry)?;
        let sender = tx.sender_address();
        if let Payload::User(user) = &payload {
            if batch.get(Table::Users, sender.as_slice())?.is_some() {
                return Err(ChainError::UserAlreadyRegistered(sender));
            }
            if batch.get(Table::Nicks, user.nick.as_bytes())?.is_some() {
                return Err(ChainError::NameTaken(user.nick.clone()));
            }
        }

        let values = {
            let view = StagedState {
                trie: &*state_trie,
                batch: &*batch,
            };
            let mut ledger = StateLedger::new(self.cfg.chain_id, &view);
            ledger.execute(|state| payload.execute(tx, &self.cfg, state))?
        };

        let uid = tx_uid(num, index);
        let uid_bytes = uid.to_be_bytes().to_vec();
        batch.put(Table::TxIndex, &id.to_key(), uid_bytes.clone());
        match &payload {
            Payload::User(user) => {
                batch.put(Table::Users, sender.as_slice(), uid_bytes);
                batch.put(Table::Nicks, user.nick.as_bytes(), sender.to_bytes());
            }
            Payload::Emission(emission) => {
                for out in &emission.outs {
                    let key = [source_prefix(&emission.asset, &out.source_id), uid_bytes.clone()].concat();
                    batch.put(Table::Sources, &key, uid_bytes.clone());
                }
            }
            _ => {}
        }
        for (value_index, value) in values.iter().enumerate() {
            if value.chain_id != self.cfg.chain_id {
                continue;
            }
            state_trie.put(batch, &value.state_key(), &value.state_value())?;
            stage_history(batch, value, uid, value_index as u32);
        }
        Ok((values, payload))
    }

    /// Verifies `block` against the tip, re-executes it and commits it
    /// atomically.
    pub fn put_block(&mut self, block: Block) -> Result<(), ChainError> {
        if let Err(err) = self.commit_block(&block) {
            warn!("Rejected block {} ({}): {}", block.num(), block.hash(), err);
            return Err(err);
        }
        info!(
            "Committed block {} ({}) with {} transactions",
            block.num(),
            block.hash(),
            block.items.len()
        );
        self.last = block;
        Ok(())
    }

    fn commit_block(&self, block: &Block) -> Result<(), ChainError> {
        block.verify(Some(&self.last.header), &self.cfg)?;

        let num = block.num();
        let mut batch = self.batch();
        let mut state_trie = PatriciaTrie::new(Table::StateTrie);
        let mut stat = self.statistic()?;
        for (index, item) in block.items.iter().enumerate() {
            let (values, payload) = self.apply_tx(&mut batch, &mut state_trie, num, index, &item.tx)?;
            if values != item.tx.state_updates {
                return Err(ChainError::StateMismatch { index });
            }
            batch.put(Table::Txs, &tx_uid(num, index).to_be_bytes(), item.tx.to_bytes());
            stat.record(&payload);
        }
        stat.blocks = num;
        batch.put(Table::Meta, STATISTIC_KEY, stat.to_bytes());

        let state_root = state_trie.root(&batch)?;
        if state_root != block.header.state_root {
            return Err(ChainError::InvalidStateRoot {
                expected: state_root,
                actual: block.header.state_root,
            });
        }

        let mut chain_trie = PatriciaTrie::new(Table::ChainTrie);
        let chain_root = chain_trie.put(&mut batch, &num.to_be_bytes(), block.hash().as_slice())?;
        if chain_root != block.header.chain_root {
            return Err(ChainError::InvalidChainRoot {
                expected: chain_root,
                actual: block.header.chain_root,
            });
        }

        Self::stage_header(&mut batch, &block.header);
        batch.commit()?;
        Ok(())
    }
}
