//! Block header chain linkage and block-level verification.
//!
//! A block moves through three states: a candidate (unsigned header), a
//! signed block, and finally an accepted block once the chain store commits
//! it. Rejection is just an error from [`Block::verify`] or the commit.

use crate::core::config::ChainConfig;
use crate::core::transaction::Envelope;
use crate::crypto::key_pair::{PrivateKey, PublicKey, Signature};
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use crate::types::merkle_tree::MerkleTree;
use ledger_derive::{BinaryCodec, Error};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("invalid network id: expected {expected}, got {actual}")]
    InvalidNetwork { expected: u8, actual: u8 },
    #[error("invalid chain id: expected {expected}, got {actual}")]
    InvalidChainId { expected: u64, actual: u64 },
    #[error("invalid genesis block")]
    InvalidGenesisBlock,
    #[error("invalid block number: expected {expected}, got {actual}")]
    InvalidBlockNum { expected: u64, actual: u64 },
    #[error("block timestamp {actual} is before previous timestamp {previous}")]
    InvalidBlockTs { previous: i64, actual: i64 },
    #[error("previous block hash mismatch: expected {expected}, got {actual}")]
    InvalidPrevHash { expected: Hash, actual: Hash },
    #[error("block has no miner key")]
    EmptyMinerKey,
    #[error("block miner is not the chain authority")]
    InvalidMinerKey,
    #[error("invalid block signature")]
    InvalidBlockSig,
    #[error("block has no transactions")]
    EmptyBlock,
    #[error("transaction {0} belongs to another network or chain")]
    InvalidTxNetwork(usize),
    #[error("transaction root mismatch: expected {expected}, got {actual}")]
    InvalidTxRoot { expected: Hash, actual: Hash },
}

#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct Header {
    pub version: u32,
    pub network: u8,
    pub chain_id: u64,
    /// Height; genesis is 0.
    pub num: u64,
    /// Microseconds since the Unix epoch.
    pub timestamp: i64,
    pub prev_hash: Hash,
    pub tx_root: Hash,
    pub state_root: Hash,
    /// Root of the height → block hash trie. Committed by the signature
    /// only, since the trie entry for this block needs the header hash.
    pub chain_root: Hash,
    pub nonce: u64,
    pub miner: Option<PublicKey>,
    pub sig: Option<Signature>,
    pub reserved1: Vec<u8>,
    pub reserved2: Vec<u8>,
    pub reserved3: Vec<u8>,
}

impl Header {
    /// Unsigned candidate header following `prev`.
    pub fn child_of(prev: &Header, timestamp: i64) -> Header {
        Header {
            version: 0,
            network: prev.network,
            chain_id: prev.chain_id,
            num: prev.num + 1,
            timestamp,
            prev_hash: prev.hash(),
            tx_root: Hash::EMPTY,
            state_root: Hash::EMPTY,
            chain_root: Hash::EMPTY,
            nonce: 0,
            miner: None,
            sig: None,
            reserved1: Vec::new(),
            reserved2: Vec::new(),
            reserved3: Vec::new(),
        }
    }

    /// Header hash. Network and chain root are not part of it.
    pub fn hash(&self) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"BLOCK_HEADER");
        self.version.encode(&mut h);
        self.chain_id.encode(&mut h);
        self.num.encode(&mut h);
        self.timestamp.encode(&mut h);
        self.prev_hash.encode(&mut h);
        self.tx_root.encode(&mut h);
        self.state_root.encode(&mut h);
        self.nonce.encode(&mut h);
        self.miner.encode(&mut h);
        self.reserved1.encode(&mut h);
        self.reserved2.encode(&mut h);
        self.reserved3.encode(&mut h);
        h.finalize()
    }

    /// Signature pre-image: the two-leaf Merkle root of the header hash and
    /// the chain root.
    pub fn sig_hash(&self) -> Hash {
        MerkleTree::hash_pair(self.hash().as_slice(), self.chain_root.as_slice())
    }

    /// Sets the miner key and signs. The chain root must be final and must
    /// have been derived with this miner already set.
    pub fn sign(&mut self, key: &PrivateKey) {
        self.miner = Some(key.public_key());
        self.sig = Some(key.sign(self.sig_hash().as_slice()));
    }

    pub fn is_signed(&self) -> bool {
        self.sig.is_some()
    }

    /// Checks this header against the configuration and, when given, the
    /// previous header.
    ///
    /// Height 0 is never accepted here: the genesis block is written when the
    /// chain is created and cannot be presented again.
    pub fn verify_header(&self, prev: Option<&Header>, cfg: &ChainConfig) -> Result<(), BlockError> {
        if self.network != cfg.network {
            return Err(BlockError::InvalidNetwork {
                expected: cfg.network,
                actual: self.network,
            });
        }
        if self.chain_id != cfg.chain_id {
            return Err(BlockError::InvalidChainId {
                expected: cfg.chain_id,
                actual: self.chain_id,
            });
        }
        if self.num == 0 {
            return Err(BlockError::InvalidGenesisBlock);
        }
        if let Some(prev) = prev {
            if self.network != prev.network {
                return Err(BlockError::InvalidNetwork {
                    expected: prev.network,
                    actual: self.network,
                });
            }
            if self.chain_id != prev.chain_id {
                return Err(BlockError::InvalidChainId {
                    expected: prev.chain_id,
                    actual: self.chain_id,
                });
            }
            if self.num != prev.num + 1 {
                return Err(BlockError::InvalidBlockNum {
                    expected: prev.num + 1,
                    actual: self.num,
                });
            }
            if self.timestamp < prev.timestamp {
                return Err(BlockError::InvalidBlockTs {
                    previous: prev.timestamp,
                    actual: self.timestamp,
                });
            }
            let prev_hash = prev.hash();
            if self.prev_hash != prev_hash {
                return Err(BlockError::InvalidPrevHash {
                    expected: prev_hash,
                    actual: self.prev_hash,
                });
            }
        }

        let miner = self.miner.as_ref().ok_or(BlockError::EmptyMinerKey)?;
        if *miner != cfg.authority {
            return Err(BlockError::InvalidMinerKey);
        }
        match &self.sig {
            Some(sig) if miner.verify(self.sig_hash().as_slice(), sig) => Ok(()),
            _ => Err(BlockError::InvalidBlockSig),
        }
    }
}

/// A transaction as included in a block, with the values it produced in
/// `tx.state_updates`.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct BlockItem {
    pub tx: Envelope,
}

impl BlockItem {
    /// Combined hash of the envelope and its values.
    pub fn hash(&self) -> Hash {
        self.tx.item_hash()
    }
}

impl From<Envelope> for BlockItem {
    fn from(tx: Envelope) -> Self {
        BlockItem { tx }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct Block {
    pub header: Header,
    pub items: Vec<BlockItem>,
}

impl Block {
    /// Canonical first block of the chain described by `cfg`.
    pub fn genesis(cfg: &ChainConfig) -> Block {
        Block {
            header: Header {
                version: 0,
                network: cfg.network,
                chain_id: cfg.chain_id,
                num: 0,
                timestamp: 0,
                prev_hash: Hash::EMPTY,
                tx_root: Hash::EMPTY,
                state_root: Hash::EMPTY,
                chain_root: Hash::EMPTY,
                nonce: 0,
                miner: Some(cfg.authority),
                sig: None,
                reserved1: Vec::new(),
                reserved2: Vec::new(),
                reserved3: Vec::new(),
            },
            items: Vec::new(),
        }
    }

    pub fn num(&self) -> u64 {
        self.header.num
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Merkle root over the item hashes, in block order.
    pub fn tx_root(items: &[BlockItem]) -> Hash {
        let hashes: Vec<Hash> = items.iter().map(BlockItem::hash).collect();
        MerkleTree::root(&hashes)
    }

    /// Header checks followed by the structural checks on the items.
    pub fn verify(&self, prev: Option<&Header>, cfg: &ChainConfig) -> Result<(), BlockError> {
        self.header.verify_header(prev, cfg)?;

        if self.items.is_empty() {
            return Err(BlockError::EmptyBlock);
        }
        for (i, item) in self.items.iter().enumerate() {
            if item.tx.network != self.header.network || item.tx.chain_id != self.header.chain_id {
                return Err(BlockError::InvalidTxNetwork(i));
            }
        }
        let tx_root = Block::tx_root(&self.items);
        if tx_root != self.header.tx_root {
            return Err(BlockError::InvalidTxRoot {
                expected: tx_root,
                actual: self.header.tx_root,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::Decode;
    use crate::utils::test_utils::utils::{TestChain, key};

    /// Signed child of `prev` carrying one user registration.
    fn signed_child(chain: &TestChain, prev: &Header) -> Block {
        let items = vec![BlockItem::from(chain.user_tx(5, "alice"))];
        let mut header = Header::child_of(prev, prev.timestamp + 1);
        header.tx_root = Block::tx_root(&items);
        header.state_root = Hash::digest(b"state");
        header.chain_root = Hash::digest(b"chain");
        header.sign(&chain.authority);
        Block { header, items }
    }

    // ========== Header Tests ==========

    #[test]
    fn hash_excludes_network_and_chain_root() {
        let chain = TestChain::new();
        let block = signed_child(&chain, &Block::genesis(&chain.cfg).header);
        let mut other = block.header.clone();
        other.network ^= 1;
        other.chain_root = Hash::digest(b"other");
        other.sig = None;
        assert_eq!(block.header.hash(), other.hash());
        assert_ne!(block.header.sig_hash(), other.sig_hash());

        other.nonce += 1;
        assert_ne!(block.header.hash(), other.hash());
    }

    #[test]
    fn sig_hash_is_pair_of_hash_and_chain_root() {
        let chain = TestChain::new();
        let header = signed_child(&chain, &Block::genesis(&chain.cfg).header).header;
        assert_eq!(
            header.sig_hash(),
            MerkleTree::root(&[header.hash(), header.chain_root])
        );
    }

    #[test]
    fn signed_child_verifies() {
        let chain = TestChain::new();
        let genesis = Block::genesis(&chain.cfg);
        let block = signed_child(&chain, &genesis.header);
        assert!(block.header.is_signed());
        assert_eq!(block.verify(Some(&genesis.header), &chain.cfg), Ok(()));
        assert_eq!(block.header.verify_header(None, &chain.cfg), Ok(()));
    }

    #[test]
    fn genesis_is_deterministic_and_never_reverified() {
        let chain = TestChain::new();
        let genesis = Block::genesis(&chain.cfg);
        assert_eq!(genesis, Block::genesis(&chain.cfg));
        assert_eq!(genesis.num(), 0);
        assert!(!genesis.header.is_signed());
        assert_eq!(
            genesis.header.verify_header(None, &chain.cfg),
            Err(BlockError::InvalidGenesisBlock)
        );

        let mut forged = genesis.header.clone();
        forged.sign(&chain.authority);
        assert_eq!(
            forged.verify_header(Some(&genesis.header), &chain.cfg),
            Err(BlockError::InvalidGenesisBlock)
        );
    }

    #[test]
    fn config_mismatch_is_rejected() {
        let mut chain = TestChain::new();
        let genesis = Block::genesis(&chain.cfg);
        let block = signed_child(&chain, &genesis.header);

        chain.cfg.network ^= 1;
        assert!(matches!(
            block.verify(Some(&genesis.header), &chain.cfg),
            Err(BlockError::InvalidNetwork { .. })
        ));
        chain.cfg.network ^= 1;
        chain.cfg.chain_id += 1;
        assert!(matches!(
            block.verify(Some(&genesis.header), &chain.cfg),
            Err(BlockError::InvalidChainId { .. })
        ));
    }

    #[test]
    fn linkage_errors() {
        let chain = TestChain::new();
        let genesis = Block::genesis(&chain.cfg).header;
        let child = signed_child(&chain, &genesis).header;

        let mut wrong_num = genesis.clone();
        wrong_num.num = 5;
        assert_eq!(
            child.verify_header(Some(&wrong_num), &chain.cfg),
            Err(BlockError::InvalidBlockNum {
                expected: 6,
                actual: 1
            })
        );

        let mut later = genesis.clone();
        later.timestamp = child.timestamp + 1;
        assert_eq!(
            child.verify_header(Some(&later), &chain.cfg),
            Err(BlockError::InvalidBlockTs {
                previous: child.timestamp + 1,
                actual: child.timestamp
            })
        );

        let mut other_parent = genesis.clone();
        other_parent.nonce = 1;
        assert!(matches!(
            child.verify_header(Some(&other_parent), &chain.cfg),
            Err(BlockError::InvalidPrevHash { .. })
        ));

        let mut foreign_parent = genesis.clone();
        foreign_parent.network ^= 1;
        assert!(matches!(
            child.verify_header(Some(&foreign_parent), &chain.cfg),
            Err(BlockError::InvalidNetwork { .. })
        ));
    }

    #[test]
    fn miner_checks() {
        let chain = TestChain::new();
        let genesis = Block::genesis(&chain.cfg).header;
        let block = signed_child(&chain, &genesis);

        let mut unsigned = block.header.clone();
        unsigned.miner = None;
        assert_eq!(
            unsigned.verify_header(Some(&genesis), &chain.cfg),
            Err(BlockError::EmptyMinerKey)
        );

        let mut intruder = block.header.clone();
        intruder.sign(&key(66));
        assert_eq!(
            intruder.verify_header(Some(&genesis), &chain.cfg),
            Err(BlockError::InvalidMinerKey)
        );

        let mut no_sig = block.header.clone();
        no_sig.sig = None;
        assert_eq!(
            no_sig.verify_header(Some(&genesis), &chain.cfg),
            Err(BlockError::InvalidBlockSig)
        );
    }

    // ========== Tamper Tests ==========

    #[test]
    fn tampered_roots_and_links_are_detected() {
        let chain = TestChain::new();
        let genesis = Block::genesis(&chain.cfg).header;
        let block = signed_child(&chain, &genesis);

        let mut state = block.clone();
        state.header.state_root.0[0] ^= 1;
        assert_eq!(
            state.verify(Some(&genesis), &chain.cfg),
            Err(BlockError::InvalidBlockSig)
        );

        let mut prev = block.clone();
        prev.header.prev_hash.0[31] ^= 1;
        assert!(matches!(
            prev.verify(Some(&genesis), &chain.cfg),
            Err(BlockError::InvalidPrevHash { .. })
        ));

        let mut sig = block.clone();
        let mut bytes = sig.header.sig.map(|s| s.to_bytes()).unwrap();
        bytes[10] ^= 1;
        sig.header.sig = Signature::decode(&mut &bytes[..]).ok();
        assert_eq!(
            sig.verify(Some(&genesis), &chain.cfg),
            Err(BlockError::InvalidBlockSig)
        );

        // a re-signed header with a wrong tx root gets past the signature
        let mut tx_root = block.clone();
        tx_root.header.tx_root.0[0] ^= 1;
        tx_root.header.sign(&chain.authority);
        assert!(matches!(
            tx_root.verify(Some(&genesis), &chain.cfg),
            Err(BlockError::InvalidTxRoot { .. })
        ));
    }

    #[test]
    fn empty_block_and_foreign_tx_are_rejected() {
        let chain = TestChain::new();
        let genesis = Block::genesis(&chain.cfg).header;

        let mut empty = signed_child(&chain, &genesis);
        empty.items.clear();
        empty.header.tx_root = Hash::EMPTY;
        empty.header.sign(&chain.authority);
        assert_eq!(empty.verify(Some(&genesis), &chain.cfg), Err(BlockError::EmptyBlock));

        let mut foreign = signed_child(&chain, &genesis);
        foreign.items[0].tx.chain_id += 1;
        assert_eq!(
            foreign.verify(Some(&genesis), &chain.cfg),
            Err(BlockError::InvalidTxNetwork(0))
        );
    }

    #[test]
    fn item_hash_commits_to_state_updates() {
        let chain = TestChain::new();
        let mut item = BlockItem::from(chain.user_tx(5, "alice"));
        let before = item.hash();
        item.tx.state_updates = chain.execute(&item.tx);
        assert_ne!(item.hash(), before);
    }

    #[test]
    fn codec_round_trip() {
        let chain = TestChain::new();
        let block = signed_child(&chain, &Block::genesis(&chain.cfg).header);
        assert_eq!(Block::from_bytes(&block.to_bytes()).unwrap(), block);
    }
}
