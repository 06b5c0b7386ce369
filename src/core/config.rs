//! Chain parameters threaded through every verify and execute call.

use crate::crypto::key_pair::PublicKey;

/// Production network id.
pub const NETWORK_MAIN: u8 = 0;
/// Test network id.
pub const NETWORK_TEST: u8 = 1;

/// Chain id used by [`ChainConfig::dev`].
pub const DEV_CHAIN_ID: u64 = 1;

/// Default limit on encoded payload bytes for non-emission transactions.
pub const MAX_TX_DATA_SIZE: usize = 64 * 1024;
/// Default limit on the free-form data attached to a user registration.
pub const MAX_USER_DATA_SIZE: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub network: u8,
    pub chain_id: u64,
    /// The single key allowed to sign blocks.
    pub authority: PublicKey,
    /// The key allowed to sign emission transactions.
    pub emission: PublicKey,
    pub max_tx_data_size: usize,
    pub max_user_data_size: usize,
}

impl ChainConfig {
    pub fn new(network: u8, chain_id: u64, authority: PublicKey, emission: PublicKey) -> Self {
        Self {
            network,
            chain_id,
            authority,
            emission,
            max_tx_data_size: MAX_TX_DATA_SIZE,
            max_user_data_size: MAX_USER_DATA_SIZE,
        }
    }

    /// Test-network configuration on [`DEV_CHAIN_ID`].
    pub fn dev(authority: PublicKey, emission: PublicKey) -> Self {
        Self::new(NETWORK_TEST, DEV_CHAIN_ID, authority, emission)
    }
}
