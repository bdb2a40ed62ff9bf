//! Currency definitions.

use basalt_crypto::{Hash256, PublicKey, NULL_HASH};
use basalt_primitives::extra::append_public_key;
use basalt_primitives::transaction::{
    BaseInput, KeyOutput, Transaction, TransactionInput, TransactionOutput,
    TransactionOutputTarget,
};
use basalt_primitives::{Block, BlockHeader};

use crate::constants::*;
use crate::upgrades::UpgradeHeights;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

/// Every consensus constant of a deployed chain, plus the genesis recipe.
///
/// Per-major-version behavior hangs off the accessor methods so call
/// sites never branch on raw version numbers.
#[derive(Clone, Debug)]
pub struct Currency {
    pub network: Network,
    pub max_block_height: u64,
    pub money_supply: u64,
    pub emission_speed_factor: u8,
    pub difficulty_target: u64,
    pub difficulty_window: usize,
    pub difficulty_cut: usize,
    pub difficulty_lag: usize,
    pub difficulty_window_lwma: usize,
    pub reward_blocks_window: usize,
    pub mined_money_unlock_window: u32,
    pub mined_money_unlock_window_v5: u32,
    pub coinbase_blob_reserved_size: usize,
    pub max_block_size_initial: u64,
    pub max_block_size_growth_per_year: u64,
    pub locked_tx_allowed_delta_blocks: u64,
    pub genesis_timestamp: u64,
    pub genesis_nonce: u32,
    pub genesis_output_key: PublicKey,
    pub upgrade_heights: UpgradeHeights,
    pub poisson_check_trigger: usize,
    pub poisson_check_depth: usize,
    pub poisson_log_p_reject: f64,
}

impl Currency {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => mainnet_currency(),
            Network::Testnet => testnet_currency(),
            Network::Regtest => regtest_currency(),
        }
    }

    pub fn major_version_for_height(&self, height: u32) -> u8 {
        self.upgrade_heights.major_version_for_height(height)
    }

    /// Samples fed to the difficulty calculator for this version.
    pub fn difficulty_blocks_count(&self, block_major_version: u8) -> usize {
        if block_major_version >= 4 {
            self.difficulty_window_lwma + 1
        } else {
            self.difficulty_window + self.difficulty_lag
        }
    }

    pub fn timestamp_check_window(&self, block_major_version: u8) -> usize {
        if block_major_version >= 4 {
            TIMESTAMP_CHECK_WINDOW_V4
        } else {
            TIMESTAMP_CHECK_WINDOW
        }
    }

    pub fn block_future_time_limit(&self, block_major_version: u8) -> u64 {
        if block_major_version >= 4 {
            BLOCK_FUTURE_TIME_LIMIT_SECONDS_V4
        } else {
            BLOCK_FUTURE_TIME_LIMIT_SECONDS
        }
    }

    pub fn mined_money_unlock_window(&self, block_major_version: u8) -> u32 {
        if block_major_version >= 5 {
            self.mined_money_unlock_window_v5
        } else {
            self.mined_money_unlock_window
        }
    }

    pub fn granted_full_reward_zone(&self, block_major_version: u8) -> usize {
        match block_major_version {
            1 => GRANTED_FULL_REWARD_ZONE_V1,
            2 => GRANTED_FULL_REWARD_ZONE_V2,
            _ => GRANTED_FULL_REWARD_ZONE_V3,
        }
    }

    pub fn max_block_cumulative_size(&self, height: u64) -> u64 {
        let blocks_per_year = 365 * 24 * 60 * 60 / self.difficulty_target;
        let growth = height * self.max_block_size_growth_per_year / blocks_per_year;
        self.max_block_size_initial + growth
    }

    pub fn locked_tx_allowed_delta_seconds(&self) -> u64 {
        self.difficulty_target * self.locked_tx_allowed_delta_blocks
    }

    pub fn genesis_reward(&self) -> u64 {
        self.money_supply >> self.emission_speed_factor
    }

    pub fn genesis_block(&self) -> Block {
        let mut extra = Vec::new();
        append_public_key(&mut extra, &self.genesis_output_key);
        let base_transaction = Transaction {
            version: 1,
            unlock_time: self.mined_money_unlock_window(1) as u64,
            inputs: vec![TransactionInput::Base(BaseInput { block_index: 0 })],
            outputs: vec![TransactionOutput {
                amount: self.genesis_reward(),
                target: TransactionOutputTarget::Key(KeyOutput {
                    key: self.genesis_output_key,
                }),
            }],
            extra,
            signatures: vec![vec![]],
        };
        Block {
            header: BlockHeader {
                major_version: 1,
                minor_version: 0,
                timestamp: self.genesis_timestamp,
                previous_block_hash: NULL_HASH,
                nonce: self.genesis_nonce,
            },
            parent_block: None,
            base_transaction,
            transaction_hashes: Vec::new(),
        }
    }

    pub fn genesis_block_hash(&self) -> Hash256 {
        self.genesis_block().hash()
    }
}

fn base_currency(network: Network, genesis_output_key: PublicKey, genesis_timestamp: u64) -> Currency {
    Currency {
        network,
        max_block_height: MAX_BLOCK_NUMBER,
        money_supply: MONEY_SUPPLY,
        emission_speed_factor: EMISSION_SPEED_FACTOR,
        difficulty_target: DIFFICULTY_TARGET_SECONDS,
        difficulty_window: DIFFICULTY_WINDOW,
        difficulty_cut: DIFFICULTY_CUT,
        difficulty_lag: DIFFICULTY_LAG,
        difficulty_window_lwma: DIFFICULTY_WINDOW_LWMA,
        reward_blocks_window: REWARD_BLOCKS_WINDOW,
        mined_money_unlock_window: MINED_MONEY_UNLOCK_WINDOW,
        mined_money_unlock_window_v5: MINED_MONEY_UNLOCK_WINDOW_V5,
        coinbase_blob_reserved_size: COINBASE_BLOB_RESERVED_SIZE,
        max_block_size_initial: MAX_BLOCK_SIZE_INITIAL,
        max_block_size_growth_per_year: MAX_BLOCK_SIZE_GROWTH_PER_YEAR,
        locked_tx_allowed_delta_blocks: LOCKED_TX_ALLOWED_DELTA_BLOCKS,
        genesis_timestamp,
        genesis_nonce: GENESIS_NONCE,
        genesis_output_key,
        upgrade_heights: UpgradeHeights::disabled(),
        poisson_check_trigger: POISSON_CHECK_TRIGGER,
        poisson_check_depth: POISSON_CHECK_DEPTH,
        poisson_log_p_reject: POISSON_LOG_P_REJECT,
    }
}

fn mainnet_currency() -> Currency {
    let mut currency = base_currency(Network::Mainnet, [0x42; 32], 1_514_764_800);
    currency.upgrade_heights = UpgradeHeights {
        v2: 60_000,
        v3: 216_000,
        v4: 700_000,
        v5: 1_200_000,
        v6: crate::upgrades::UPGRADE_HEIGHT_UNDEFINED,
    };
    currency
}

fn testnet_currency() -> Currency {
    let mut currency = base_currency(Network::Testnet, [0x43; 32], 1_514_764_801);
    currency.upgrade_heights = UpgradeHeights {
        v2: 100,
        v3: 200,
        v4: 300,
        v5: 400,
        v6: crate::upgrades::UPGRADE_HEIGHT_UNDEFINED,
    };
    currency
}

fn regtest_currency() -> Currency {
    base_currency(Network::Regtest, [0x44; 32], 1_514_764_802)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_stable_per_network() {
        let mainnet = Currency::for_network(Network::Mainnet);
        assert_eq!(mainnet.genesis_block_hash(), mainnet.genesis_block_hash());

        let testnet = Currency::for_network(Network::Testnet);
        assert_ne!(mainnet.genesis_block_hash(), testnet.genesis_block_hash());
    }

    #[test]
    fn genesis_coinbase_shape() {
        let currency = Currency::for_network(Network::Regtest);
        let genesis = currency.genesis_block();
        assert_eq!(genesis.coinbase_height(), Some(0));
        assert_eq!(genesis.header.previous_block_hash, NULL_HASH);
        assert_eq!(
            genesis.base_transaction.output_amount(),
            Some(currency.genesis_reward())
        );
        assert!(genesis.transaction_hashes.is_empty());
    }

    #[test]
    fn cumulative_size_limit_grows() {
        let currency = Currency::for_network(Network::Mainnet);
        let at_zero = currency.max_block_cumulative_size(0);
        let later = currency.max_block_cumulative_size(1_000_000);
        assert_eq!(at_zero, currency.max_block_size_initial);
        assert!(later > at_zero);
    }

    #[test]
    fn version_dependent_windows() {
        let currency = Currency::for_network(Network::Mainnet);
        assert_eq!(currency.timestamp_check_window(1), TIMESTAMP_CHECK_WINDOW);
        assert_eq!(currency.timestamp_check_window(4), TIMESTAMP_CHECK_WINDOW_V4);
        assert!(currency.difficulty_blocks_count(1) > currency.difficulty_blocks_count(4));
        assert_eq!(currency.mined_money_unlock_window(4), MINED_MONEY_UNLOCK_WINDOW);
        assert_eq!(
            currency.mined_money_unlock_window(5),
            MINED_MONEY_UNLOCK_WINDOW_V5
        );
    }
}
